use std::fs;
use std::path::Path;

use log::trace;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::{Error, Result};

pub mod sync;


/// Reads the whole file at `path`
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    trace!("reading {}", path.display());
    fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and parses the yaml file at `path`, expanding `<<` merge keys
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let parse_error = |source| Error::Parse {
        path: path.to_path_buf(),
        source,
    };
    let payload = read_file(path)?;
    let mut value: Value = serde_yaml::from_slice(&payload).map_err(parse_error)?;
    value.apply_merge().map_err(parse_error)?;
    serde_yaml::from_value(value).map_err(parse_error)
}

/// Trims one trailing newline (\n or \r\n) from the given string
/// ```rust
/// use extractproject::utils::trim_newline;
/// let mut s = "hi!\n".to_string();
/// trim_newline(&mut s);
/// assert_eq!(s, "hi!");
/// ```
pub fn trim_newline(s: &mut String) {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
}
