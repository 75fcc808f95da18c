/// Idempotent writes: a file is only ever created, never overwritten
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::trace;
use similar::{ChangeTag, TextDiff};

use crate::error::{Error, Result};

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    use crate::error::Error;
    use crate::utils::sync::{diff, sync_file, SyncOutcome};

    #[test]
    fn creates_missing_parents() {
        let tmp_dir = TempDir::new("sync").expect("could not create temp dir");
        let path = tmp_dir.path().join("tasks/scripts/build.sh");
        let outcome = sync_file(&path, b"#!/bin/sh\n").expect("could not sync");
        assert_eq!(outcome, SyncOutcome::Created);
        assert_eq!(fs::read(&path).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn identical_content_is_left_alone() {
        let tmp_dir = TempDir::new("sync").expect("could not create temp dir");
        let path = tmp_dir.path().join("resources/repo.yml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "type: git\n").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        let outcome = sync_file(&path, b"type: git\n").expect("identical content should sync");
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn different_content_is_a_conflict() {
        let tmp_dir = TempDir::new("sync").expect("could not create temp dir");
        let path = tmp_dir.path().join("repo.yml");
        fs::write(&path, "type: git\nsource: {}\n").unwrap();
        let err = sync_file(&path, b"type: hg\nsource: {}\n").expect_err("should conflict");
        match &err {
            Error::Conflict { path: p, diff } => {
                assert_eq!(p, &path);
                assert!(diff.contains("-type: git"), "{}", diff);
                assert!(diff.contains("+type: hg"), "{}", diff);
            }
            other => panic!("got invalid error variant: {:?}", other),
        }
        assert!(err.to_string().contains("repo.yml"));
        // never clobbered
        assert_eq!(fs::read_to_string(&path).unwrap(), "type: git\nsource: {}\n");
    }

    #[test]
    fn diff_marks_lines() {
        assert_eq!(diff("a\nb\n", "a\nc\n"), " a\n-b\n+c\n");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The file did not exist and was written
    Created,
    /// The file already held exactly this payload
    Unchanged,
}

/// Makes sure `path` holds `payload`, creating it (and its parents) if needed.
/// Fails with [Error::Conflict] if the file exists with anything else in it.
pub fn sync_file(path: &Path, payload: &[u8]) -> Result<SyncOutcome> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            trace!("creating directory {}", parent.display());
            fs::create_dir_all(parent).map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    match fs::read(path) {
        Ok(existing) if existing == payload => Ok(SyncOutcome::Unchanged),
        Ok(existing) => Err(Error::Conflict {
            path: path.to_path_buf(),
            diff: diff(
                &String::from_utf8_lossy(&existing),
                &String::from_utf8_lossy(payload),
            ),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs::write(path, payload).map_err(|source| Error::Write {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(SyncOutcome::Created)
        }
        Err(source) => Err(Error::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Line diff from `existing` to `proposed`
pub fn diff(existing: &str, proposed: &str) -> String {
    let diff = TextDiff::from_lines(existing, proposed);

    let mut result = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        result.push_str(&format!("{}{}", sign, change));
        if change.missing_newline() {
            result.push('\n');
        }
    }

    result
}
