use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop an extraction run
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("could not write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("could not serialize value: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("could not load templates from {path}: {message}")]
    Templates { path: PathBuf, message: String },

    #[error("failed to execute template {name}: {source}")]
    Template {
        name: String,
        source: handlebars::RenderError,
    },

    #[error("pretty-printed value for {path} is not equivalent to the canonical value ({detail}):\n\n{canonical}\n\npretty value:\n\n{generated}")]
    NotEquivalent {
        path: PathBuf,
        detail: String,
        canonical: String,
        generated: String,
    },

    #[error("path {path} already has different content:\n\n{diff}")]
    Conflict { path: PathBuf, diff: String },

    #[error("task file {file} matches more than one artifact: {}", .artifacts.join(", "))]
    AmbiguousArtifact { file: String, artifacts: Vec<String> },

    #[error("artifact {0} is mapped to more than one directory")]
    DuplicateArtifact(String),

    #[error("cannot derive a task name from {0}")]
    InvalidTaskPath(String),

    #[error("cannot derive a script name from {0}")]
    InvalidScriptPath(String),
}

pub type Result<T> = std::result::Result<T, Error>;
