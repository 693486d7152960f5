use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid magic number in '{}': {found} (expected {expected})", path.display())]
    BadMagic {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("'{}' ended early while reading {what}", path.display())]
    Truncated { path: PathBuf, what: String },

    #[error("number of images ({images}) and labels ({labels}) don't match")]
    LengthMismatch { images: usize, labels: usize },

    #[error("label {label} is out of range for {classes} classes")]
    InvalidLabel { label: u8, classes: usize },

    #[error("shape error: {0}")]
    Shape(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("input pipeline failed: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
