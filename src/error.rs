use std::fmt;
use std::path::PathBuf;

use reqwest::StatusCode;

/// A failed GET, either on the wire or by status.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which of the two desktop settings failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    Image,
    Mode,
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyStep::Image => f.write_str("set background image"),
            ApplyStep::Mode => f.write_str("set background options"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("service {endpoint} unreachable after {attempts} attempts")]
    Unreachable { endpoint: String, attempts: u32 },

    #[error("fetch image meta from {url}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("parse image meta")]
    Parse(#[from] quick_xml::de::DeError),

    #[error("image meta lists no images")]
    NoImage,

    #[error("fetch image data from {url}")]
    Download {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("store image {}", path.display())]
    ImageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("create image directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step}")]
    Apply {
        step: ApplyStep,
        #[source]
        source: anyhow::Error,
    },

    #[error("cleanup images in {}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
