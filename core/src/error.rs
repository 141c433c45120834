//! Error types for the keypipe pipeline.
//!
//! Only load, save and configuration-management paths return these. The
//! key-event hot path degrades to a pass-through instead of failing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed config {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("config not found: {0}")]
    ConfigMissing(String),

    #[error("dictionary not loaded for language {0}")]
    DictionaryUnavailable(String),

    #[error("unsupported keycode: {0}")]
    InvalidKeycode(u16),

    #[error("at least one language required")]
    AtLeastOneLanguageRequired,

    #[error("layout {0} is reserved and cannot be changed or removed")]
    ReservedLayout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a `ConfigParse` error for `path` from any displayable cause.
    pub fn parse(path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Error::ConfigParse {
            path: path.into(),
            message: cause.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<fst::Error> for Error {
    fn from(e: fst::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
