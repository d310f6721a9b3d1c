//! Error types for shazam-recognize.

use thiserror::Error;

/// Errors raised while fingerprinting a file or talking to Shazam.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The audio file could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// A signature could not be encoded or decoded
    #[error("Signature error: {0}")]
    Signature(String),

    /// Request to the recognition service failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Malformed JSON from the service
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Saved defaults could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, _) => Error::Http(format!("server returned status {}", code)),
            ureq::Error::Transport(t) => Error::Http(t.to_string()),
        }
    }
}

impl From<rodio::decoder::DecoderError> for Error {
    fn from(e: rodio::decoder::DecoderError) -> Self {
        Error::Decode(e.to_string())
    }
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, Error>;
