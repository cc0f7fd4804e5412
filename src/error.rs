use thiserror::Error;

// Everything the control side can fail at. The render path never returns one
// of these; it degrades to silence instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("could not decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("audio output error: {0}")]
    AudioOutput(String),

    #[error("session file error: {0}")]
    Session(#[from] serde_json::Error),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
