// Library error type. Application edges (config, store, worker) use anyhow.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Unparseable timestamp or numeric value. Per-line, never fatal to a file.
    #[error("line {line}: {message}")]
    Format { line: u64, message: String },

    /// Failure reading the next line. Ends that file's sequence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected bucketer or parser configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn format(line: u64, message: impl Into<String>) -> Self {
        Error::Format {
            line,
            message: message.into(),
        }
    }

    /// Attach a source line to a format error raised without one.
    pub fn at_line(self, line: u64) -> Self {
        match self {
            Error::Format { message, .. } => Error::Format { line, message },
            other => other,
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format { .. })
    }
}
