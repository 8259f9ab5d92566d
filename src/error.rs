use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O Error: {0}")]
  Io(#[from] io::Error),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Illegal Arguments: {0}")]
  IllegalArguments(&'static str),

  #[error("Path is not a directory: {}", .0.display())]
  NotADirectory(PathBuf),

  #[error("Log already closed")]
  AlreadyClosed,

  #[error("Log opened in read-only mode")]
  ReadOnly,

  #[error("Invalid filename in log directory: {0}")]
  InvalidFilename(String),

  #[error("Data Corruption: {0}")]
  Corruption(String),

  #[error("Read beyond log size")]
  ReadBeyondSize,
}

/// Failure from `SegmentedLog::append`, carrying the prefix that was
/// accepted before the error so a write-ahead layer can decide whether to
/// truncate back to `start`.
#[derive(Error, Debug)]
#[error("Append failed after {n} bytes: {source}")]
pub struct AppendError {
  /// Logical offset of the first accepted byte; 0 when nothing was written.
  pub start: u64,
  /// Number of bytes accepted before the failure.
  pub n: usize,
  #[source]
  pub source: Error,
}

impl From<AppendError> for Error {
  fn from(e: AppendError) -> Self {
    e.source
  }
}
