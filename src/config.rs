use crate::error::{Error, Result};

/// Defines the compression algorithm applied to appended payloads.
///
/// The format is fixed at store creation and recorded in every segment
/// header; reopening a store recovers it from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
  /// No compression. Raw binary copy; appends may span segment files.
  None,

  /// Uses the LZ4 Frame format. Each append becomes one opaque block
  /// addressed by its starting offset, so a single append never spans
  /// two segments.
  #[cfg(feature = "compression")]
  Lz4,
}

impl CompressionFormat {
  pub(crate) fn as_byte(self) -> u8 {
    match self {
      CompressionFormat::None => 0x00,
      #[cfg(feature = "compression")]
      CompressionFormat::Lz4 => 0x01,
    }
  }

  pub(crate) fn from_byte(b: u8) -> Result<Self> {
    match b {
      0x00 => Ok(CompressionFormat::None),
      #[cfg(feature = "compression")]
      0x01 => Ok(CompressionFormat::Lz4),
      #[cfg(not(feature = "compression"))]
      0x01 => Err(Error::Config(
        "LZ4 segment found but compression feature disabled".into(),
      )),
      _ => Err(Error::Corruption(format!("unknown compression format: {}", b))),
    }
  }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
  /// Open the store without write access. The directory must already exist.
  pub read_only: bool,

  /// If true, every flush is also pushed to the physical disk.
  /// Safest, but highest latency.
  pub synced: bool,

  /// POSIX permission bits for the log directory and created segment files.
  /// Default: 0o755.
  pub file_mode: u32,

  /// Fixed segment size in bytes. Immutable after creation: reopening a
  /// store reads the authoritative value from the tail segment's header.
  /// Default: 64 MiB.
  pub file_size: u64,

  /// Extension for segment files, without the leading dot.
  /// Default: "aof".
  pub file_ext: String,

  /// Maximum number of non-tail segment files kept open simultaneously.
  /// Uses an LRU policy to enforce this limit.
  /// Default: 10.
  pub max_opened_files: usize,

  pub compression_format: CompressionFormat,

  /// Advisory compression level, persisted verbatim in segment headers.
  pub compression_level: u8,

  /// Opaque caller bytes stored in every segment header at creation and
  /// returned by `SegmentedLog::metadata`.
  pub metadata: Vec<u8>,
}

impl Default for LogOptions {
  fn default() -> Self {
    Self {
      read_only: false,
      synced: true,
      file_mode: 0o755,
      file_size: 1 << 26, // 64 MiB
      file_ext: "aof".to_string(),
      max_opened_files: 10,
      compression_format: CompressionFormat::None,
      compression_level: 0,
      metadata: Vec::new(),
    }
  }
}

impl LogOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if self.file_size == 0 {
      return Err(Error::Config("file_size must be greater than zero".into()));
    }
    if self.max_opened_files == 0 {
      return Err(Error::Config("max_opened_files must be greater than zero".into()));
    }
    if self.file_ext.is_empty() {
      return Err(Error::Config("file_ext cannot be empty".into()));
    }
    // Only permission bits are meaningful for created files.
    if self.file_mode & !0o7777 != 0 {
      return Err(Error::Config(format!("invalid file_mode: {:o}", self.file_mode)));
    }
    Ok(())
  }
}
