use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::PathBuf;

use tracing::error;

use crate::config::CompressionFormat;
use crate::error::{Error, Result};

#[cfg(feature = "compression")]
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
#[cfg(feature = "compression")]
use std::io::Read;

pub const SEGMENT_MAGIC: u32 = 0x474F_4C53; // "SLOG"
pub const SEGMENT_VERSION: u8 = 1;

/// [Magic: 4][Version: 1][Compression: 1][Level: 1][Reserved: 1][Meta Len: 4]
const FIXED_HEADER_SIZE: u64 = 12;

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Options for opening a single segment file. Derived by the coordinator
/// from its own configuration and the current tail's header.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
  pub read_only: bool,
  pub synced: bool,
  pub file_mode: u32,
  pub compression_format: CompressionFormat,
  pub compression_level: u8,
  /// Raw metadata envelope bytes written into the header of a freshly
  /// created file. Ignored when the file already exists on disk.
  pub metadata: Vec<u8>,
}

/// One on-disk segment file: a self-describing header followed by payload
/// bytes. All offsets are payload coordinates (0 = first byte after the
/// header).
///
/// Writes go through a fixed-capacity buffer; `flush` hands the buffer to
/// the OS and, for handles opened `synced`, makes it durable.
pub struct Segment {
  path: PathBuf,
  file: File,
  base: u64,
  /// Current write cursor.
  offset: u64,
  /// Payload high-water mark.
  size: u64,
  wbuf: Vec<u8>,
  /// Payload offset of the first buffered byte; meaningful while `wbuf` is
  /// non-empty.
  wbuf_off: u64,
  read_only: bool,
  synced: bool,
  compression_format: CompressionFormat,
  compression_level: u8,
  metadata: Vec<u8>,
  closed: bool,
}

impl Segment {
  /// Opens a segment file. A fresh (or empty) file gets a header written
  /// from `opts`; an existing file has its header parsed, and the on-disk
  /// compression settings and metadata take precedence over `opts`.
  pub fn open(path: PathBuf, opts: SegmentOptions) -> Result<Self> {
    let file = if opts.read_only {
      OpenOptions::new().read(true).open(&path)?
    } else {
      OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(opts.file_mode)
        .open(&path)?
    };

    let file_len = file.metadata()?.len();

    if file_len == 0 {
      if opts.read_only {
        return Err(Error::Corruption(format!(
          "segment {} has no header",
          path.display()
        )));
      }

      let mut header = Vec::with_capacity(FIXED_HEADER_SIZE as usize + opts.metadata.len());
      header.write_u32::<LittleEndian>(SEGMENT_MAGIC)?;
      header.write_u8(SEGMENT_VERSION)?;
      header.write_u8(opts.compression_format.as_byte())?;
      header.write_u8(opts.compression_level)?;
      header.write_u8(0)?; // Reserved
      header.write_u32::<LittleEndian>(opts.metadata.len() as u32)?;
      header.write_all(&opts.metadata)?;
      file.write_all_at(&header, 0)?;

      let base = FIXED_HEADER_SIZE + opts.metadata.len() as u64;

      return Ok(Self {
        path,
        file,
        base,
        offset: 0,
        size: 0,
        wbuf: Vec::with_capacity(WRITE_BUFFER_SIZE),
        wbuf_off: 0,
        read_only: false,
        synced: opts.synced,
        compression_format: opts.compression_format,
        compression_level: opts.compression_level,
        metadata: opts.metadata,
        closed: false,
      });
    }

    let mut fixed = [0u8; FIXED_HEADER_SIZE as usize];
    file.read_exact_at(&mut fixed, 0).map_err(|e| {
      if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Corruption(format!("truncated header in segment {}", path.display()))
      } else {
        Error::Io(e)
      }
    })?;

    let mut cursor = &fixed[..];
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != SEGMENT_MAGIC {
      return Err(Error::Corruption(format!("invalid segment magic: {:#x}", magic)));
    }
    let version = cursor.read_u8()?;
    if version != SEGMENT_VERSION {
      return Err(Error::Corruption(format!(
        "unsupported segment version: expected {}, got {}",
        SEGMENT_VERSION, version
      )));
    }
    let compression_format = CompressionFormat::from_byte(cursor.read_u8()?)?;
    let compression_level = cursor.read_u8()?;
    let _reserved = cursor.read_u8()?;
    let meta_len = cursor.read_u32::<LittleEndian>()? as u64;

    let base = FIXED_HEADER_SIZE + meta_len;
    if file_len < base {
      return Err(Error::Corruption(format!(
        "truncated header in segment {}",
        path.display()
      )));
    }

    let mut metadata = vec![0u8; meta_len as usize];
    file.read_exact_at(&mut metadata, FIXED_HEADER_SIZE)?;

    let size = file_len - base;

    Ok(Self {
      path,
      file,
      base,
      offset: size,
      size,
      wbuf: Vec::with_capacity(if opts.read_only { 0 } else { WRITE_BUFFER_SIZE }),
      wbuf_off: size,
      read_only: opts.read_only,
      synced: opts.synced,
      compression_format,
      compression_level,
      metadata,
      closed: false,
    })
  }

  /// Appends `bs` at the current write cursor and returns the payload
  /// offset of the first byte plus the number of caller bytes accepted.
  ///
  /// With compression enabled the whole buffer becomes one opaque
  /// length-prefixed block addressed by the returned offset; the cursor
  /// advances by the physical block size, not `bs.len()`.
  pub fn append(&mut self, bs: &[u8]) -> Result<(u64, usize)> {
    if self.read_only {
      return Err(Error::ReadOnly);
    }
    if bs.is_empty() {
      return Err(Error::IllegalArguments("cannot append an empty buffer"));
    }

    let start = self.offset;

    match self.compression_format {
      CompressionFormat::None => self.buffer_write(bs)?,
      #[cfg(feature = "compression")]
      CompressionFormat::Lz4 => {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(bs)?;
        let block = encoder
          .finish()
          .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        self.buffer_write(&(block.len() as u32).to_le_bytes())?;
        self.buffer_write(&block)?;
      }
    }

    self.size = self.size.max(self.offset);
    Ok((start, bs.len()))
  }

  /// Reads payload bytes starting at `off`. Returns the number of bytes
  /// copied into `bs`, which may be less than `bs.len()` when the segment
  /// ends first. `off` at or past the end is `ReadBeyondSize`.
  ///
  /// With compression enabled, `off` must be the starting offset of a block
  /// previously returned by `append`; the block is decompressed and copied.
  pub fn read_at(&mut self, bs: &mut [u8], off: u64) -> Result<usize> {
    if bs.is_empty() {
      return Err(Error::IllegalArguments("cannot read into an empty buffer"));
    }

    // Completed appends must be observable, including still-buffered ones.
    self.flush_buffer()?;

    if off >= self.size {
      return Err(Error::ReadBeyondSize);
    }

    match self.compression_format {
      CompressionFormat::None => {
        let available = (self.size - off) as usize;
        let n = bs.len().min(available);
        self.file.read_exact_at(&mut bs[..n], self.base + off)?;
        Ok(n)
      }
      #[cfg(feature = "compression")]
      CompressionFormat::Lz4 => {
        let mut len_buf = [0u8; 4];
        self.file.read_exact_at(&mut len_buf, self.base + off)?;
        let block_len = u32::from_le_bytes(len_buf) as u64;

        if off + 4 + block_len > self.size {
          return Err(Error::Corruption(format!(
            "compressed block at offset {} extends past segment end",
            off
          )));
        }

        let mut block = vec![0u8; block_len as usize];
        self.file.read_exact_at(&mut block, self.base + off + 4)?;

        let mut decoder = FrameDecoder::new(block.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;

        let n = bs.len().min(decompressed.len());
        bs[..n].copy_from_slice(&decompressed[..n]);
        Ok(n)
      }
    }
  }

  pub fn size(&self) -> u64 {
    self.size
  }

  pub fn offset(&self) -> u64 {
    self.offset
  }

  /// Moves the write cursor. The file is not truncated; subsequent appends
  /// overwrite forward from the new position.
  pub fn set_offset(&mut self, off: u64) -> Result<()> {
    if self.read_only {
      return Err(Error::ReadOnly);
    }
    self.flush_buffer()?;
    self.offset = off;
    self.wbuf_off = off;
    Ok(())
  }

  /// Raw metadata envelope bytes from the header.
  pub fn metadata(&self) -> &[u8] {
    &self.metadata
  }

  pub fn compression_format(&self) -> CompressionFormat {
    self.compression_format
  }

  pub fn compression_level(&self) -> u8 {
    self.compression_level
  }

  pub fn flush(&mut self) -> Result<()> {
    if self.read_only {
      return Err(Error::ReadOnly);
    }
    self.flush_buffer()?;
    if self.synced {
      self.file.sync_data()?;
    }
    Ok(())
  }

  pub fn sync(&mut self) -> Result<()> {
    if self.read_only {
      return Err(Error::ReadOnly);
    }
    self.flush_buffer()?;
    self.file.sync_data()?;
    Ok(())
  }

  pub fn close(&mut self) -> Result<()> {
    if self.closed {
      return Err(Error::AlreadyClosed);
    }
    if !self.read_only {
      self.flush_buffer()?;
      if self.synced {
        self.file.sync_data()?;
      }
    }
    self.closed = true;
    Ok(())
  }

  fn buffer_write(&mut self, bs: &[u8]) -> Result<()> {
    if self.wbuf.is_empty() {
      self.wbuf_off = self.offset;
    }
    self.wbuf.extend_from_slice(bs);
    self.offset += bs.len() as u64;
    if self.wbuf.len() >= WRITE_BUFFER_SIZE {
      self.flush_buffer()?;
    }
    Ok(())
  }

  fn flush_buffer(&mut self) -> Result<()> {
    if self.wbuf.is_empty() {
      return Ok(());
    }
    self.file.write_all_at(&self.wbuf, self.base + self.wbuf_off)?;
    self.wbuf.clear();
    self.wbuf_off = self.offset;
    Ok(())
  }
}

impl Drop for Segment {
  fn drop(&mut self) {
    if self.closed || self.read_only {
      return;
    }
    if let Err(e) = self.flush_buffer() {
      error!(target: "seglog", "Failed to flush segment on drop. Data loss possible. Path: {:?}, Error: {}", self.path, e);
    }
  }
}
