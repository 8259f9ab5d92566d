use parking_lot::Mutex;
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cache::HandleCache;
use crate::config::{CompressionFormat, LogOptions};
use crate::error::{AppendError, Error, Result};
use crate::meta::Metadata;
use crate::segment::{Segment, SegmentOptions};
use crate::util::{parse_segment_id, segment_name};

/// Envelope key holding the store's immutable segment size.
const META_FILE_SIZE: &str = "FILE_SIZE";
/// Envelope key holding the caller's opaque metadata bytes.
const META_WRAPPED_METADATA: &str = "WRAPPED_METADATA";

struct Inner {
  path: PathBuf,
  /// Fixed segment size. Authoritative value comes from the tail segment's
  /// header, not from the options used to open the store.
  file_size: u64,
  file_ext: String,
  file_mode: u32,
  read_only: bool,
  synced: bool,
  /// Id of the tail segment. Segment `tail_id` is exclusively owned via
  /// `tail` and never resident in `cache`.
  tail_id: u64,
  tail: Segment,
  cache: HandleCache<Segment>,
  closed: bool,
}

/// A segmented append-only byte log.
///
/// Presents one contiguous logical byte stream backed by a directory of
/// fixed-size, numbered segment files. At most `max_opened_files + 1` file
/// descriptors are open at any time: the tail plus an LRU-bounded cache of
/// non-tail segment handles.
///
/// All methods serialize on one internal lock; the log has at most one
/// writer at a time.
pub struct SegmentedLog {
  inner: Mutex<Inner>,
}

impl SegmentedLog {
  /// Opens (or creates) a segmented log rooted at `path`.
  ///
  /// An empty or absent directory becomes a fresh store whose first segment
  /// carries `opts.file_size` and `opts.metadata` in its header. A
  /// non-empty directory is reopened: the lexicographically greatest entry
  /// is the tail, and its header supplies the authoritative segment size,
  /// compression settings, and metadata.
  pub fn open(path: impl AsRef<Path>, opts: LogOptions) -> Result<Self> {
    opts.validate()?;
    let path = path.as_ref().to_path_buf();

    match fs::metadata(&path) {
      Ok(md) => {
        if !md.is_dir() {
          return Err(Error::NotADirectory(path));
        }
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound && !opts.read_only => {
        DirBuilder::new().mode(opts.file_mode).create(&path)?;
      }
      Err(e) => return Err(Error::Io(e)),
    }

    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(&path)? {
      let entry = entry?;
      names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    // The zero-padded naming scheme makes lexicographic order numeric
    // order, so the last entry is the tail.
    let mut last: Option<(u64, &str)> = None;
    for name in &names {
      let id = parse_segment_id(name).ok_or_else(|| Error::InvalidFilename(name.clone()))?;
      last = Some((id, name.as_str()));
    }

    let (tail_id, tail_name) = match last {
      Some((id, name)) => (id, name.to_string()),
      None => (0, segment_name(0, &opts.file_ext)),
    };

    let mut envelope = Metadata::new();
    envelope.put_int(META_FILE_SIZE, opts.file_size);
    envelope.put(META_WRAPPED_METADATA, &opts.metadata);

    let tail = Segment::open(
      path.join(&tail_name),
      SegmentOptions {
        read_only: opts.read_only,
        synced: opts.synced,
        file_mode: opts.file_mode,
        compression_format: opts.compression_format,
        compression_level: opts.compression_level,
        metadata: envelope.to_bytes(),
      },
    )?;

    let file_size = Metadata::from_bytes(tail.metadata())?
      .get_int(META_FILE_SIZE)
      .ok_or_else(|| Error::Corruption("tail segment header is missing FILE_SIZE".into()))?;

    let cache = HandleCache::new(opts.max_opened_files)?;

    debug!(target: "seglog", "Opened segmented log at {:?} (tail segment {}, file_size {})", path, tail_id, file_size);

    Ok(Self {
      inner: Mutex::new(Inner {
        path,
        file_size,
        file_ext: opts.file_ext,
        file_mode: opts.file_mode,
        read_only: opts.read_only,
        synced: opts.synced,
        tail_id,
        tail,
        cache,
        closed: false,
      }),
    })
  }

  /// Appends `bs` to the log and returns the logical offset of its first
  /// byte plus the number of bytes accepted.
  ///
  /// Without compression a single append may span several segments. With
  /// compression the whole buffer is handed to the tail as one block, so
  /// callers must keep appends at or below the segment size.
  ///
  /// On failure the error carries the `(start, n)` prefix already written,
  /// so a write-ahead layer can truncate back to `start`.
  pub fn append(&self, bs: &[u8]) -> std::result::Result<(u64, usize), AppendError> {
    let mut inner = self.inner.lock();

    let mut start = 0u64;
    let mut n = 0usize;

    if inner.closed {
      return Err(AppendError { start, n, source: Error::AlreadyClosed });
    }
    if inner.read_only {
      return Err(AppendError { start, n, source: Error::ReadOnly });
    }
    if bs.is_empty() {
      return Err(AppendError {
        start,
        n,
        source: Error::IllegalArguments("cannot append an empty buffer"),
      });
    }

    while n < bs.len() {
      let mut available = inner.file_size.saturating_sub(inner.tail.offset());

      if available == 0 {
        if let Err(source) = inner.rollover() {
          return Err(AppendError { start, n, source });
        }
        available = inner.file_size;
      }

      let d = if inner.tail.compression_format() == CompressionFormat::None {
        available.min((bs.len() - n) as u64) as usize
      } else {
        // One compressed block per call; never split across segments.
        bs.len() - n
      };

      let segment_off = match inner.tail.append(&bs[n..n + d]) {
        Ok((segment_off, _)) => segment_off,
        Err(source) => return Err(AppendError { start, n, source }),
      };
      if n == 0 {
        start = segment_off + inner.tail_id * inner.file_size;
      }
      n += d;
    }

    Ok((start, n))
  }

  /// Fills `bs` with the bytes at logical offset `off`, transparently
  /// spanning segment boundaries. Fails with `ReadBeyondSize` when the log
  /// ends before the buffer is full.
  pub fn read_at(&self, bs: &mut [u8], off: u64) -> Result<usize> {
    let mut inner = self.inner.lock();

    if inner.closed {
      return Err(Error::AlreadyClosed);
    }
    if bs.is_empty() {
      return Err(Error::IllegalArguments("cannot read into an empty buffer"));
    }

    let mut r = 0usize;

    while r < bs.len() {
      let off_r = off + r as u64;
      let in_segment = off_r % inner.file_size;
      let id = off_r / inner.file_size;

      let segment = inner.segment_for(id)?;
      r += segment.read_at(&mut bs[r..], in_segment)?;
    }

    Ok(r)
  }

  /// Total logical size: full segments before the tail plus the tail's
  /// payload length.
  pub fn size(&self) -> Result<u64> {
    let inner = self.inner.lock();
    if inner.closed {
      return Err(Error::AlreadyClosed);
    }
    Ok(inner.tail_id * inner.file_size + inner.tail.size())
  }

  /// Current logical write position. Equals `size()` for a log that has
  /// only ever been appended to.
  pub fn offset(&self) -> u64 {
    let inner = self.inner.lock();
    inner.tail_id * inner.file_size + inner.tail.offset()
  }

  /// Moves the write cursor to logical position `off`, switching the tail
  /// to the segment containing it. The target segment file is created on
  /// demand; segment files above it are left in place and are overwritten
  /// forward by subsequent appends.
  pub fn set_offset(&self, off: u64) -> Result<()> {
    let mut inner = self.inner.lock();

    if inner.closed {
      return Err(Error::AlreadyClosed);
    }
    if inner.read_only {
      return Err(Error::ReadOnly);
    }

    let target_id = off / inner.file_size;

    if target_id != inner.tail_id {
      // Take the target out of the cache (or open it fresh) so the tail is
      // never aliased by a cached handle; the previous tail becomes a
      // regular cached non-tail, subject to LRU eviction.
      let next = match inner.cache.pop(target_id) {
        Some(segment) => segment,
        None => {
          if let Some((_, mut evicted)) = inner.cache.evict_if_full() {
            evicted.close()?;
          }
          Segment::open(inner.segment_path(target_id), inner.segment_options())?
        }
      };

      let old_id = inner.tail_id;
      let old = std::mem::replace(&mut inner.tail, next);
      inner.tail_id = target_id;

      if let Some((_, mut evicted)) = inner.cache.put(old_id, old) {
        evicted.close()?;
      }
    }

    let in_segment = off % inner.file_size;
    inner.tail.set_offset(in_segment)
  }

  /// The caller-supplied opaque metadata stored at creation.
  pub fn metadata(&self) -> Vec<u8> {
    let inner = self.inner.lock();
    Metadata::from_bytes(inner.tail.metadata())
      .ok()
      .and_then(|m| m.get(META_WRAPPED_METADATA).map(|bs| bs.to_vec()))
      .unwrap_or_default()
  }

  pub fn compression_format(&self) -> CompressionFormat {
    self.inner.lock().tail.compression_format()
  }

  pub fn compression_level(&self) -> u8 {
    self.inner.lock().tail.compression_level()
  }

  /// Flushes every resident segment handle, cached ones first, then the
  /// tail. The first failure aborts and is reported.
  pub fn flush(&self) -> Result<()> {
    self.inner.lock().flush()
  }

  /// Like `flush`, but also forces the data to the physical disk.
  pub fn sync(&self) -> Result<()> {
    self.inner.lock().sync()
  }

  /// Produces an independent on-disk copy of the log at `dst_path`:
  /// flushes, syncs, then copies every file in the log directory.
  pub fn copy(&self, dst_path: impl AsRef<Path>) -> Result<()> {
    let mut inner = self.inner.lock();

    if inner.closed {
      return Err(Error::AlreadyClosed);
    }

    inner.flush()?;
    inner.sync()?;

    let dst = dst_path.as_ref();
    let mut builder = DirBuilder::new();
    builder.recursive(true).mode(inner.file_mode);
    builder.create(dst)?;

    for entry in fs::read_dir(&inner.path)? {
      let entry = entry?;
      fs::copy(entry.path(), dst.join(entry.file_name()))?;
    }

    Ok(())
  }

  /// Closes every cached handle, then the tail. A second call fails with
  /// `AlreadyClosed`. The closed state is retained even if a handle fails
  /// to close.
  pub fn close(&self) -> Result<()> {
    let mut inner = self.inner.lock();

    if inner.closed {
      return Err(Error::AlreadyClosed);
    }
    inner.closed = true;

    let Inner { cache, tail, .. } = &mut *inner;
    cache.apply(|_, segment| segment.close())?;
    tail.close()
  }
}

impl Inner {
  fn segment_path(&self, id: u64) -> PathBuf {
    self.path.join(segment_name(id, &self.file_ext))
  }

  /// Options for segments opened after creation: the store's mode plus the
  /// tail's persisted compression settings and metadata envelope.
  fn segment_options(&self) -> SegmentOptions {
    SegmentOptions {
      read_only: self.read_only,
      synced: self.synced,
      file_mode: self.file_mode,
      compression_format: self.tail.compression_format(),
      compression_level: self.tail.compression_level(),
      metadata: self.tail.metadata().to_vec(),
    }
  }

  /// Moves the full tail into the cache and starts a fresh tail under the
  /// next id, closing any handle the insertion evicts.
  fn rollover(&mut self) -> Result<()> {
    let next_id = self.tail_id + 1;

    // A rewind may have left a stale handle for this id resident.
    if let Some(mut stale) = self.cache.pop(next_id) {
      stale.close()?;
    }

    // Make room before opening: both tails are briefly held open, and the
    // descriptor bound must hold throughout.
    if let Some((_, mut evicted)) = self.cache.evict_if_full() {
      evicted.close()?;
    }

    let mut next = Segment::open(self.segment_path(next_id), self.segment_options())?;
    next.set_offset(0)?;

    let old_id = self.tail_id;
    let old = std::mem::replace(&mut self.tail, next);
    self.tail_id = next_id;

    debug!(target: "seglog", "Rolled over to segment {}", next_id);

    if let Some((_, mut evicted)) = self.cache.put(old_id, old) {
      evicted.close()?;
    }

    Ok(())
  }

  /// Resolves the segment handle covering segment `id`: the tail, a cached
  /// handle, or a freshly opened one inserted into the cache.
  fn segment_for(&mut self, id: u64) -> Result<&mut Segment> {
    if id == self.tail_id {
      return Ok(&mut self.tail);
    }

    if self.cache.get(id).is_none() {
      let path = self.segment_path(id);
      if !path.exists() {
        return Err(Error::Io(io::Error::new(
          io::ErrorKind::NotFound,
          format!("segment file {} does not exist", path.display()),
        )));
      }

      if let Some((_, mut evicted)) = self.cache.evict_if_full() {
        evicted.close()?;
      }
      let segment = Segment::open(path, self.segment_options())?;
      if let Some((_, mut evicted)) = self.cache.put(id, segment) {
        evicted.close()?;
      }
    }

    Ok(self.cache.get(id).unwrap())
  }

  fn flush(&mut self) -> Result<()> {
    if self.closed {
      return Err(Error::AlreadyClosed);
    }
    self.cache.apply(|_, segment| segment.flush())?;
    self.tail.flush()
  }

  fn sync(&mut self) -> Result<()> {
    if self.closed {
      return Err(Error::AlreadyClosed);
    }
    self.cache.apply(|_, segment| segment.sync())?;
    self.tail.sync()
  }
}
