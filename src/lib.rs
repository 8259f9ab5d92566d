//! # SegLog
//!
//! `seglog` is a segmented append-only byte log: a single contiguous
//! logical byte stream backed by a directory of fixed-size, numbered,
//! append-only segment files. It is the storage primitive a ledger or
//! write-ahead log builds on: append byte blobs, receive stable logical
//! offsets, and read arbitrary ranges back by offset.
//!
//! ## Key Features
//!
//! * **Bounded descriptors**: non-tail segment handles live in a strict
//!   LRU, so at most `max_opened_files + 1` files are open at once.
//! * **Transparent spanning**: appends and reads cross segment boundaries
//!   without the caller noticing.
//! * **Self-describing segments**: every segment header persists the
//!   store's segment size, compression settings, and caller metadata, so a
//!   store reopens without external coordination.
//! * **Deterministic durability**: explicit `flush`/`sync`/`close`, with
//!   evicted handles closed synchronously.
//!
//! ## Example
//!
//! ```no_run
//! use seglog::{LogOptions, SegmentedLog};
//!
//! # fn main() -> seglog::Result<()> {
//! let mut opts = LogOptions::new();
//! opts.file_size = 1 << 20;
//! opts.metadata = b"ledger-v1".to_vec();
//!
//! let log = SegmentedLog::open("./ledger_data", opts)?;
//!
//! let (off, n) = log.append(b"transaction_data")?;
//!
//! let mut buf = vec![0u8; n];
//! log.read_at(&mut buf, off)?;
//!
//! log.close()?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod error;
mod log;
mod meta;
mod segment;
mod util;

// Re-exports for the flat public API
pub use config::{CompressionFormat, LogOptions};
pub use error::{AppendError, Error, Result};
pub use log::SegmentedLog;
pub use meta::Metadata;
pub use segment::{Segment, SegmentOptions};
