use seglog::{LogOptions, SegmentedLog};
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestEnv {
  pub log: SegmentedLog,
  // Holding the TempDir keeps the directory alive for the test's duration.
  pub _dir: TempDir,
  pub root: PathBuf,
}

impl TestEnv {
  pub fn new(opts: LogOptions) -> Self {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("log");

    let log = SegmentedLog::open(&root, opts).unwrap();

    Self { log, _dir: dir, root }
  }

  pub fn with_default() -> Self {
    Self::new(LogOptions::default())
  }

  /// A store with tiny segments and a tiny handle cache to stress rollover
  /// and eviction.
  pub fn small(file_size: u64, max_opened_files: usize) -> Self {
    let mut opts = LogOptions::default();
    opts.file_size = file_size;
    opts.max_opened_files = max_opened_files;
    opts.synced = false;
    Self::new(opts)
  }
}
