mod common;
use common::TestEnv;
use seglog::{AppendError, Error, LogOptions, SegmentedLog};

#[test]
fn test_append_returns_stable_offsets() {
  let env = TestEnv::small(8, 2);

  assert_eq!(env.log.append(b"abcdef").unwrap(), (0, 6));
  assert_eq!(env.log.append(b"ghij").unwrap(), (6, 4));
  assert_eq!(env.log.size().unwrap(), 10);

  let mut buf = [0u8; 10];
  assert_eq!(env.log.read_at(&mut buf, 0).unwrap(), 10);
  assert_eq!(&buf, b"abcdefghij");

  // The second append crossed into a new segment file.
  assert!(env.root.join("00000000.aof").exists());
  assert!(env.root.join("00000001.aof").exists());
}

#[test]
fn test_offsets_are_contiguous() {
  let env = TestEnv::small(16, 2);

  let mut expected = 0u64;
  for chunk in [&b"aaa"[..], b"bbbbb", b"cc", b"ddddddddddddddddddddd"] {
    let (start, n) = env.log.append(chunk).unwrap();
    assert_eq!(start, expected);
    assert_eq!(n, chunk.len());
    expected += n as u64;

    assert_eq!(env.log.offset(), expected);
    assert_eq!(env.log.size().unwrap(), expected);
  }
}

#[test]
fn test_every_appended_byte_is_readable() {
  let env = TestEnv::small(8, 2);

  let (start, n) = env.log.append(b"0123456789abcdef").unwrap();
  for i in 0..n as u64 {
    let mut one = [0u8; 1];
    env.log.read_at(&mut one, start + i).unwrap();
    assert_eq!(one[0], b"0123456789abcdef"[i as usize]);
  }
}

#[test]
fn test_empty_buffers_rejected() {
  let env = TestEnv::with_default();

  assert!(matches!(
    env.log.append(b""),
    Err(AppendError { n: 0, source: Error::IllegalArguments(_), .. })
  ));

  let mut empty = [0u8; 0];
  assert!(matches!(env.log.read_at(&mut empty, 0), Err(Error::IllegalArguments(_))));
}

#[test]
fn test_read_beyond_size_fails() {
  let env = TestEnv::small(8, 2);
  env.log.append(b"abc").unwrap();

  let mut buf = [0u8; 8];
  assert!(matches!(env.log.read_at(&mut buf, 0), Err(Error::ReadBeyondSize)));

  // An offset pointing past every segment on disk fails on the missing file.
  assert!(env.log.read_at(&mut buf, 100).is_err());
}

#[test]
fn test_metadata_round_trip() {
  let mut opts = LogOptions::default();
  opts.metadata = b"ledger-v1".to_vec();
  let env = TestEnv::new(opts);

  assert_eq!(env.log.metadata(), b"ledger-v1");
}

#[test]
fn test_operations_after_close() {
  let env = TestEnv::with_default();
  env.log.append(b"x").unwrap();
  env.log.close().unwrap();

  assert!(matches!(env.log.size(), Err(Error::AlreadyClosed)));
  assert!(matches!(
    env.log.append(b"y"),
    Err(AppendError { source: Error::AlreadyClosed, .. })
  ));
  assert!(matches!(env.log.set_offset(0), Err(Error::AlreadyClosed)));
  assert!(matches!(env.log.flush(), Err(Error::AlreadyClosed)));
  assert!(matches!(env.log.sync(), Err(Error::AlreadyClosed)));

  let mut buf = [0u8; 1];
  assert!(matches!(env.log.read_at(&mut buf, 0), Err(Error::AlreadyClosed)));

  // A second close reports the terminal state.
  assert!(matches!(env.log.close(), Err(Error::AlreadyClosed)));
}

#[test]
fn test_open_on_file_path_fails() {
  let dir = tempfile::tempdir().unwrap();
  let file_path = dir.path().join("not_a_dir");
  std::fs::write(&file_path, b"data").unwrap();

  assert!(matches!(
    SegmentedLog::open(&file_path, LogOptions::default()),
    Err(Error::NotADirectory(_))
  ));
}

#[test]
fn test_unparseable_entry_fails_open() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("garbage.aof"), b"junk").unwrap();

  assert!(matches!(
    SegmentedLog::open(dir.path(), LogOptions::default()),
    Err(Error::InvalidFilename(_))
  ));
}

#[test]
fn test_open_empty_directory_creates_first_segment() {
  let dir = tempfile::tempdir().unwrap();
  let log = SegmentedLog::open(dir.path(), LogOptions::default()).unwrap();

  assert_eq!(log.size().unwrap(), 0);
  assert!(dir.path().join("00000000.aof").exists());
}

#[test]
fn test_read_only_requires_existing_directory() {
  let dir = tempfile::tempdir().unwrap();
  let mut opts = LogOptions::default();
  opts.read_only = true;

  assert!(matches!(
    SegmentedLog::open(dir.path().join("absent"), opts),
    Err(Error::Io(_))
  ));
}

#[test]
fn test_invalid_options_rejected() {
  let dir = tempfile::tempdir().unwrap();

  let mut opts = LogOptions::default();
  opts.file_size = 0;
  assert!(matches!(
    SegmentedLog::open(dir.path(), opts),
    Err(Error::Config(_))
  ));

  let mut opts = LogOptions::default();
  opts.max_opened_files = 0;
  assert!(matches!(
    SegmentedLog::open(dir.path(), opts),
    Err(Error::Config(_))
  ));
}
