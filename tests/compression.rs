#![cfg(feature = "compression")]

mod common;
use common::TestEnv;
use seglog::{CompressionFormat, LogOptions, SegmentedLog};

fn lz4_opts(file_size: u64) -> LogOptions {
  let mut opts = LogOptions::default();
  opts.file_size = file_size;
  opts.compression_format = CompressionFormat::Lz4;
  opts.synced = false;
  opts
}

/// Bytes that LZ4 cannot shrink, so compressed blocks stay near raw size.
fn incompressible(len: usize) -> Vec<u8> {
  (0..len as u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect()
}

#[test]
fn test_compressed_round_trip_by_offset() {
  let env = TestEnv::new(lz4_opts(1 << 16));

  let payload = vec![b'A'; 10_000];
  let (off, n) = env.log.append(&payload).unwrap();
  assert_eq!((off, n), (0, 10_000));

  let mut buf = vec![0u8; 10_000];
  assert_eq!(env.log.read_at(&mut buf, off).unwrap(), 10_000);
  assert_eq!(buf, payload);

  // 10KB of repeated bytes must land well below raw size on disk.
  assert!(
    env.log.size().unwrap() < 1_000,
    "compression ineffective: {} bytes on disk",
    env.log.size().unwrap()
  );
}

#[test]
fn test_blobs_addressed_by_returned_offset() {
  let env = TestEnv::new(lz4_opts(1 << 16));

  let blobs: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 2_000]).collect();
  let mut offsets = Vec::new();

  for blob in &blobs {
    // Each append starts where the previous one left the store.
    let expected_start = env.log.size().unwrap();
    let (off, n) = env.log.append(blob).unwrap();
    assert_eq!(off, expected_start);
    assert_eq!(n, blob.len());
    offsets.push(off);
  }

  for (blob, off) in blobs.iter().zip(&offsets) {
    let mut buf = vec![0u8; blob.len()];
    env.log.read_at(&mut buf, *off).unwrap();
    assert_eq!(&buf, blob);
  }
}

#[test]
fn test_full_tail_rolls_before_next_block() {
  // A compressed block is never split across segments: once the tail is
  // full the next blob starts a fresh segment at in-file offset 0.
  let env = TestEnv::new(lz4_opts(64));

  let blob = incompressible(200);
  assert_eq!(env.log.append(&blob).unwrap().0, 0);
  assert!(env.log.offset() > 64);

  let (second, _) = env.log.append(&blob).unwrap();
  assert_eq!(second, 64);
  assert!(env.root.join("00000001.aof").exists());

  let mut buf = vec![0u8; 200];
  env.log.read_at(&mut buf, second).unwrap();
  assert_eq!(buf, blob);
}

#[test]
fn test_compression_settings_recovered_on_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let root = dir.path().join("log");

  {
    let mut opts = lz4_opts(1 << 16);
    opts.compression_level = 3;
    let log = SegmentedLog::open(&root, opts).unwrap();
    log.append(b"compressed_data").unwrap();
    log.close().unwrap();
  }

  // Reopen without asking for compression; the tail header wins.
  let mut opts = LogOptions::default();
  opts.synced = false;
  let log = SegmentedLog::open(&root, opts).unwrap();

  assert_eq!(log.compression_format(), CompressionFormat::Lz4);
  assert_eq!(log.compression_level(), 3);

  let mut buf = [0u8; 15];
  log.read_at(&mut buf, 0).unwrap();
  assert_eq!(&buf, b"compressed_data");
}
