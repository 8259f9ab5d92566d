/// Generates a segment filename from a segment id.
/// Format: 00000042.aof (zero-padded to at least 8 digits).
pub fn segment_name(id: u64, ext: &str) -> String {
  format!("{:08}.{}", id, ext)
}

/// Parses a segment id from a segment filename stem.
/// The extension, if any, is ignored; the stem must be a base-10 integer.
pub fn parse_segment_id(filename: &str) -> Option<u64> {
  let stem = match filename.rsplit_once('.') {
    Some((stem, _ext)) => stem,
    None => filename,
  };
  stem.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_filenames() {
    let name = segment_name(42, "aof");
    assert_eq!(name, "00000042.aof");
    assert_eq!(parse_segment_id(&name), Some(42));
  }

  #[test]
  fn test_padding_preserves_lexicographic_order() {
    let a = segment_name(9, "aof");
    let b = segment_name(10, "aof");
    assert!(a < b);
  }

  #[test]
  fn test_parse_rejects_garbage() {
    assert_eq!(parse_segment_id("segment.aof"), None);
    assert_eq!(parse_segment_id(".aof"), None);
    assert_eq!(parse_segment_id("00000001.idx"), Some(1));
  }
}
