use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

use crate::error::{Error, Result};

/// An envelope that ends mid-entry is damaged, not an I/O condition.
fn truncated(e: io::Error) -> Error {
  if e.kind() == io::ErrorKind::UnexpectedEof {
    Error::Corruption("truncated metadata envelope".into())
  } else {
    Error::Io(e)
  }
}

/// Ordered key-value blob stored in every segment header.
///
/// Entries keep insertion order. Values are raw bytes; integers are stored
/// as 8-byte little-endian via the typed accessors.
///
/// Wire format per entry: `[key_len u8][key][val_len u32][val]`, entries
/// concatenated with no count prefix.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
  entries: Vec<(String, Vec<u8>)>,
}

impl Metadata {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_bytes(bs: &[u8]) -> Result<Self> {
    let mut cursor = Cursor::new(bs);
    let mut entries = Vec::new();
    let len = bs.len() as u64;

    while cursor.position() < len {
      let key_len = cursor.read_u8().map_err(truncated)? as usize;
      if key_len == 0 {
        return Err(Error::Corruption("empty metadata key".into()));
      }
      let mut key_buf = vec![0u8; key_len];
      cursor.read_exact(&mut key_buf).map_err(truncated)?;
      let key = String::from_utf8(key_buf)
        .map_err(|e| Error::Corruption(format!("invalid UTF-8 in metadata key: {}", e)))?;

      let val_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
      let mut val = vec![0u8; val_len];
      cursor.read_exact(&mut val).map_err(truncated)?;

      entries.push((key, val));
    }

    Ok(Self { entries })
  }

  /// Inserts or replaces the value under `key`.
  pub fn put(&mut self, key: &str, value: &[u8]) -> &mut Self {
    match self.entries.iter_mut().find(|(k, _)| k == key) {
      Some((_, v)) => *v = value.to_vec(),
      None => self.entries.push((key.to_string(), value.to_vec())),
    }
    self
  }

  pub fn put_int(&mut self, key: &str, value: u64) -> &mut Self {
    self.put(key, &value.to_le_bytes())
  }

  pub fn get(&self, key: &str) -> Option<&[u8]> {
    self
      .entries
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_slice())
  }

  pub fn get_int(&self, key: &str) -> Option<u64> {
    let bs = self.get(key)?;
    let arr: [u8; 8] = bs.try_into().ok()?;
    Some(u64::from_le_bytes(arr))
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    let total: usize = self.entries.iter().map(|(k, v)| 1 + k.len() + 4 + v.len()).sum();
    let mut buf = Vec::with_capacity(total);

    for (key, val) in &self.entries {
      // Keys longer than 255 bytes cannot round-trip through the u8 length.
      debug_assert!(key.len() <= u8::MAX as usize);
      buf.push(key.len() as u8);
      buf.extend_from_slice(key.as_bytes());
      buf.extend_from_slice(&(val.len() as u32).to_le_bytes());
      buf.extend_from_slice(val);
    }
    buf
  }
}
