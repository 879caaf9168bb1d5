//! DEFLATE (zlib-wrapped) compression with a 4-byte big-endian
//! uncompressed-length prefix, matching the original system's `zlib`-based
//! packer byte for byte.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Result, VaultError};

/// Compresses and decompresses with the zlib container at best compression.
pub struct Packer;

impl Packer {
  /// Compresses `data`. The first four bytes of the output are the
  /// big-endian length of the *uncompressed* input.
  pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).expect("writing to an in-memory encoder cannot fail");
    let compressed = encoder.finish().expect("finishing an in-memory encoder cannot fail");

    let mut out = Vec::with_capacity(4 + compressed.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&compressed);
    out
  }

  /// Decompresses `compressed_data`. The first four bytes are skipped (they
  /// are the uncompressed length, which `flate2` does not need to know up
  /// front); a zlib-stream error is surfaced as `VaultError::WrongMasterPassword`
  /// since the only time this system feeds garbage to the decompressor is
  /// after decrypting with the wrong key.
  pub fn decompress(compressed_data: &[u8]) -> Result<Vec<u8>> {
    if compressed_data.len() < 4 {
      return Err(VaultError::WrongMasterPassword);
    }
    let mut decoder = ZlibDecoder::new(&compressed_data[4..]);
    let mut out = Vec::new();
    decoder
      .read_to_end(&mut out)
      .map_err(|_| VaultError::WrongMasterPassword)?;
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trip() {
    let data = b"some moderately repetitive data data data data data";
    let compressed = Packer::compress(data);
    let decompressed = Packer::decompress(&compressed).unwrap();
    assert_eq!(decompressed, data);
  }

  #[test]
  fn length_prefix_is_big_endian_uncompressed_length() {
    let data = vec![0u8; 1000];
    let compressed = Packer::compress(&data);
    let len = u32::from_be_bytes(compressed[..4].try_into().unwrap());
    assert_eq!(len as usize, data.len());
  }

  #[test]
  fn garbage_input_is_wrong_master_password() {
    let garbage = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
    assert!(matches!(
      Packer::decompress(&garbage),
      Err(VaultError::WrongMasterPassword)
    ));
  }

  #[test]
  fn too_short_input_is_wrong_master_password() {
    assert!(matches!(
      Packer::decompress(&[1, 2, 3]),
      Err(VaultError::WrongMasterPassword)
    ));
  }
}
