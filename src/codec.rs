//! AES-256-CBC encryption/decryption with PKCS#7 padding, plus the PBKDF2-HMAC
//! key derivation primitives used to turn passwords into keys.
//!
//! # Security
//!
//! This envelope is unauthenticated CBC: there is no MAC, so a corrupted or
//! tampered ciphertext decrypts to garbage rather than raising an integrity
//! error. Wrong-key/wrong-IV decryption is expected to fail downstream (at
//! PKCS#7 strip or DEFLATE decompression) rather than here, and that failure is
//! the system's only master-password check. See the crate's design notes for
//! why this is preserved rather than upgraded to an AEAD.

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Sha256, Sha384};
use zeroize::Zeroize;

use crate::error::{Result, VaultError};

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// Encrypts and decrypts with AES-256 in CBC mode for a fixed (key, IV) pair.
pub struct Codec {
  key: [u8; 32],
  iv: [u8; 16],
}

impl Codec {
  /// Builds a codec from a 32-byte key and a 16-byte IV.
  pub fn new(key: [u8; 32], iv: [u8; 16]) -> Self {
    Self { key, iv }
  }

  /// Splits a 48-byte `key || iv` block into a codec. Used after
  /// `derive_key_and_iv`, whose 48-byte output is exactly `key(32) || iv(16)`.
  pub fn from_key_iv_block(block: &[u8]) -> Result<Self> {
    if block.len() != 48 {
      return Err(VaultError::InvalidLength(format!(
        "key+iv block must be 48 bytes, got {}",
        block.len()
      )));
    }
    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&block[..32]);
    iv.copy_from_slice(&block[32..48]);
    Ok(Self::new(key, iv))
  }

  /// Derives a 32-byte key via PBKDF2-HMAC-SHA256. Used for the *data key*
  /// that encrypts the records blob.
  pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
  }

  /// Derives a 48-byte `key || iv` block via PBKDF2-HMAC-SHA384. Used for the
  /// *wrapping key* (and its IV) derived from the master password.
  pub fn derive_key_and_iv(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 48] {
    let mut out = [0u8; 48];
    pbkdf2_hmac::<Sha384>(password, salt, iterations, &mut out);
    out
  }

  /// Generates a fresh 32-byte salt from the OS CSPRNG.
  pub fn create_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    salt
  }

  /// Generates a fresh 16-byte IV from the OS CSPRNG.
  pub fn create_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut iv);
    iv
  }

  /// Pads `data` to the next multiple of 16 with PKCS#7 padding. Always adds
  /// at least one byte of padding, even if `data` is already block-aligned.
  pub fn pkcs7_add(data: &[u8]) -> Vec<u8> {
    let pad_len = 16 - (data.len() % 16);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
  }

  /// Strips PKCS#7 padding by reading the last byte as the pad length and
  /// dropping that many trailing bytes. Performs no validity check beyond
  /// the implied length, a deliberately faithful reproduction of the
  /// original system's behavior (see design notes).
  pub fn pkcs7_strip(data: &[u8]) -> Vec<u8> {
    match data.last() {
      Some(&n) if (n as usize) <= data.len() => data[..data.len() - n as usize].to_vec(),
      _ => Vec::new(),
    }
  }

  /// Encrypts `data` with AES-256-CBC, PKCS#7-padded.
  pub fn encrypt(&self, data: &[u8]) -> Vec<u8> {
    let padded = Self::pkcs7_add(data);
    self.encrypt_unpadded(&padded).expect("padded input is always block-aligned")
  }

  /// Decrypts `ciphertext` with AES-256-CBC and strips PKCS#7 padding.
  pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let plain = self.decrypt_unpadded(ciphertext)?;
    Ok(Self::pkcs7_strip(&plain))
  }

  /// Encrypts `data` with AES-256-CBC and no padding. Fails if `data`'s
  /// length is not a multiple of 16.
  pub fn encrypt_unpadded(&self, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % 16 != 0 {
      return Err(VaultError::InvalidLength(format!(
        "unpadded input must be a multiple of 16 bytes, got {}",
        data.len()
      )));
    }
    let mut buf = data.to_vec();
    let encryptor = Encryptor::new(&self.key.into(), &self.iv.into());
    let out_len = encryptor
      .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
      .expect("block-aligned input cannot overflow NoPadding")
      .len();
    buf.truncate(out_len);
    Ok(buf)
  }

  /// Decrypts `data` with AES-256-CBC and no padding. Fails if `data`'s
  /// length is not a multiple of 16.
  pub fn decrypt_unpadded(&self, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % 16 != 0 {
      return Err(VaultError::InvalidLength(format!(
        "unpadded input must be a multiple of 16 bytes, got {}",
        data.len()
      )));
    }
    let mut buf = data.to_vec();
    let decryptor = Decryptor::new(&self.key.into(), &self.iv.into());
    let out_len = decryptor
      .decrypt_padded_mut::<NoPadding>(&mut buf)
      .map_err(|e| VaultError::InvalidFormat(format!("cbc decrypt failed: {e}")))?
      .len();
    buf.truncate(out_len);
    Ok(buf)
  }
}

impl Drop for Codec {
  fn drop(&mut self) {
    self.key.zeroize();
    self.iv.zeroize();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pkcs7_round_trip() {
    for len in 0..40 {
      let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
      let padded = Codec::pkcs7_add(&data);
      assert_eq!(padded.len() % 16, 0);
      let diff = padded.len() - data.len();
      assert!((1..=16).contains(&diff));
      assert_eq!(Codec::pkcs7_strip(&padded), data);
    }
  }

  #[test]
  fn pkcs7_add_always_pads_aligned_input() {
    let data = vec![0u8; 32];
    let padded = Codec::pkcs7_add(&data);
    assert_eq!(padded.len(), 48);
    assert!(padded[32..].iter().all(|&b| b == 16));
  }

  #[test]
  fn encrypt_decrypt_round_trip() {
    let codec = Codec::new([7u8; 32], [9u8; 16]);
    let data = b"the quick brown fox jumps over the lazy dog";
    let ct = codec.encrypt(data);
    let pt = codec.decrypt(&ct).unwrap();
    assert_eq!(pt, data);
  }

  #[test]
  fn padding_boundary_exactly_one_block() {
    let codec = Codec::new([1u8; 32], [2u8; 16]);
    let ct = codec.encrypt(&[0u8; 16]);
    assert_eq!(ct.len(), 32);
  }

  #[test]
  fn unpadded_requires_block_alignment() {
    let codec = Codec::new([1u8; 32], [2u8; 16]);
    assert!(codec.encrypt_unpadded(&[0u8; 15]).is_err());
    assert!(codec.encrypt_unpadded(&[0u8; 16]).is_ok());
  }

  #[test]
  fn derive_key_is_deterministic() {
    let a = Codec::derive_key(b"hunter2", b"salt-value-000000000000000000", 8);
    let b = Codec::derive_key(b"hunter2", b"salt-value-000000000000000000", 8);
    assert_eq!(a, b);
  }

  #[test]
  fn derive_key_matches_pbkdf2_hmac_sha256_test_vector() {
    // RFC 7914-style reference vector: PBKDF2-HMAC-SHA256("password", "salt", 1, 32)
    let key = Codec::derive_key(b"password", b"salt", 1);
    let expected =
      hex_decode("120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b");
    assert_eq!(key.to_vec(), expected);
  }

  fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
      .step_by(2)
      .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
      .collect()
  }

  #[test]
  fn derive_key_and_iv_splits_48_bytes() {
    let block = Codec::derive_key_and_iv(b"pw", b"salt", 4);
    assert_eq!(block.len(), 48);
    let codec = Codec::from_key_iv_block(&block).unwrap();
    assert_eq!(codec.key, block[..32]);
    assert_eq!(codec.iv, block[32..]);
  }
}
