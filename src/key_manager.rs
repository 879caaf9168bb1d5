//! Owns the master-derived wrapping key, the KGK (key generation key), and
//! the inner salt/IV used to derive the records data key. Performs
//! unwrap/wrap of the 112-byte KGK block.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::codec::Codec;
use crate::error::{Result, VaultError};

const WRAPPING_KEY_IV_ITERATIONS: u32 = 32_768;

/// Key hierarchy state: the master-derived wrapping codec, the KGK, and the
/// inner salt/IV that parameterize data-key derivation.
#[derive(Default)]
pub struct KeyManager {
  outer_salt: Vec<u8>,
  wrapping_codec: Option<Codec>,
  inner_salt: Vec<u8>,
  inner_iv: Vec<u8>,
  kgk: Vec<u8>,
}

impl KeyManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// `is_ready()` holds exactly when there is both a 64-byte KGK and a
  /// wrapping codec in place.
  pub fn is_ready(&self) -> bool {
    self.kgk.len() == 64 && self.wrapping_codec.is_some()
  }

  pub fn kgk(&self) -> &[u8] {
    &self.kgk
  }

  pub fn inner_salt(&self) -> &[u8] {
    &self.inner_salt
  }

  pub fn inner_iv(&self) -> &[u8] {
    &self.inner_iv
  }

  pub fn outer_salt(&self) -> &[u8] {
    &self.outer_salt
  }

  /// Derives the wrapping key/IV from `(master_password, outer_salt)`, then
  /// either unwraps an existing 112-byte KGK block or initializes a fresh
  /// KGK and inner salt/IV if `wrapped_kgk` isn't exactly 112 bytes.
  pub fn unwrap(&mut self, master_password: &[u8], outer_salt: &[u8], wrapped_kgk: &[u8]) -> Result<()> {
    self.outer_salt = outer_salt.to_vec();
    let mut key_iv_block = Codec::derive_key_and_iv(master_password, outer_salt, WRAPPING_KEY_IV_ITERATIONS);
    let wrapping_codec = Codec::from_key_iv_block(&key_iv_block)?;
    key_iv_block.zeroize();

    if wrapped_kgk.len() != 112 {
      self.kgk = Self::generate_kgk();
      self.inner_salt = Codec::create_salt().to_vec();
      self.inner_iv = Codec::create_iv().to_vec();
    } else {
      let mut plaintext = wrapping_codec.decrypt_unpadded(wrapped_kgk)?;
      self.inner_salt = plaintext[0..32].to_vec();
      self.inner_iv = plaintext[32..48].to_vec();
      self.kgk = plaintext[48..112].to_vec();
      plaintext.zeroize();
    }
    self.wrapping_codec = Some(wrapping_codec);
    Ok(())
  }

  fn generate_kgk() -> Vec<u8> {
    let mut kgk = vec![0u8; 64];
    OsRng.fill_bytes(&mut kgk);
    kgk
  }

  /// Produces the 112-byte wrapped KGK block under the current wrapping
  /// codec and inner salt/IV.
  pub fn wrap(&self) -> Result<Vec<u8>> {
    let codec = self
      .wrapping_codec
      .as_ref()
      .ok_or_else(|| VaultError::MissingPreference("no wrapping codec set".to_string()))?;
    let mut plaintext = Vec::with_capacity(112);
    plaintext.extend_from_slice(&self.inner_salt);
    plaintext.extend_from_slice(&self.inner_iv);
    plaintext.extend_from_slice(&self.kgk);
    codec.encrypt_unpadded(&plaintext)
  }

  /// Replaces the inner salt and IV with freshly sampled random bytes, then
  /// re-wraps the (unchanged) KGK. Called on every save so that the data-key
  /// derivation uses fresh parameters on each write.
  pub fn rewrap_with_new_inner(&mut self) -> Result<Vec<u8>> {
    self.inner_salt = Codec::create_salt().to_vec();
    self.inner_iv = Codec::create_iv().to_vec();
    self.wrap()
  }

  /// Clears all key-hierarchy state for lock-out, zeroizing the KGK and
  /// inner salt/IV before dropping them.
  pub fn reset(&mut self) {
    self.outer_salt.zeroize();
    self.outer_salt.clear();
    self.wrapping_codec = None;
    self.inner_salt.zeroize();
    self.inner_salt.clear();
    self.inner_iv.zeroize();
    self.inner_iv.clear();
    self.kgk.zeroize();
    self.kgk.clear();
  }
}

impl Drop for KeyManager {
  fn drop(&mut self) {
    self.kgk.zeroize();
    self.inner_salt.zeroize();
    self.inner_iv.zeroize();
  }
}
