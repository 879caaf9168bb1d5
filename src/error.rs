//! Error types shared across the vault's cryptographic and storage layers.
//!
//! A small enum of named variants, each carrying a `String` detail, with a
//! manual `impl From<io::Error>` rather than a derive-macro crate.

use std::fmt;
use std::io;

/// Errors that can occur while unlocking, reading, or writing a vault.
#[derive(Debug)]
pub enum VaultError {
  /// Decompression of the records blob failed after decryption, or the
  /// stored record count exceeds the number of keys actually parsed from
  /// JSON. This is the system's only master-password check.
  WrongMasterPassword,
  /// A fixed-length input (salt, wrapped-KGK block, an unpadded-cipher
  /// input) did not match its required length. Indicates on-disk corruption.
  InvalidLength(String),
  /// A byte-typed field received non-bytes, or vice versa.
  TypeMismatch(String),
  /// Unparseable timestamp, unparseable JSON, or a DEFLATE stream error not
  /// attributable to a wrong master password.
  InvalidFormat(String),
  /// KeyManager was asked to produce a wrapped block before a wrapping
  /// codec was established.
  MissingPreference(String),
  /// Underlying file I/O failure.
  Io(String),
}

impl fmt::Display for VaultError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VaultError::WrongMasterPassword => write!(f, "wrong master password"),
      VaultError::InvalidLength(msg) => write!(f, "invalid length: {msg}"),
      VaultError::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
      VaultError::InvalidFormat(msg) => write!(f, "invalid format: {msg}"),
      VaultError::MissingPreference(msg) => write!(f, "missing preference: {msg}"),
      VaultError::Io(msg) => write!(f, "io error: {msg}"),
    }
  }
}

impl std::error::Error for VaultError {}

impl From<io::Error> for VaultError {
  fn from(e: io::Error) -> Self {
    VaultError::Io(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, VaultError>;
