//! Fixed-offset binary layout for the vault's single on-disk file.
//!
//! ```text
//! [0, 32)    outer salt
//! [32, 144)  wrapped KGK block (112 bytes)
//! [144, EOF) records ciphertext blob
//! ```
//!
//! The whole file is read into memory once at construction; each `put_*`
//! mutates the in-memory buffer and then flushes the affected region to
//! disk with a seek + write (+ truncate for the trailing region). There is
//! no atomic-rename step, so a crash between two `put_*` calls during a save
//! can leave the file inconsistent (see the crate's design notes).

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};

const SALT_END: usize = 32;
const KGK_BLOCK_END: usize = 144;
const KGK_BLOCK_LEN: usize = KGK_BLOCK_END - SALT_END;

/// Owns the single on-disk vault path and an in-memory mirror of its bytes.
pub struct VaultFile {
  path: PathBuf,
  data: Vec<u8>,
}

impl VaultFile {
  /// Opens (or prepares to create) the vault file at `path`. A missing file
  /// is a valid empty vault.
  pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let data = if path.is_file() { fs::read(&path)? } else { Vec::new() };
    Ok(Self { path, data })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn exists(&self) -> bool {
    self.path.is_file()
  }

  /// Returns bytes `[0, 32)`.
  pub fn get_salt(&self) -> Vec<u8> {
    self.data.get(..SALT_END).map(|s| s.to_vec()).unwrap_or_default()
  }

  /// Writes the outer salt. Requires exactly 32 bytes. Creates the file
  /// with just those bytes if it did not exist yet.
  pub fn put_salt(&mut self, salt: &[u8]) -> Result<()> {
    if salt.len() != 32 {
      return Err(VaultError::InvalidLength(format!(
        "salt must be 32 bytes, got {}",
        salt.len()
      )));
    }
    if self.data.len() < SALT_END {
      self.data.resize(SALT_END, 0);
    }
    self.data[..SALT_END].copy_from_slice(salt);
    self.flush_region(0, &self.data[..SALT_END].to_vec())
  }

  /// Returns bytes `[32, 144)`.
  pub fn get_wrapped_kgk(&self) -> Vec<u8> {
    if self.data.len() < KGK_BLOCK_END {
      return Vec::new();
    }
    self.data[SALT_END..KGK_BLOCK_END].to_vec()
  }

  /// Writes the wrapped KGK block. Requires exactly 112 bytes. Pads the
  /// file with 32 zero bytes of outer salt if it did not exist yet.
  pub fn put_wrapped_kgk(&mut self, block: &[u8]) -> Result<()> {
    if block.len() != KGK_BLOCK_LEN {
      return Err(VaultError::InvalidLength(format!(
        "wrapped KGK block must be {KGK_BLOCK_LEN} bytes, got {}",
        block.len()
      )));
    }
    if self.data.len() < KGK_BLOCK_END {
      self.data.resize(KGK_BLOCK_END, 0);
    }
    self.data[SALT_END..KGK_BLOCK_END].copy_from_slice(block);
    self.flush_region(SALT_END, &self.data[SALT_END..KGK_BLOCK_END].to_vec())
  }

  /// Returns bytes `[144, EOF)`.
  pub fn get_records_blob(&self) -> Vec<u8> {
    if self.data.len() < KGK_BLOCK_END {
      return Vec::new();
    }
    self.data[KGK_BLOCK_END..].to_vec()
  }

  /// Writes the records ciphertext blob, truncating any bytes beyond it.
  /// If the file did not exist yet, writes 144 zero bytes of header first.
  pub fn put_records_blob(&mut self, blob: &[u8]) -> Result<()> {
    if self.data.len() < KGK_BLOCK_END {
      self.data.resize(KGK_BLOCK_END, 0);
    }
    self.data.truncate(KGK_BLOCK_END);
    self.data.extend_from_slice(blob);

    let mut file = OpenOptions::new()
      .create(true)
      .write(true)
      .read(true)
      .open(&self.path)?;
    file.seek(SeekFrom::Start(KGK_BLOCK_END as u64))?;
    file.write_all(blob)?;
    file.set_len((KGK_BLOCK_END + blob.len()) as u64)?;
    Ok(())
  }

  fn flush_region(&self, offset: usize, bytes: &[u8]) -> Result<()> {
    let _ = self.exists();
    let mut file = OpenOptions::new()
      .create(true)
      .write(true)
      .read(true)
      .open(&self.path)?;
    file.seek(SeekFrom::Start(offset as u64))?;
    file.write_all(bytes)?;
    Ok(())
  }
}
