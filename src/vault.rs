//! Top-level orchestrator wiring together the on-disk file, the key
//! hierarchy, and the in-memory record collection behind the small contract
//! a caller (CLI, GUI, extension, whatever) actually needs: unlock, browse,
//! edit, reveal, save.

use chrono::{NaiveDateTime, Utc};

use crate::error::{Result, VaultError};
use crate::key_manager::KeyManager;
use crate::password_deriver;
use crate::record::Record;
use crate::record_store::RecordStore;
use crate::vault_file::VaultFile;

/// A single opened vault: one file on disk, one key hierarchy, the records
/// it currently holds in memory.
///
/// Not `Sync` by construction choice: a caller that needs to share a
/// `Vault` across threads wraps it in a mutex itself; this crate doesn't
/// impose one.
pub struct Vault {
  file: VaultFile,
  key_manager: KeyManager,
  store: RecordStore,
  unlocked: bool,
}

impl Vault {
  /// Opens (or prepares to create) the vault file at `path`. The vault
  /// starts locked; call `unlock` before any other operation.
  pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Self> {
    Ok(Self {
      file: VaultFile::open(path)?,
      key_manager: KeyManager::new(),
      store: RecordStore::new(),
      unlocked: false,
    })
  }

  /// Derives the key hierarchy from `master_password` and loads the
  /// existing records, if any. A wrong password on an existing vault does
  /// not fail here, it fails once the records blob is decrypted and its
  /// DEFLATE stream or declared count don't check out, as
  /// `WrongMasterPassword`.
  ///
  /// On a vault file that doesn't exist yet (or is empty), this
  /// initializes a fresh key hierarchy and leaves the vault unlocked with
  /// zero records. The first `save()` creates the file.
  pub fn unlock(&mut self, master_password: &str) -> Result<()> {
    let outer_salt = self.file.get_salt();
    let outer_salt = if outer_salt.len() == 32 {
      outer_salt
    } else {
      crate::codec::Codec::create_salt().to_vec()
    };
    let wrapped_kgk = self.file.get_wrapped_kgk();

    self.key_manager.unwrap(master_password.as_bytes(), &outer_salt, &wrapped_kgk)?;

    if let Err(e) = self.store.load(&self.file, &self.key_manager) {
      self.key_manager.reset();
      self.unlocked = false;
      return Err(e);
    }
    self.unlocked = true;
    Ok(())
  }

  fn require_unlocked(&self) -> Result<()> {
    if self.unlocked {
      Ok(())
    } else {
      Err(VaultError::MissingPreference("vault is locked".to_string()))
    }
  }

  pub fn is_unlocked(&self) -> bool {
    self.unlocked
  }

  /// Lists every domain currently held in memory.
  pub fn domains(&self) -> Result<Vec<String>> {
    self.require_unlocked()?;
    Ok(self.store.domains())
  }

  /// Returns the record for `domain`, if one exists.
  pub fn get(&self, domain: &str) -> Result<Option<&Record>> {
    self.require_unlocked()?;
    Ok(self.store.get(domain))
  }

  /// Returns the record for `domain`, creating a fresh one (with default
  /// settings) if none exists yet.
  pub fn get_or_create(&mut self, domain: &str) -> Result<&mut Record> {
    self.require_unlocked()?;
    Ok(self.store.get_or_create(domain, now()))
  }

  /// Inserts or replaces `record`, touching its modification date.
  pub fn put(&mut self, mut record: Record) -> Result<()> {
    self.require_unlocked()?;
    record.touch(now());
    self.store.put(record);
    Ok(())
  }

  /// Removes the record for `domain`. Returns whether one was removed.
  pub fn delete(&mut self, domain: &str) -> Result<bool> {
    self.require_unlocked()?;
    Ok(self.store.delete(domain))
  }

  /// Derives the password for `domain`'s current template/salt/iterations,
  /// or returns its fixed password verbatim if one is set.
  pub fn reveal(&self, domain: &str) -> Result<String> {
    self.require_unlocked()?;
    let record = self
      .store
      .get(domain)
      .ok_or_else(|| VaultError::InvalidFormat(format!("no record for domain {domain}")))?;

    if record.has_fixed_password() {
      return Ok(record.fixed_password.clone().unwrap_or_default());
    }

    Ok(password_deriver::generate(
      domain,
      self.key_manager.kgk(),
      &record.salt,
      record.iterations,
      &record.template,
      &record.extra_characters,
    ))
  }

  /// Writes the outer salt (on first save), re-wraps the KGK under fresh
  /// inner salt/IV, and persists the encrypted records blob.
  ///
  /// Note the write ordering: the records blob is written before the
  /// rewrapped KGK block, matching the original system's save order. A
  /// crash between the two leaves the file with a *new* records blob but
  /// the *old* wrapped KGK, recoverable only by the old master password.
  pub fn save(&mut self) -> Result<()> {
    self.require_unlocked()?;
    if self.file.get_salt().len() != 32 {
      self.file.put_salt(&self.key_manager.outer_salt().to_vec())?;
    }
    self.store.save(&mut self.file, &mut self.key_manager)
  }

  /// Locks the vault, clearing the key hierarchy and in-memory records
  /// from this handle. The caller must `unlock` again before further use.
  pub fn reset(&mut self) {
    self.key_manager.reset();
    self.store = RecordStore::new();
    self.unlocked = false;
  }
}

fn now() -> NaiveDateTime {
  Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::path::PathBuf;

  fn temp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("vaultkeep-test-vault-{name}-{}.dat", std::process::id()));
    let _ = fs::remove_file(&p);
    p
  }

  #[test]
  fn unlock_on_missing_file_starts_empty_and_unlocked() {
    let path = temp_path("fresh");
    let mut vault = Vault::open(&path).unwrap();
    vault.unlock("hunter2").unwrap();
    assert!(vault.is_unlocked());
    assert!(vault.domains().unwrap().is_empty());
  }

  #[test]
  fn save_then_reopen_round_trips_and_reveals_same_password() {
    let path = temp_path("roundtrip");
    {
      let mut vault = Vault::open(&path).unwrap();
      vault.unlock("correct horse battery staple").unwrap();
      vault.get_or_create("example.com").unwrap();
      vault.save().unwrap();
    }

    let mut vault = Vault::open(&path).unwrap();
    vault.unlock("correct horse battery staple").unwrap();
    assert_eq!(vault.domains().unwrap(), vec!["example.com".to_string()]);
    let revealed_a = vault.reveal("example.com").unwrap();
    let revealed_b = vault.reveal("example.com").unwrap();
    assert_eq!(revealed_a, revealed_b);
    assert!(!revealed_a.is_empty());
  }

  #[test]
  fn wrong_password_on_existing_vault_is_an_error() {
    let path = temp_path("wrongpw");
    {
      let mut vault = Vault::open(&path).unwrap();
      vault.unlock("right-password").unwrap();
      vault.get_or_create("example.com").unwrap();
      vault.save().unwrap();
    }

    let mut vault = Vault::open(&path).unwrap();
    let result = vault.unlock("wrong-password");
    assert!(matches!(result, Err(VaultError::WrongMasterPassword)));
    assert!(!vault.is_unlocked());
  }

  #[test]
  fn operations_before_unlock_are_rejected() {
    let path = temp_path("locked");
    let vault = Vault::open(&path).unwrap();
    assert!(vault.domains().is_err());
  }

  #[test]
  fn fixed_password_is_revealed_verbatim() {
    let path = temp_path("fixed");
    let mut vault = Vault::open(&path).unwrap();
    vault.unlock("hunter2").unwrap();
    let record = vault.get_or_create("example.com").unwrap();
    record.fixed_password = Some("correct-horse-battery-staple".to_string());
    assert_eq!(vault.reveal("example.com").unwrap(), "correct-horse-battery-staple");
  }

  #[test]
  fn delete_removes_domain() {
    let path = temp_path("delete");
    let mut vault = Vault::open(&path).unwrap();
    vault.unlock("hunter2").unwrap();
    vault.get_or_create("example.com").unwrap();
    assert!(vault.delete("example.com").unwrap());
    assert!(vault.domains().unwrap().is_empty());
  }
}
