//! In-memory collection of per-domain records: JSON (de)serialization,
//! merge-on-load by modification date, and the save path that drives a full
//! blob re-encryption (and KGK re-wrap) on every mutation.

use chrono::{NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::codec::Codec;
use crate::error::{Result, VaultError};
use crate::compression::Packer;
use crate::key_manager::KeyManager;
use crate::record::Record;
use crate::vault_file::VaultFile;

const DATA_KEY_ITERATIONS: u32 = 1024;
const MIN_BLOB_LEN: usize = 40;

/// Owns the ordered list of in-memory records. Order has no semantic
/// meaning; it is preserved only for serialization stability.
#[derive(Default)]
pub struct RecordStore {
  records: Vec<Record>,
}

impl RecordStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn data_codec(key_manager: &KeyManager) -> Result<Codec> {
    let key = Codec::derive_key(key_manager.kgk(), key_manager.inner_salt(), DATA_KEY_ITERATIONS);
    let mut iv = [0u8; 16];
    if key_manager.inner_iv().len() != 16 {
      return Err(VaultError::InvalidLength(format!(
        "inner IV must be 16 bytes, got {}",
        key_manager.inner_iv().len()
      )));
    }
    iv.copy_from_slice(key_manager.inner_iv());
    Ok(Codec::new(key, iv))
  }

  /// Loads and merges records from `vault_file`'s ciphertext blob.
  ///
  /// A blob shorter than 40 bytes is treated as an empty vault, not an
  /// error. Decryption failure always succeeds at the block-cipher level
  /// (CBC has no MAC); a wrong master password instead surfaces as a
  /// DEFLATE decompression failure or a record count that exceeds the
  /// number of keys actually parsed, both of which map to `WrongMasterPassword`.
  pub fn load(&mut self, vault_file: &VaultFile, key_manager: &KeyManager) -> Result<()> {
    let blob = vault_file.get_records_blob();
    if blob.len() < MIN_BLOB_LEN {
      return Ok(());
    }

    let codec = Self::data_codec(key_manager)?;
    let plaintext = codec.decrypt(&blob)?;
    if plaintext.len() < 4 {
      return Err(VaultError::WrongMasterPassword);
    }

    let record_count = u32::from_be_bytes(plaintext[0..4].try_into().unwrap()) as usize;
    let decompressed = Packer::decompress(&plaintext[4..])?;
    let json_str = String::from_utf8(decompressed)
      .map_err(|e| VaultError::InvalidFormat(format!("records JSON is not valid UTF-8: {e}")))?;
    let parsed: Value = serde_json::from_str(&json_str)
      .map_err(|e| VaultError::InvalidFormat(format!("records JSON parse error: {e}")))?;
    let object = parsed
      .as_object()
      .ok_or_else(|| VaultError::InvalidFormat("records JSON root is not an object".to_string()))?;

    if object.len() < record_count {
      return Err(VaultError::WrongMasterPassword);
    }

    let now = Utc::now().naive_utc();
    for (domain, data_set) in object {
      self.merge_one(domain, data_set, now)?;
    }
    Ok(())
  }

  fn merge_one(&mut self, domain: &str, data_set: &Value, now: NaiveDateTime) -> Result<()> {
    if let Some(position) = self.records.iter().position(|r| r.domain == domain) {
      let incoming_modification_date = incoming_modification_date(data_set)?;
      if incoming_modification_date > self.records[position].modification_date {
        let existing = self.records.remove(position);
        let merged = Record::from_wire(domain, data_set, Some(existing), now)?;
        self.records.insert(position, merged);
      }
    } else {
      let record = Record::from_wire(domain, data_set, None, now)?;
      self.records.push(record);
    }
    Ok(())
  }

  /// Serializes the current records, re-wraps the KGK with fresh inner
  /// salt/IV, re-derives the data key from those fresh parameters, and
  /// writes both the records blob and the wrapped KGK block back to disk.
  pub fn save(&self, vault_file: &mut VaultFile, key_manager: &mut KeyManager) -> Result<()> {
    let wrapped_kgk = key_manager.rewrap_with_new_inner()?;
    let codec = Self::data_codec(key_manager)?;

    let mut map = Map::new();
    for record in &self.records {
      map.insert(record.domain.clone(), record.to_wire());
    }
    let json_bytes = serde_json::to_vec(&Value::Object(map)).expect("records always serialize");

    let mut plaintext = Vec::with_capacity(4 + json_bytes.len());
    plaintext.extend_from_slice(&(self.records.len() as u32).to_be_bytes());
    plaintext.extend_from_slice(&Packer::compress(&json_bytes));

    let ciphertext = codec.encrypt(&plaintext);
    vault_file.put_records_blob(&ciphertext)?;
    vault_file.put_wrapped_kgk(&wrapped_kgk)?;
    Ok(())
  }

  /// Returns the record for `domain`, creating (and appending) a fresh one
  /// if none exists yet.
  pub fn get_or_create(&mut self, domain: &str, now: NaiveDateTime) -> &mut Record {
    if let Some(position) = self.records.iter().position(|r| r.domain == domain) {
      return &mut self.records[position];
    }
    self.records.push(Record::new(domain, now));
    self.records.last_mut().expect("just pushed")
  }

  pub fn get(&self, domain: &str) -> Option<&Record> {
    self.records.iter().find(|r| r.domain == domain)
  }

  /// Replaces any prior record with the same domain, then appends `record`.
  pub fn put(&mut self, record: Record) {
    self.records.retain(|r| r.domain != record.domain);
    self.records.push(record);
  }

  /// Removes any record with the given domain. Returns whether one was
  /// removed.
  pub fn delete(&mut self, domain: &str) -> bool {
    let before = self.records.len();
    self.records.retain(|r| r.domain != domain);
    before != self.records.len()
  }

  pub fn domains(&self) -> Vec<String> {
    self.records.iter().map(|r| r.domain.clone()).collect()
  }
}

fn incoming_modification_date(data_set: &Value) -> Result<NaiveDateTime> {
  let raw = data_set
    .get("modification_date")
    .and_then(Value::as_str)
    .ok_or_else(|| VaultError::InvalidFormat("record missing modification_date".to_string()))?;
  NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
    .map_err(|e| VaultError::InvalidFormat(format!("unparseable modification_date {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::key_manager::KeyManager;
  use crate::vault_file::VaultFile;
  use std::fs;
  use std::path::PathBuf;

  fn temp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("vaultkeep-test-recordstore-{name}-{}.dat", std::process::id()));
    let _ = fs::remove_file(&p);
    p
  }

  fn unlocked_key_manager(password: &[u8], outer_salt: &[u8]) -> KeyManager {
    let mut km = KeyManager::new();
    km.unwrap(password, outer_salt, &[]).unwrap();
    km
  }

  #[test]
  fn empty_blob_load_is_a_no_op() {
    let path = temp_path("empty");
    let vf = VaultFile::open(&path).unwrap();
    let km = unlocked_key_manager(b"hunter2", &[0u8; 32]);
    let mut store = RecordStore::new();
    store.load(&vf, &km).unwrap();
    assert!(store.domains().is_empty());
  }

  #[test]
  fn save_then_load_round_trips_records() {
    let path = temp_path("roundtrip");
    let mut vf = VaultFile::open(&path).unwrap();
    let mut km = unlocked_key_manager(b"hunter2", &[0u8; 32]);

    let now = Utc::now().naive_utc();
    let mut store = RecordStore::new();
    store.put(Record::new("a.example", now));
    store.put(Record::new("b.example", now));
    store.put(Record::new("c.example", now));
    store.save(&mut vf, &mut km).unwrap();

    let outer_salt = km.outer_salt().to_vec();
    let wrapped_kgk = vf.get_wrapped_kgk();

    let mut km2 = KeyManager::new();
    km2.unwrap(b"hunter2", &outer_salt, &wrapped_kgk).unwrap();
    let vf2 = VaultFile::open(&path).unwrap();
    let mut store2 = RecordStore::new();
    store2.load(&vf2, &km2).unwrap();

    let mut domains = store2.domains();
    domains.sort();
    assert_eq!(domains, vec!["a.example", "b.example", "c.example"]);
    fs::remove_file(&path).ok();
  }

  #[test]
  fn wrong_password_is_an_error() {
    let path = temp_path("wrongpw");
    let mut vf = VaultFile::open(&path).unwrap();
    let mut km = unlocked_key_manager(b"password-a", &[1u8; 32]);

    let now = Utc::now().naive_utc();
    let mut store = RecordStore::new();
    store.put(Record::new("example.com", now));
    store.save(&mut vf, &mut km).unwrap();

    let outer_salt = km.outer_salt().to_vec();
    let wrapped_kgk = vf.get_wrapped_kgk();
    let mut km2 = KeyManager::new();
    km2.unwrap(b"password-b", &outer_salt, &wrapped_kgk).unwrap();

    let vf2 = VaultFile::open(&path).unwrap();
    let mut store2 = RecordStore::new();
    let result = store2.load(&vf2, &km2);
    assert!(matches!(result, Err(VaultError::WrongMasterPassword)));
    fs::remove_file(&path).ok();
  }

  #[test]
  fn merge_keeps_newer_and_adds_new_domain() {
    let mut store = RecordStore::new();
    let old = NaiveDateTime::parse_from_str("2020-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
    let mut d1 = Record::new("d1", old);
    d1.set_modification_date(old);
    store.put(d1);

    let newer = NaiveDateTime::parse_from_str("2021-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
    let mut incoming_d1 = Record::new("d1", newer);
    incoming_d1.set_modification_date(newer);
    incoming_d1.username = Some("merged".to_string());
    let mut incoming_d2 = Record::new("d2", newer);
    incoming_d2.set_modification_date(newer);

    let mut object = Map::new();
    object.insert("d1".to_string(), incoming_d1.to_wire());
    object.insert("d2".to_string(), incoming_d2.to_wire());

    for (domain, data_set) in &object {
      store.merge_one(domain, data_set, newer).unwrap();
    }

    let d1 = store.get("d1").unwrap();
    assert_eq!(d1.modification_date, newer);
    assert_eq!(d1.username, Some("merged".to_string()));
    assert!(store.get("d2").is_some());
  }

  #[test]
  fn merge_ignores_older_incoming_record() {
    let mut store = RecordStore::new();
    let newer = NaiveDateTime::parse_from_str("2021-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
    let mut d1 = Record::new("d1", newer);
    d1.set_modification_date(newer);
    store.put(d1);

    let older = NaiveDateTime::parse_from_str("2000-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
    let mut incoming = Record::new("d1", older);
    incoming.set_modification_date(older);
    incoming.username = Some("should-not-apply".to_string());

    store.merge_one("d1", &incoming.to_wire(), older).unwrap();
    assert_eq!(store.get("d1").unwrap().username, None);
  }

  #[test]
  fn put_replaces_prior_record_with_same_domain() {
    let mut store = RecordStore::new();
    let now = Utc::now().naive_utc();
    let mut first = Record::new("example.com", now);
    first.username = Some("first".to_string());
    store.put(first);
    let mut second = Record::new("example.com", now);
    second.username = Some("second".to_string());
    store.put(second);
    assert_eq!(store.domains().len(), 1);
    assert_eq!(store.get("example.com").unwrap().username, Some("second".to_string()));
  }

  #[test]
  fn delete_removes_by_domain() {
    let mut store = RecordStore::new();
    let now = Utc::now().naive_utc();
    store.put(Record::new("example.com", now));
    assert!(store.delete("example.com"));
    assert!(!store.delete("example.com"));
    assert!(store.get("example.com").is_none());
  }
}
