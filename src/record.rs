//! `Record`: the per-domain credential entry, its complexity/template
//! encoding, and the wire format used inside the records JSON blob.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::NaiveDateTime;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

pub const DEFAULT_EXTRA_CHARACTERS: &str = "#!\"§$%&/()[]{}=-_+*<>;:.";
pub const DEFAULT_LENGTH: usize = 16;
pub const DEFAULT_ITERATIONS: u32 = 4096;
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";

/// Complexity derived from which markers occur in a record's template.
/// `-1` means the template's marker set doesn't match any of the eight
/// canonical combinations.
pub type Complexity = i32;

/// A single domain's stored credential settings.
#[derive(Clone, Debug)]
pub struct Record {
  pub domain: String,
  pub username: Option<String>,
  pub fixed_password: Option<String>,
  pub length: usize,
  pub iterations: u32,
  pub salt: Vec<u8>,
  pub template: String,
  pub extra_characters: String,
  pub url: Option<String>,
  pub notes: Option<String>,
  pub creation_date: NaiveDateTime,
  pub modification_date: NaiveDateTime,
}

impl Record {
  /// Creates a new record for `domain` with the defaults from the original
  /// system: length 16, iterations 4096, a fresh 32-byte salt, the default
  /// extra-character set, and a template at complexity 7 (all four classes
  /// enabled).
  pub fn new(domain: impl Into<String>, now: NaiveDateTime) -> Self {
    let mut record = Self {
      domain: domain.into(),
      username: None,
      fixed_password: None,
      length: DEFAULT_LENGTH,
      iterations: DEFAULT_ITERATIONS,
      salt: fresh_salt(),
      template: "x".repeat(DEFAULT_LENGTH),
      extra_characters: DEFAULT_EXTRA_CHARACTERS.to_string(),
      url: None,
      notes: None,
      creation_date: now,
      modification_date: now,
    };
    record.calculate_template(Some(true), Some(true), Some(true), Some(true));
    record
  }

  pub fn has_fixed_password(&self) -> bool {
    self.fixed_password.as_deref().is_some_and(|p| !p.is_empty())
  }

  pub fn new_salt(&mut self) {
    self.salt = fresh_salt();
  }

  /// Sets the extra-character set, falling back to the default if empty.
  pub fn set_extra_character_set(&mut self, extra: Option<String>) {
    match extra {
      Some(s) if !s.is_empty() => self.extra_characters = s,
      _ => self.extra_characters = DEFAULT_EXTRA_CHARACTERS.to_string(),
    }
  }

  /// Sets the password length and recomputes the template at the record's
  /// current complexity (a no-op on the template's content when the current
  /// complexity is `-1`, matching the original's
  /// `set_length` → `set_complexity(get_complexity())`).
  pub fn set_length(&mut self, length: usize) {
    self.length = length;
    let complexity = self.complexity();
    if complexity != -1 {
      self.set_complexity(complexity);
    }
  }

  /// Sets the iteration count. Values below 1 are not rejected here (the
  /// deriver is the authoritative validator at generation time, see
  /// design notes on the iterations-policy open question), but loading a
  /// record from disk normalizes `< 1` to the default immediately.
  pub fn set_iterations(&mut self, iterations: u32) {
    self.iterations = iterations;
  }

  /// Returns the full character set implied by the template's markers: the
  /// "any-of-enabled" set used for any character other than `a`/`A`/`n`/`o`.
  pub fn character_set(&self) -> String {
    let mut set = String::new();
    if self.template.contains('n') {
      set.push_str(DIGITS);
    }
    if self.template.contains('a') {
      set.push_str(LOWER);
    }
    if self.template.contains('A') {
      set.push_str(UPPER);
    }
    if self.template.contains('o') {
      set.push_str(&self.extra_characters);
    }
    set
  }

  /// Computes the template's complexity: 1..8 for the eight canonical
  /// marker combinations, -1 for anything else.
  pub fn complexity(&self) -> Complexity {
    let n = self.template.contains('n');
    let a = self.template.contains('a');
    let upper = self.template.contains('A');
    let o = self.template.contains('o');
    match (n, a, upper, o) {
      (true, false, false, false) => 1,
      (false, true, false, false) => 2,
      (false, false, true, false) => 3,
      (true, true, false, false) => 4,
      (false, true, true, false) => 5,
      (true, true, true, false) => 6,
      (true, true, true, true) => 7,
      (false, false, false, true) => 8,
      _ => -1,
    }
  }

  /// Sets the complexity (1..8), regenerating the template from the current
  /// length. Out-of-range values are left as a no-op on the template,
  /// matching the original's "ValueError is constructed but never raised".
  pub fn set_complexity(&mut self, complexity: Complexity) {
    let (lower, upper, digits, extra) = match complexity {
      1 => (false, false, true, false),
      2 => (true, false, false, false),
      3 => (false, true, false, false),
      4 => (true, false, true, false),
      5 => (false, true, true, false),
      6 => (true, true, true, false),
      7 => (true, true, true, true),
      8 => (false, false, false, true),
      _ => return,
    };
    self.calculate_template(Some(lower), Some(upper), Some(digits), Some(extra));
  }

  /// Recalculates the template for the current `length`: places one marker
  /// of each enabled class at the front, fills the remainder with `x`, then
  /// shuffles the whole sequence with a cryptographically seeded RNG. Any
  /// `None` flag is read from whether that marker currently appears in the
  /// template.
  pub fn calculate_template(
    &mut self,
    use_lower: Option<bool>,
    use_upper: Option<bool>,
    use_digits: Option<bool>,
    use_extra: Option<bool>,
  ) {
    let use_lower = use_lower.unwrap_or_else(|| self.template.contains('a'));
    let use_upper = use_upper.unwrap_or_else(|| self.template.contains('A'));
    let use_digits = use_digits.unwrap_or_else(|| self.template.contains('n'));
    let use_extra = use_extra.unwrap_or_else(|| self.template.contains('o'));

    let (mut inserted_lower, mut inserted_upper, mut inserted_digit, mut inserted_extra) =
      (false, false, false, false);
    let mut markers: Vec<char> = Vec::with_capacity(self.length);
    for _ in 0..self.length {
      if use_lower && !inserted_lower {
        markers.push('a');
        inserted_lower = true;
      } else if use_upper && !inserted_upper {
        markers.push('A');
        inserted_upper = true;
      } else if use_digits && !inserted_digit {
        markers.push('n');
        inserted_digit = true;
      } else if use_extra && !inserted_extra {
        markers.push('o');
        inserted_extra = true;
      } else {
        markers.push('x');
      }
    }
    markers.shuffle(&mut OsRng);
    self.template = markers.into_iter().collect();
  }

  /// Sets the creation date, promoting the modification date up to it if
  /// the modification date would otherwise precede it.
  pub fn set_creation_date(&mut self, creation_date: NaiveDateTime) {
    self.creation_date = creation_date;
    if self.modification_date < self.creation_date {
      self.modification_date = self.creation_date;
    }
  }

  /// Sets the modification date, promoting the creation date down to it if
  /// the creation date would otherwise follow it.
  pub fn set_modification_date(&mut self, modification_date: NaiveDateTime) {
    self.modification_date = modification_date;
    if self.modification_date < self.creation_date {
      self.creation_date = self.modification_date;
    }
  }

  /// Marks the record as modified now, applying the same date invariant.
  pub fn touch(&mut self, now: NaiveDateTime) {
    self.set_modification_date(now);
  }
}

fn fresh_salt() -> Vec<u8> {
  crate::codec::Codec::create_salt().to_vec()
}

/// Wire-format representation of a `Record`, matching the original system's
/// JSON keys and optional-field omission exactly.
#[derive(Serialize, Deserialize)]
struct RecordWire {
  #[serde(rename = "domain name")]
  domain: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  username: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  fixed_password: Option<String>,
  length: usize,
  extra_character_set: String,
  iterations: u32,
  salt: String,
  template: String,
  #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
  url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  notes: Option<String>,
  creation_date: String,
  modification_date: String,
}

impl Record {
  /// Serializes to the wire `serde_json::Value` used inside the records
  /// blob (keyed by domain at the `RecordStore` level).
  pub fn to_wire(&self) -> serde_json::Value {
    let wire = RecordWire {
      domain: self.domain.clone(),
      username: non_empty(&self.username),
      fixed_password: non_empty(&self.fixed_password),
      length: self.length,
      extra_character_set: self.extra_characters.clone(),
      iterations: self.iterations,
      salt: BASE64.encode(&self.salt),
      template: self.template.clone(),
      url: non_empty(&self.url),
      notes: non_empty(&self.notes),
      creation_date: self.creation_date.format(DATE_FORMAT).to_string(),
      modification_date: self.modification_date.format(DATE_FORMAT).to_string(),
    };
    serde_json::to_value(wire).expect("RecordWire always serializes")
  }

  /// Builds (or updates) a record from its wire representation. When
  /// `existing` is `Some`, fields present in the wire value overwrite the
  /// existing record in place (matching `Setting.load_from_dict`, which
  /// only touches keys that are present); otherwise a new record is built
  /// from `domain` with load-time defaults for anything missing.
  pub fn from_wire(domain: &str, value: &serde_json::Value, existing: Option<Record>, now: NaiveDateTime) -> Result<Record> {
    let wire: RecordWireLoose = serde_json::from_value(value.clone())
      .map_err(|e| VaultError::InvalidFormat(format!("malformed record for {domain}: {e}")))?;

    let mut record = existing.unwrap_or_else(|| Record::new(domain, now));
    record.domain = domain.to_string();

    if let Some(username) = wire.username {
      record.username = Some(username);
    }
    if let Some(fixed_password) = wire.fixed_password {
      record.fixed_password = Some(fixed_password);
    }
    if let Some(length) = wire.length {
      record.length = length;
    }
    if let Some(extra) = wire.extra_character_set {
      record.set_extra_character_set(Some(extra));
    }
    if let Some(iterations) = wire.iterations {
      record.iterations = if iterations < 1 { DEFAULT_ITERATIONS } else { iterations };
    }
    if let Some(salt_b64) = wire.salt {
      let decoded = BASE64
        .decode(salt_b64)
        .map_err(|e| VaultError::InvalidFormat(format!("bad salt base64 for {domain}: {e}")))?;
      record.salt = decoded;
    }
    if let Some(template) = wire.template {
      record.template = template;
    }
    if let Some(url) = wire.url {
      record.url = Some(url);
    }
    if let Some(notes) = wire.notes {
      record.notes = Some(notes);
    }
    if let Some(creation_date) = wire.creation_date {
      record.set_creation_date(parse_date(&creation_date)?);
    }
    if let Some(modification_date) = wire.modification_date {
      record.set_modification_date(parse_date(&modification_date)?);
    }
    if record.salt.len() != 32 {
      record.salt = fresh_salt();
    }
    Ok(record)
  }
}

/// Like `RecordWire` but every field is optional, for partial
/// `load_from_dict`-style merges from untrusted/older JSON.
#[derive(Deserialize, Default)]
struct RecordWireLoose {
  username: Option<String>,
  fixed_password: Option<String>,
  length: Option<usize>,
  extra_character_set: Option<String>,
  iterations: Option<u32>,
  salt: Option<String>,
  template: Option<String>,
  #[serde(rename = "URL")]
  url: Option<String>,
  notes: Option<String>,
  creation_date: Option<String>,
  modification_date: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
  value.clone().filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| VaultError::InvalidFormat(format!("unparseable timestamp {s:?}: {e}")))
}
