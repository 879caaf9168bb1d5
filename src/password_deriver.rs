//! Deterministic per-domain password derivation: given a domain, the KGK, a
//! per-domain salt and iteration count, and a character-class template,
//! reproduces the same password every time.

use num_bigint::BigUint;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;

use crate::record::DEFAULT_ITERATIONS;

const DIGEST_LEN: usize = 64;

/// Generates the password for a single domain.
///
/// Builds the PBKDF2 seed as `domain_utf8 || kgk`, derives a 64-byte
/// PBKDF2-HMAC-SHA512 digest, and walks `template` character by character,
/// treating the digest as one large big-endian unsigned integer and
/// peeling off `N % |active_set|` at each step. Stops early (output shorter
/// than `template`) once the integer reaches zero or the active set for a
/// position is empty, both possible only for vanishingly unlikely
/// digests/templates, and implemented exactly for reproducibility.
pub fn generate(
  domain: &str,
  kgk: &[u8],
  salt: &[u8],
  iterations: u32,
  template: &str,
  extra_characters: &str,
) -> String {
  let iterations = if iterations < 1 { DEFAULT_ITERATIONS } else { iterations };

  let mut seed = Vec::with_capacity(domain.len() + kgk.len());
  seed.extend_from_slice(domain.as_bytes());
  seed.extend_from_slice(kgk);

  let mut digest = [0u8; DIGEST_LEN];
  pbkdf2_hmac::<Sha512>(&seed, salt, iterations, &mut digest);

  let mut number = BigUint::from_bytes_be(&digest);
  let zero = BigUint::from(0u32);

  let any_of_enabled = any_of_enabled_set(template, extra_characters);

  let mut password = String::new();
  for marker in template.chars() {
    if number == zero {
      break;
    }
    let active_set: Vec<char> = match marker {
      'a' => LOWER.chars().collect(),
      'A' => UPPER.chars().collect(),
      'n' => DIGITS.chars().collect(),
      'o' => extra_characters.chars().collect(),
      _ => any_of_enabled.clone(),
    };
    if active_set.is_empty() {
      continue;
    }
    let set_len = BigUint::from(active_set.len());
    let index = &number % &set_len;
    let index: usize = index.to_string().parse().expect("mod of usize-sized divisor fits usize");
    password.push(active_set[index]);
    number /= &set_len;
  }
  password
}

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";

fn any_of_enabled_set(template: &str, extra_characters: &str) -> Vec<char> {
  let mut set = String::new();
  if template.contains('n') {
    set.push_str(DIGITS);
  }
  if template.contains('a') {
    set.push_str(LOWER);
  }
  if template.contains('A') {
    set.push_str(UPPER);
  }
  if template.contains('o') {
    set.push_str(extra_characters);
  }
  set.chars().collect()
}
