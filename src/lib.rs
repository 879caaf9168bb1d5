//! A local, file-backed password vault with deterministic per-domain
//! password derivation.
//!
//! - [`vault`] - top-level orchestrator: unlock, browse, edit, reveal, save
//! - [`key_manager`] - the master-password → KGK → data-key hierarchy
//! - [`vault_file`] - fixed-offset binary layout for the single on-disk file
//! - [`record`] - per-domain credential settings and their wire format
//! - [`record_store`] - in-memory record collection, merge-on-load, JSON blob
//! - [`password_deriver`] - deterministic password generation from the KGK
//! - [`codec`] - AES-256-CBC envelope and PBKDF2 key derivation
//! - [`compression`] - the zlib packer used on the records blob
//! - [`error`] - the crate's error type
//!
//! # Architecture
//!
//! ```text
//! caller (CLI, GUI, extension, ...)
//!     │
//!     ▼
//! vault.rs ──────── orchestration: unlock / get / put / delete / save / reveal
//!     │
//!     ├── key_manager.rs ── master password → KGK → data key
//!     ├── record_store.rs ─ in-memory records, merge-on-load, JSON blob
//!     │       └── password_deriver.rs ── per-domain password from the KGK
//!     └── vault_file.rs ─── fixed-offset binary layout on disk
//!             └── codec.rs ── AES-256-CBC + PBKDF2
//!                 └── compression.rs ── zlib packer
//! ```
//!
//! # Security model
//!
//! - Two-layer key hierarchy: master password unwraps a key generation key
//!   (KGK), which in turn derives the key that encrypts the records blob.
//! - AES-256-CBC is unauthenticated: a wrong master password is detected
//!   downstream, at DEFLATE decompression, not at the cipher layer.
//! - Per-domain passwords are derived deterministically from the KGK and
//!   never stored, only the parameters that reproduce them are.

pub mod codec;
pub mod compression;
pub mod error;
pub mod key_manager;
pub mod password_deriver;
pub mod record;
pub mod record_store;
pub mod vault;
pub mod vault_file;

pub use error::{Result, VaultError};
pub use record::Record;
pub use vault::Vault;
