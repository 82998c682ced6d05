//! # chatvault-keystore
//!
//! Verschluesselter lokaler Schluesselspeicher.
//!
//! ## Module
//! - `store` - `SecureKeyStore` (AES-256-GCM pro Eintrag, Master-Secret in der Enclave)
//! - `keyring` - Versionierte Gruppenschluessel pro Gruppe
//! - `backend` - `KeyValueBackend`-Trait und `MemoryBackend`
//! - `sqlite` - `SqliteBackend` (sqlx, WAL)

pub mod backend;
pub mod error;
pub mod keyring;
pub mod sqlite;
pub mod store;

pub use backend::{KeyValueBackend, MemoryBackend};
pub use error::{KeystoreError, KeystoreResult};
pub use keyring::GroupKeyring;
pub use sqlite::SqliteBackend;
pub use store::SecureKeyStore;
