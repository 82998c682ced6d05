//! # chatvault-crypto
//!
//! Kryptografische Primitiven fuer chatvault.
//!
//! ## Module
//! - `aead` - AES-256-GCM Versiegelung (`iv || ciphertext || tag`)
//! - `group` - Gruppenschluessel, Nachrichten-Umschlag, Ver-/Entschluesselung
//! - `hybrid` - RSA-OAEP + AES-GCM fuer explizite Empfaengerlisten
//! - `identity` - RSA-Identitaetsschluessel
//! - `enclave` - Secure-Enclave-Abstraktion
//! - `kdf` - HKDF-SHA256
//! - `types` - Gemeinsame Typen (SecretBytes, GroupKey)
//! - `error` - Fehlertypen

pub mod aead;
pub mod enclave;
pub mod error;
pub mod group;
pub mod hybrid;
pub mod identity;
pub mod kdf;
pub mod types;

// Bequeme Re-Exports
pub use enclave::{EnclaveKeyKind, SecureEnclave, SoftwareEnclave};
pub use error::{CryptoError, CryptoResult};
pub use hybrid::{HybridCipher, HybridEnvelope, HYBRID_ALGORITHM};
pub use identity::{parse_public_key, RsaIdentity, RSA_BITS};
pub use kdf::hkdf_derive;
pub use rsa::RsaPublicKey;
pub use types::{GroupKey, SecretBytes, KEY_LEN, NONCE_LEN, TAG_LEN};

pub use group::{
    create_group_key, decrypt_message, encrypt_message, next_version, rotate_group_key,
    unwrap_key_for_member, wrap_key_for_member, EnvelopeParse, GroupEnvelope, WrappedKeyInfo,
};
