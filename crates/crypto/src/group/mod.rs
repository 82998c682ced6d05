//! Gruppen-Verschluesselung
//!
//! ## Ablauf
//! 1. Jeder Benutzer hat eine `RsaIdentity` (privater Schluessel in der Enclave)
//! 2. Bei Gruppenerstellung: neuer AES-256-Schluessel (Version 1)
//! 3. Der Schluessel wird pro Mitglied mit RSA-OAEP eingewickelt
//! 4. Nachrichten werden mit dem Gruppen-Schluessel (AES-256-GCM) verschluesselt
//! 5. Beim Entfernen eines Mitglieds: Rotation (neue Version)

pub mod decrypt;
pub mod encrypt;
pub mod envelope;
pub mod group_key;

pub use decrypt::{decrypt_message, decrypt_message_str};
pub use encrypt::encrypt_message;
pub use envelope::{is_envelope, EnvelopeParse, GroupEnvelope, ENVELOPE_PREFIX};
pub use group_key::{
    create_group_key, next_version, rotate_group_key, unwrap_key_for_member, wrap_key_for_member,
    WrappedKeyInfo,
};
