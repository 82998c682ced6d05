//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use chatvault_core::{GroupId, UserId};
use chrono::{DateTime, Utc};

/// Schluessel-Laenge fuer AES-256 (Bytes)
pub const KEY_LEN: usize = 32;
/// IV-Laenge fuer AES-GCM (96 Bit)
pub const NONCE_LEN: usize = 12;
/// Laenge des GCM-Auth-Tags
pub const TAG_LEN: usize = 16;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Symmetrischer Gruppen-Schluessel (eine Version)
///
/// Die Version ist nur ein Ordnungsmerkmal und wird nicht kryptografisch
/// erzwungen; sie steht im Klartext im Nachrichten-Header und ist Teil der AAD.
#[derive(Debug, Clone)]
pub struct GroupKey {
    pub group_id: GroupId,
    /// Epoch-Nummer, beginnt bei 1 und steigt bei jeder Rotation
    pub version: u32,
    /// 32 Bytes AES-256-GCM
    pub key_bytes: SecretBytes,
    pub creator: UserId,
    pub created_at: DateTime<Utc>,
}
