//! Datensaetze in der Registry

use std::collections::BTreeMap;

use chatvault_core::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Algorithmus-Kennung fuer veroeffentlichte Schluessel
pub const PUBLIC_KEY_ALGORITHM: &str = "RSA-OAEP-SHA256";

/// Eingewickelter Gruppenschluessel fuer ein Mitglied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEntry {
    /// Base64(RSA-OAEP(Gruppenschluessel)) mit dem oeffentlichen Schluessel des Mitglieds
    pub wrapped_key: String,
    pub key_version: u32,
    pub wrapped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub created_at: DateTime<Utc>,
    /// Aktuelle Schluesselversion der Gruppe
    pub version: u32,
    pub creator_id: UserId,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotated: Option<DateTime<Utc>>,
}

/// Schluessel-Datensatz einer Gruppe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKeyRecord {
    #[serde(default)]
    pub members: BTreeMap<UserId, MemberEntry>,
    pub metadata: RecordMetadata,
}

impl GroupKeyRecord {
    /// Neuer Datensatz mit dem Ersteller als einzigem Mitglied
    pub fn new(creator: UserId, creator_entry: MemberEntry) -> Self {
        let now = creator_entry.wrapped_at;
        let version = creator_entry.key_version;
        let mut members = BTreeMap::new();
        members.insert(creator.clone(), creator_entry);
        Self {
            members,
            metadata: RecordMetadata {
                created_at: now,
                version,
                creator_id: creator,
                last_updated: now,
                last_rotated: None,
            },
        }
    }

    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.members.contains_key(user_id)
    }
}

/// Veroeffentlichter oeffentlicher Schluessel eines Benutzers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRecord {
    /// Base64(SPKI-DER)
    pub public_key: String,
    pub algorithm: String,
    pub published_at: DateTime<Utc>,
}

impl PublicKeyRecord {
    pub fn new(public_key: String) -> Self {
        Self {
            public_key,
            algorithm: PUBLIC_KEY_ALGORITHM.to_string(),
            published_at: Utc::now(),
        }
    }
}
