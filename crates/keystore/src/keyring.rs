//! Gruppen-Keyring: alle lokal bekannten Schluesselversionen einer Gruppe
//!
//! Liegt als ein Eintrag `group_<groupId>` im Schluesselspeicher. Nach einer
//! Rotation bleiben alte Versionen erhalten, damit aeltere Nachrichten
//! lesbar bleiben, bis sie explizit entfernt werden.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chatvault_core::{GroupId, UserId};
use chatvault_crypto::{CryptoError, GroupKey, SecretBytes, KEY_LEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::KeystoreResult;
use crate::store::SecureKeyStore;

/// Eine gespeicherte Schluesselversion
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKey {
    version: u32,
    /// Base64 der 32 Schluesselbytes
    key: String,
    creator_id: UserId,
    created_at: DateTime<Utc>,
}

/// Alle lokal bekannten Versionen eines Gruppenschluessels
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKeyring {
    group_id: GroupId,
    current_version: u32,
    keys: Vec<StoredKey>,
}

impl std::fmt::Debug for GroupKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupKeyring")
            .field("group_id", &self.group_id)
            .field("current_version", &self.current_version)
            .field("versions", &self.versions())
            .finish()
    }
}

impl GroupKeyring {
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            current_version: 0,
            keys: Vec::new(),
        }
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    /// Fuegt eine Version ein (ersetzt dieselbe Version)
    ///
    /// Die aktuelle Version steigt nur; eine aeltere Version landet lediglich
    /// in der Historie.
    pub fn insert(&mut self, key: &GroupKey) {
        self.keys.retain(|k| k.version != key.version);
        self.keys.push(StoredKey {
            version: key.version,
            key: STANDARD.encode(key.key_bytes.as_bytes()),
            creator_id: key.creator.clone(),
            created_at: key.created_at,
        });
        self.keys.sort_by_key(|k| k.version);
        self.current_version = self.current_version.max(key.version);
    }

    /// Aufsteigend sortierte Versionen
    pub fn versions(&self) -> Vec<u32> {
        self.keys.iter().map(|k| k.version).collect()
    }

    pub fn get(&self, version: u32) -> Result<Option<GroupKey>, CryptoError> {
        self.keys
            .iter()
            .find(|k| k.version == version)
            .map(|k| self.decode(k))
            .transpose()
    }

    pub fn current(&self) -> Result<Option<GroupKey>, CryptoError> {
        self.get(self.current_version)
    }

    /// Alle Versionen als Schluessel, aufsteigend
    pub fn all_keys(&self) -> Result<Vec<GroupKey>, CryptoError> {
        self.keys.iter().map(|k| self.decode(k)).collect()
    }

    /// Entfernt alle Versionen kleiner `version`; die aktuelle bleibt immer
    pub fn prune_before(&mut self, version: u32) -> usize {
        let current = self.current_version;
        let before = self.keys.len();
        self.keys
            .retain(|k| k.version >= version || k.version == current);
        before - self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn decode(&self, stored: &StoredKey) -> Result<GroupKey, CryptoError> {
        let bytes = STANDARD.decode(&stored.key)?;
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: KEY_LEN,
                erhalten: bytes.len(),
            });
        }
        Ok(GroupKey {
            group_id: self.group_id.clone(),
            version: stored.version,
            key_bytes: SecretBytes::new(bytes),
            creator: stored.creator_id.clone(),
            created_at: stored.created_at,
        })
    }
}

impl SecureKeyStore {
    /// Laedt den Keyring einer Gruppe; unlesbare Keyrings gelten als fehlend
    pub async fn load_keyring(&self, group_id: &GroupId) -> KeystoreResult<Option<GroupKeyring>> {
        let Some(raw) = self.get(&group_id.storage_key()).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<GroupKeyring>(raw.as_bytes()) {
            Ok(keyring) if keyring.group_id == *group_id => Ok(Some(keyring)),
            Ok(keyring) => {
                warn!(
                    group_id = %group_id,
                    gespeichert = %keyring.group_id,
                    "Keyring gehoert zu anderer Gruppe, wird ignoriert"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(group_id = %group_id, fehler = %e, "Keyring nicht lesbar, wird ignoriert");
                Ok(None)
            }
        }
    }

    /// Speichert eine Schluesselversion; neuere Versionen werden aktuell
    pub async fn store_group_key(&self, key: &GroupKey) -> KeystoreResult<GroupKeyring> {
        let _guard = self.keyring_lock.lock().await;

        let mut keyring = self
            .load_keyring(&key.group_id)
            .await?
            .unwrap_or_else(|| GroupKeyring::new(key.group_id.clone()));
        keyring.insert(key);
        self.write_keyring(&keyring).await?;

        debug!(
            group_id = %key.group_id,
            version = key.version,
            aktuell = keyring.current_version,
            versionen = keyring.keys.len(),
            "Gruppenschluessel lokal gespeichert"
        );
        Ok(keyring)
    }

    /// Entfernt Versionen kleiner `version`; Anzahl entfernter Versionen
    pub async fn prune_versions_before(
        &self,
        group_id: &GroupId,
        version: u32,
    ) -> KeystoreResult<usize> {
        let _guard = self.keyring_lock.lock().await;

        let Some(mut keyring) = self.load_keyring(group_id).await? else {
            return Ok(0);
        };
        let entfernt = keyring.prune_before(version);
        if entfernt > 0 {
            self.write_keyring(&keyring).await?;
            info!(group_id = %group_id, version, entfernt, "Alte Schluesselversionen entfernt");
        }
        Ok(entfernt)
    }

    pub async fn remove_keyring(&self, group_id: &GroupId) -> KeystoreResult<bool> {
        let _guard = self.keyring_lock.lock().await;
        self.remove(&group_id.storage_key()).await
    }

    async fn write_keyring(&self, keyring: &GroupKeyring) -> KeystoreResult<()> {
        let json = SecretBytes::new(serde_json::to_vec(keyring)?);
        self.put(&keyring.group_id.storage_key(), json.as_bytes()).await
    }
}
