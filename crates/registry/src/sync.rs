//! Typisierter Client fuer das Registry-Layout
//!
//! `KeyRegistrySync` kapselt Pfade und JSON-Kodierung. Fehler der Registry
//! werden unveraendert weitergereicht, es gibt keine internen Wiederholungen.

use std::collections::BTreeMap;
use std::sync::Arc;

use chatvault_core::{GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{RegistryError, RegistryResult};
use crate::paths;
use crate::records::{GroupKeyRecord, MemberEntry, PublicKeyRecord};
use crate::registry::{KeyRegistry, Precondition, RegistryChange};

/// Typisierter Zugriff auf Gruppen-Datensaetze und oeffentliche Schluessel
#[derive(Clone)]
pub struct KeyRegistrySync {
    registry: Arc<dyn KeyRegistry>,
}

impl std::fmt::Debug for KeyRegistrySync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistrySync").finish_non_exhaustive()
    }
}

impl KeyRegistrySync {
    pub fn new(registry: Arc<dyn KeyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn KeyRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.registry.subscribe()
    }

    // -----------------------------------------------------------------------
    // Oeffentliche Schluessel
    // -----------------------------------------------------------------------

    pub async fn publish_public_key(&self, user_id: &UserId, public_key: &str) -> RegistryResult<()> {
        paths::validate_id(user_id.as_str())?;
        let record = PublicKeyRecord::new(public_key.to_string());
        self.registry
            .write(&paths::public_key(user_id), encode(&record)?)
            .await?;
        tracing::debug!(user_id = %user_id, "Oeffentlicher Schluessel veroeffentlicht");
        Ok(())
    }

    pub async fn fetch_public_key(&self, user_id: &UserId) -> RegistryResult<Option<PublicKeyRecord>> {
        paths::validate_id(user_id.as_str())?;
        self.read_typed(&paths::public_key(user_id)).await
    }

    // -----------------------------------------------------------------------
    // Gruppen-Datensaetze
    // -----------------------------------------------------------------------

    /// Legt den Datensatz an; schlaegt mit `Konflikt` fehl wenn er existiert
    pub async fn create_record(&self, group_id: &GroupId, record: &GroupKeyRecord) -> RegistryResult<()> {
        paths::validate_id(group_id.as_str())?;
        let metadata_pfad = paths::metadata(group_id);

        let mut updates = BTreeMap::new();
        updates.insert("metadata".to_string(), encode(&record.metadata)?);
        updates.insert("members".to_string(), encode(&record.members)?);

        self.registry
            .update(
                &paths::group_record(group_id),
                updates,
                Some(Precondition::absent(metadata_pfad)),
            )
            .await
    }

    pub async fn fetch_record(&self, group_id: &GroupId) -> RegistryResult<Option<GroupKeyRecord>> {
        paths::validate_id(group_id.as_str())?;
        self.read_typed(&paths::group_record(group_id)).await
    }

    pub async fn fetch_member_entry(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> RegistryResult<Option<MemberEntry>> {
        paths::validate_id(group_id.as_str())?;
        paths::validate_id(user_id.as_str())?;
        self.read_typed(&paths::member(group_id, user_id)).await
    }

    /// Wartet bis ein Eintrag fuer `user_id` existiert
    pub async fn wait_for_member_entry(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> RegistryResult<MemberEntry> {
        paths::validate_id(group_id.as_str())?;
        paths::validate_id(user_id.as_str())?;
        let pfad = paths::member(group_id, user_id);
        let value = self.registry.read_once(&pfad).await?;
        decode(&pfad, value)
    }

    pub async fn current_version(&self, group_id: &GroupId) -> RegistryResult<Option<u32>> {
        paths::validate_id(group_id.as_str())?;
        self.read_typed(&paths::metadata_version(group_id)).await
    }

    pub async fn list_members(&self, group_id: &GroupId) -> RegistryResult<Vec<UserId>> {
        paths::validate_id(group_id.as_str())?;
        let members: Option<BTreeMap<UserId, Value>> =
            self.read_typed(&paths::members(group_id)).await?;
        Ok(members.map(|m| m.into_keys().collect()).unwrap_or_default())
    }

    /// Fuegt ein Mitglied hinzu, sofern die Gruppe noch auf `entry.key_version` steht
    pub async fn add_member(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        entry: &MemberEntry,
    ) -> RegistryResult<()> {
        paths::validate_id(group_id.as_str())?;
        paths::validate_id(user_id.as_str())?;

        let mut updates = BTreeMap::new();
        updates.insert(format!("members/{user_id}"), encode(entry)?);
        updates.insert("metadata/lastUpdated".to_string(), encode(&entry.wrapped_at)?);

        self.registry
            .update(
                &paths::group_record(group_id),
                updates,
                Some(Precondition::equals(
                    paths::metadata_version(group_id),
                    entry.key_version,
                )),
            )
            .await
    }

    /// Ersetzt alle Mitgliedseintraege und erhoeht die Version in einem Schritt
    ///
    /// Nur erfolgreich, wenn die Gruppe noch auf `expected_version` steht.
    pub async fn rotate(
        &self,
        group_id: &GroupId,
        expected_version: u32,
        new_version: u32,
        members: &BTreeMap<UserId, MemberEntry>,
        rotated_at: DateTime<Utc>,
    ) -> RegistryResult<()> {
        paths::validate_id(group_id.as_str())?;
        for user_id in members.keys() {
            paths::validate_id(user_id.as_str())?;
        }

        let mut updates = BTreeMap::new();
        updates.insert("members".to_string(), encode(members)?);
        updates.insert("metadata/version".to_string(), Value::from(new_version));
        updates.insert("metadata/lastRotated".to_string(), encode(&rotated_at)?);
        updates.insert("metadata/lastUpdated".to_string(), encode(&rotated_at)?);

        self.registry
            .update(
                &paths::group_record(group_id),
                updates,
                Some(Precondition::equals(
                    paths::metadata_version(group_id),
                    expected_version,
                )),
            )
            .await
    }

    pub async fn delete_record(&self, group_id: &GroupId) -> RegistryResult<bool> {
        paths::validate_id(group_id.as_str())?;
        self.registry.delete(&paths::group_record(group_id)).await
    }

    async fn read_typed<T: DeserializeOwned>(&self, pfad: &str) -> RegistryResult<Option<T>> {
        match self.registry.read(pfad).await? {
            Some(value) => decode(pfad, value).map(Some),
            None => Ok(None),
        }
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> RegistryResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn decode<T: DeserializeOwned>(pfad: &str, value: Value) -> RegistryResult<T> {
    serde_json::from_value(value).map_err(|e| RegistryError::UngueltigeDaten {
        pfad: pfad.to_string(),
        grund: e.to_string(),
    })
}
