//! Verwaltung der Gruppenschluessel eines Benutzers
//!
//! Verbindet Registry (eingewickelte Schluessel aller Mitglieder), lokalen
//! Schluesselspeicher (eigene Schluessel im Klartext, verschluesselt at rest)
//! und Cache.
//!
//! ## Ablauf
//! - Anlegen: Version 1 erzeugen, fuer den Ersteller einwickeln, Datensatz anlegen
//! - Hinzufuegen: aktuellen Schluessel fuer das neue Mitglied einwickeln
//! - Entfernen: neue Version fuer alle verbleibenden Mitglieder, ein Schreibvorgang
//!   mit Precondition auf `metadata/version`
//! - Laden: eigenen Eintrag auswickeln und lokal ablegen
//!
//! Registry-Fehler werden nicht intern wiederholt.

use std::collections::BTreeMap;
use std::sync::Arc;

use chatvault_core::{GroupId, KeyEvent, UserId};
use chatvault_crypto::group::{
    create_group_key, next_version, unwrap_key_for_member, wrap_key_for_member,
};
use chatvault_crypto::{parse_public_key, GroupKey, RsaIdentity, RsaPublicKey, WrappedKeyInfo};
use chatvault_keystore::SecureKeyStore;
use chatvault_observability::CryptoMetrics;
use chatvault_registry::{GroupKeyRecord, KeyRegistrySync, MemberEntry, RegistryError};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::KeyCache;
use crate::error::{E2eError, E2eResult};

/// Groesse des Ereignis-Kanals
const EVENT_KANAL_GROESSE: usize = 64;

/// Gruppenschluessel-Verwaltung eines lokalen Benutzers
#[derive(Clone)]
pub struct GroupKeyManager {
    identity: Arc<RsaIdentity>,
    store: Arc<SecureKeyStore>,
    registry: KeyRegistrySync,
    cache: Arc<KeyCache>,
    metrics: CryptoMetrics,
    event_tx: broadcast::Sender<KeyEvent>,
}

impl std::fmt::Debug for GroupKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupKeyManager")
            .field("user_id", self.user_id())
            .finish_non_exhaustive()
    }
}

impl GroupKeyManager {
    pub fn new(
        identity: Arc<RsaIdentity>,
        store: Arc<SecureKeyStore>,
        registry: KeyRegistrySync,
        cache: Arc<KeyCache>,
        metrics: CryptoMetrics,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            identity,
            store,
            registry,
            cache,
            metrics,
            event_tx,
        }
    }

    pub fn user_id(&self) -> &UserId {
        self.identity.user_id()
    }

    pub fn identity(&self) -> &Arc<RsaIdentity> {
        &self.identity
    }

    /// Abonniert Schluessel-Ereignisse
    pub fn subscribe(&self) -> broadcast::Receiver<KeyEvent> {
        self.event_tx.subscribe()
    }

    /// Veroeffentlicht den eigenen oeffentlichen Schluessel, falls noetig
    pub async fn ensure_identity(&self) -> E2eResult<()> {
        let public_key = self.identity.public_key_base64()?;
        let veroeffentlicht = self.registry.fetch_public_key(self.user_id()).await?;

        if veroeffentlicht.is_some_and(|record| record.public_key == public_key) {
            debug!(user_id = %self.user_id(), "Oeffentlicher Schluessel bereits veroeffentlicht");
            return Ok(());
        }

        self.registry
            .publish_public_key(self.user_id(), &public_key)
            .await?;
        info!(user_id = %self.user_id(), "Oeffentlicher Schluessel veroeffentlicht");
        Ok(())
    }

    /// Legt die Verschluesselung einer neuen Gruppe an (Version 1)
    pub async fn create_group_with_encryption(&self, group_id: &GroupId) -> E2eResult<u32> {
        let key = create_group_key(group_id, 1, self.user_id());
        let entry = self.entry_for(&key, self.identity.public_key())?;
        let record = GroupKeyRecord::new(self.user_id().clone(), entry);

        self.registry.create_record(group_id, &record).await?;
        // Reste einer frueheren Gruppe gleicher ID gehoeren nicht zum neuen Keyring
        self.store.remove_keyring(group_id).await?;
        self.lokal_speichern(&key).await?;

        info!(group_id = %group_id, user_id = %self.user_id(), version = 1, "Gruppe verschluesselt angelegt");
        self.melden(KeyEvent::GroupCreated {
            group_id: group_id.clone(),
            creator: self.user_id().clone(),
        });
        Ok(key.version)
    }

    /// Gibt `new_user` den aktuellen Gruppenschluessel, ohne Rotation
    pub async fn add_user_to_group_encryption(
        &self,
        group_id: &GroupId,
        new_user: &UserId,
    ) -> E2eResult<u32> {
        let record = self.record_als_mitglied(group_id).await?;
        let key = self.key_for_version(group_id, &record).await?;

        let public_key = self.public_key_of(new_user).await?;
        let entry = self.entry_for(&key, &public_key)?;
        self.registry.add_member(group_id, new_user, &entry).await?;

        info!(
            group_id = %group_id,
            user_id = %new_user,
            version = key.version,
            "Mitglied zur Gruppenverschluesselung hinzugefuegt"
        );
        self.melden(KeyEvent::MemberAdded {
            group_id: group_id.clone(),
            user_id: new_user.clone(),
            version: key.version,
        });
        Ok(key.version)
    }

    /// Entfernt `removed` und rotiert den Schluessel fuer alle anderen
    ///
    /// Schlaegt mit `RegistryError::Konflikt` fehl, wenn parallel eine andere
    /// Rotation stattgefunden hat; dann ist nichts geschrieben.
    pub async fn remove_user_and_rotate_key(
        &self,
        group_id: &GroupId,
        removed: &UserId,
    ) -> E2eResult<u32> {
        let record = self.record_als_mitglied(group_id).await?;
        if !record.is_member(removed) {
            return Err(E2eError::KeinMitglied {
                group_id: group_id.to_string(),
                user_id: removed.to_string(),
            });
        }

        let alte_version = record.metadata.version;
        let key = create_group_key(group_id, next_version(alte_version)?, self.user_id());

        let mut entries = BTreeMap::new();
        for member in record.members.keys().filter(|m| *m != removed) {
            let entry = if member == self.user_id() {
                self.entry_for(&key, self.identity.public_key())?
            } else {
                self.entry_for(&key, &self.public_key_of(member).await?)?
            };
            entries.insert(member.clone(), entry);
        }

        self.registry
            .rotate(group_id, alte_version, key.version, &entries, key.created_at)
            .await
            .inspect_err(|e| {
                if matches!(e, RegistryError::Konflikt { .. }) {
                    warn!(group_id = %group_id, version = alte_version, "Rotation verloren, Gruppe wurde parallel geaendert");
                }
            })?;

        if removed == self.user_id() {
            self.store.remove_keyring(group_id).await?;
            self.cache.invalidate(group_id);
        } else {
            self.lokal_speichern(&key).await?;
        }

        self.metrics.key_rotations_total.inc();
        info!(
            group_id = %group_id,
            user_id = %removed,
            version = key.version,
            mitglieder = entries.len(),
            "Mitglied entfernt, Schluessel rotiert"
        );
        self.melden(KeyEvent::KeyRotated {
            group_id: group_id.clone(),
            removed: removed.clone(),
            version: key.version,
        });
        Ok(key.version)
    }

    /// Laedt den eigenen Eintrag aus der Registry in den lokalen Speicher
    ///
    /// Liefert die danach aktuelle lokale Version. Ein Eintrag, der waehrend
    /// des Ladens von einer Rotation ueberholt wurde, landet nur in der
    /// Historie.
    pub async fn load_group_key(&self, group_id: &GroupId) -> E2eResult<u32> {
        let record = self
            .registry
            .fetch_record(group_id)
            .await?
            .ok_or_else(|| self.kein_schluessel(group_id))?;
        let key = self.unwrap_own_entry(group_id, &record)?;
        let aktuell = self.lokal_speichern(&key).await?;

        if aktuell > key.version {
            debug!(
                group_id = %group_id,
                geladen = key.version,
                aktuell,
                "Geladener Eintrag bereits ueberholt"
            );
        } else {
            debug!(group_id = %group_id, user_id = %self.user_id(), version = key.version, "Gruppenschluessel geladen");
        }
        self.melden(KeyEvent::KeyLoaded {
            group_id: group_id.clone(),
            version: key.version,
        });
        Ok(aktuell)
    }

    /// Wartet bis der eigene Eintrag existiert und laedt ihn dann
    pub async fn await_group_key(&self, group_id: &GroupId) -> E2eResult<u32> {
        self.registry
            .wait_for_member_entry(group_id, self.user_id())
            .await?;
        self.load_group_key(group_id).await
    }

    /// Verwirft den Cache und laedt den eigenen Eintrag neu
    pub async fn refresh_group_key(&self, group_id: &GroupId) -> E2eResult<u32> {
        self.cache.invalidate(group_id);
        self.load_group_key(group_id).await
    }

    pub async fn is_group_member(&self, group_id: &GroupId) -> E2eResult<bool> {
        Ok(self
            .registry
            .fetch_member_entry(group_id, self.user_id())
            .await?
            .is_some())
    }

    /// Aktuelle Version laut Registry
    pub async fn current_version(&self, group_id: &GroupId) -> E2eResult<Option<u32>> {
        Ok(self.registry.current_version(group_id).await?)
    }

    /// Aktuelle Version im lokalen Speicher
    pub async fn local_version(&self, group_id: &GroupId) -> E2eResult<Option<u32>> {
        Ok(self
            .store
            .load_keyring(group_id)
            .await?
            .map(|keyring| keyring.current_version()))
    }

    /// Entfernt Schluesselversionen kleiner `version`; so verschluesselte
    /// Nachrichten sind danach dauerhaft nicht mehr lesbar
    pub async fn prune_versions_before(&self, group_id: &GroupId, version: u32) -> E2eResult<usize> {
        let entfernt = self.store.prune_versions_before(group_id, version).await?;
        self.cache.invalidate(group_id);
        Ok(entfernt)
    }

    /// Entfernt Registry-Datensatz und lokalen Keyring der Gruppe
    pub async fn delete_group_encryption(&self, group_id: &GroupId) -> E2eResult<()> {
        if let Some(record) = self.registry.fetch_record(group_id).await? {
            if !record.is_member(self.user_id()) {
                return Err(self.kein_mitglied(group_id));
            }
            self.registry.delete_record(group_id).await?;
        }
        self.store.remove_keyring(group_id).await?;
        self.cache.invalidate(group_id);

        info!(group_id = %group_id, user_id = %self.user_id(), "Gruppenverschluesselung entfernt");
        self.melden(KeyEvent::GroupDeleted {
            group_id: group_id.clone(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    async fn record_als_mitglied(&self, group_id: &GroupId) -> E2eResult<GroupKeyRecord> {
        let record = self
            .registry
            .fetch_record(group_id)
            .await?
            .ok_or_else(|| E2eError::GruppeNichtGefunden(group_id.to_string()))?;
        if !record.is_member(self.user_id()) {
            return Err(self.kein_mitglied(group_id));
        }
        Ok(record)
    }

    /// Schluessel der aktuellen Registry-Version: lokal, sonst eigener Eintrag
    async fn key_for_version(&self, group_id: &GroupId, record: &GroupKeyRecord) -> E2eResult<GroupKey> {
        let version = record.metadata.version;
        if let Some(keys) = self.cache.get_or_load(group_id, &self.store).await? {
            if let Some(key) = keys.get(version) {
                return Ok(key.clone());
            }
        }

        let key = self.unwrap_own_entry(group_id, record)?;
        if key.version != version {
            return Err(self.kein_schluessel(group_id));
        }
        self.lokal_speichern(&key).await?;
        Ok(key)
    }

    fn unwrap_own_entry(&self, group_id: &GroupId, record: &GroupKeyRecord) -> E2eResult<GroupKey> {
        let entry = record
            .members
            .get(self.user_id())
            .ok_or_else(|| self.kein_schluessel(group_id))?;
        let created_at = record
            .metadata
            .last_rotated
            .unwrap_or(record.metadata.created_at);

        Ok(unwrap_key_for_member(
            &self.identity,
            &entry.wrapped_key,
            WrappedKeyInfo {
                group_id,
                version: entry.key_version,
                creator: &record.metadata.creator_id,
                created_at,
            },
        )?)
    }

    async fn public_key_of(&self, user_id: &UserId) -> E2eResult<RsaPublicKey> {
        let record = self
            .registry
            .fetch_public_key(user_id)
            .await?
            .ok_or_else(|| E2eError::KeinOeffentlicherSchluessel(user_id.to_string()))?;
        Ok(parse_public_key(user_id.as_str(), &record.public_key)?)
    }

    fn entry_for(&self, key: &GroupKey, public_key: &RsaPublicKey) -> E2eResult<MemberEntry> {
        Ok(MemberEntry {
            wrapped_key: wrap_key_for_member(key, public_key)?,
            key_version: key.version,
            wrapped_at: Utc::now(),
        })
    }

    /// Speichert `key` lokal; liefert die aktuelle lokale Version
    async fn lokal_speichern(&self, key: &GroupKey) -> E2eResult<u32> {
        let keyring = self.store.store_group_key(key).await?;
        self.cache.invalidate(&key.group_id);
        Ok(keyring.current_version())
    }

    fn kein_schluessel(&self, group_id: &GroupId) -> E2eError {
        E2eError::KeinSchluessel {
            group_id: group_id.to_string(),
        }
    }

    fn kein_mitglied(&self, group_id: &GroupId) -> E2eError {
        E2eError::KeinMitglied {
            group_id: group_id.to_string(),
            user_id: self.user_id().to_string(),
        }
    }

    fn melden(&self, event: KeyEvent) {
        // Keine Abonnenten ist kein Fehler
        let _ = self.event_tx.send(event);
    }
}
