//! Verschluesselter Schluesselspeicher pro Benutzer
//!
//! Jeder Wert wird mit AES-256-GCM versiegelt (frischer IV pro Aufruf) und als
//! `base64(iv || ciphertext || tag)` im Backend abgelegt. Der AEAD-Schluessel
//! wird per HKDF aus dem Master-Secret des Benutzers abgeleitet, das nur in
//! der Secure-Enclave liegt. Die AAD bindet Benutzer und Eintragsschluessel,
//! damit Eintraege nicht untereinander vertauscht werden koennen.
//!
//! Lesefehler durch Manipulation oder Korruption liefern `None` statt eines
//! Fehlers (fail-closed).

use std::sync::Arc;

use chatvault_core::UserId;
use chatvault_crypto::aead::{open_base64, seal_base64};
use chatvault_crypto::{hkdf_derive, EnclaveKeyKind, SecretBytes, SecureEnclave, KEY_LEN};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::backend::KeyValueBackend;
use crate::error::KeystoreResult;

const HKDF_INFO: &[u8] = b"chatvault-keystore-v1";

/// Verschluesselter Key-Value-Speicher eines lokalen Benutzers
pub struct SecureKeyStore {
    user_id: UserId,
    backend: Arc<dyn KeyValueBackend>,
    enclave: Arc<dyn SecureEnclave>,
    /// Abgeleiteter Speicher-Schluessel, nach Master-Rotation verworfen
    storage_key: RwLock<Option<SecretBytes>>,
    /// Serialisiert Read-Modify-Write auf Keyrings
    pub(crate) keyring_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SecureKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureKeyStore")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl SecureKeyStore {
    /// Oeffnet den Speicher; erzeugt das Master-Secret beim ersten Aufruf
    pub fn open(
        user_id: UserId,
        backend: Arc<dyn KeyValueBackend>,
        enclave: Arc<dyn SecureEnclave>,
    ) -> KeystoreResult<Self> {
        let alias = Self::master_alias(&user_id);
        if enclave.get(&alias)?.is_none() {
            enclave.generate_key(&alias, EnclaveKeyKind::Aes256)?;
            info!(user_id = %user_id, "Master-Secret fuer Schluesselspeicher erzeugt");
        }

        Ok(Self {
            user_id,
            backend,
            enclave,
            storage_key: RwLock::new(None),
            keyring_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Enclave-Alias des Master-Secrets
    pub fn master_alias(user_id: &UserId) -> String {
        format!("keystore_master_{}", user_id)
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Versiegelt `value` und speichert es unter `key`
    pub async fn put(&self, key: &str, value: &[u8]) -> KeystoreResult<()> {
        let storage_key = self.storage_key()?;
        let sealed = seal_base64(storage_key.as_bytes(), value, &self.aad(key))?;
        self.backend
            .store(self.user_id.as_str(), key, &sealed)
            .await?;
        debug!(user_id = %self.user_id, key, "Eintrag gespeichert");
        Ok(())
    }

    /// Liest und entschluesselt den Eintrag unter `key`
    ///
    /// Nicht authentifizierbare oder kaputte Eintraege gelten als nicht
    /// vorhanden. Backend-Fehler werden weitergereicht.
    pub async fn get(&self, key: &str) -> KeystoreResult<Option<SecretBytes>> {
        let Some(sealed) = self.backend.load(self.user_id.as_str(), key).await? else {
            return Ok(None);
        };
        let storage_key = self.storage_key()?;

        match open_base64(storage_key.as_bytes(), &sealed, &self.aad(key)) {
            Ok(plain) => Ok(Some(SecretBytes::new(plain))),
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    key,
                    fehler = %e,
                    "Eintrag nicht entschluesselbar, wird als fehlend behandelt"
                );
                Ok(None)
            }
        }
    }

    pub async fn remove(&self, key: &str) -> KeystoreResult<bool> {
        self.backend.delete(self.user_id.as_str(), key).await
    }

    /// Loescht alle Eintraege dieses Benutzers
    pub async fn clear(&self) -> KeystoreResult<u64> {
        let anzahl = self.backend.delete_all(self.user_id.as_str()).await?;
        info!(user_id = %self.user_id, anzahl, "Schluesselspeicher geleert");
        Ok(anzahl)
    }

    /// True wenn ein lesbarer Eintrag unter `key` existiert
    pub async fn contains(&self, key: &str) -> KeystoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    pub async fn keys(&self) -> KeystoreResult<Vec<String>> {
        self.backend.keys(self.user_id.as_str()).await
    }

    /// Erzeugt ein neues Master-Secret
    ///
    /// Vorhandene Eintraege werden nicht neu verschluesselt und sind danach
    /// nicht mehr lesbar.
    pub fn rotate_master_key(&self) -> KeystoreResult<()> {
        // Erzeugen und Verwerfen unter demselben Guard wie das Ableiten
        let mut cache = self.storage_key.write();
        self.enclave
            .generate_key(&Self::master_alias(&self.user_id), EnclaveKeyKind::Aes256)?;
        *cache = None;
        drop(cache);
        warn!(
            user_id = %self.user_id,
            "Master-Secret rotiert, bestehende Eintraege sind nicht mehr lesbar"
        );
        Ok(())
    }

    fn aad(&self, key: &str) -> Vec<u8> {
        format!("{}/{}", self.user_id, key).into_bytes()
    }

    fn storage_key(&self) -> KeystoreResult<SecretBytes> {
        if let Some(key) = self.storage_key.read().as_ref() {
            return Ok(key.clone());
        }

        let mut cache = self.storage_key.write();
        if let Some(key) = cache.as_ref() {
            return Ok(key.clone());
        }

        let alias = Self::master_alias(&self.user_id);
        let master = match self.enclave.get(&alias)? {
            Some(master) => master,
            None => {
                // Nach explizitem Wipe der Enclave
                self.enclave.generate_key(&alias, EnclaveKeyKind::Aes256)?;
                self.enclave.get(&alias)?.ok_or_else(|| {
                    crate::error::KeystoreError::intern("Master-Secret nach Erzeugung nicht lesbar")
                })?
            }
        };

        let derived = hkdf_derive(
            master.as_bytes(),
            self.user_id.as_str().as_bytes(),
            HKDF_INFO,
            KEY_LEN,
        )?;
        *cache = Some(derived.clone());
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use chatvault_crypto::{SoftwareEnclave, NONCE_LEN, TAG_LEN};

    fn store_fuer(user: &str) -> (SecureKeyStore, Arc<MemoryBackend>, Arc<SoftwareEnclave>) {
        let backend = Arc::new(MemoryBackend::new());
        let enclave = Arc::new(SoftwareEnclave::new());
        let store =
            SecureKeyStore::open(UserId::from(user), backend.clone(), enclave.clone()).unwrap();
        (store, backend, enclave)
    }

    #[tokio::test]
    async fn put_und_get() {
        let (store, _, _) = store_fuer("alice");
        store.put("group_g1", b"geheim").await.unwrap();
        let value = store.get("group_g1").await.unwrap().unwrap();
        assert_eq!(value.as_bytes(), b"geheim");
        assert!(store.contains("group_g1").await.unwrap());
        assert!(!store.contains("group_g2").await.unwrap());
    }

    #[tokio::test]
    async fn gespeichertes_format() {
        let (store, backend, _) = store_fuer("alice");
        store.put("k", b"0123456789").await.unwrap();

        let raw = backend.raw("alice", "k").unwrap();
        let bytes = STANDARD.decode(raw).unwrap();
        assert_eq!(bytes.len(), NONCE_LEN + 10 + TAG_LEN);
    }

    #[tokio::test]
    async fn jeder_put_nutzt_neuen_iv() {
        let (store, backend, _) = store_fuer("alice");
        store.put("k", b"gleich").await.unwrap();
        let erster = backend.raw("alice", "k").unwrap();
        store.put("k", b"gleich").await.unwrap();
        let zweiter = backend.raw("alice", "k").unwrap();
        assert_ne!(erster, zweiter);
    }

    #[tokio::test]
    async fn manipulierter_eintrag_ist_fehlend() {
        let (store, backend, _) = store_fuer("alice");
        store.put("k", b"wert").await.unwrap();

        let mut bytes = STANDARD.decode(backend.raw("alice", "k").unwrap()).unwrap();
        bytes[NONCE_LEN] ^= 0x80;
        backend.set_raw("alice", "k", &STANDARD.encode(bytes));
        assert!(store.get("k").await.unwrap().is_none());

        backend.set_raw("alice", "k", "kein base64 !!!");
        assert!(store.get("k").await.unwrap().is_none());

        backend.set_raw("alice", "k", "AAAA");
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vertauschte_eintraege_sind_fehlend() {
        let (store, backend, _) = store_fuer("alice");
        store.put("a", b"wert-a").await.unwrap();
        let raw_a = backend.raw("alice", "a").unwrap();
        backend.set_raw("alice", "b", &raw_a);
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn benutzer_sehen_sich_nicht() {
        let backend = Arc::new(MemoryBackend::new());
        let enclave = Arc::new(SoftwareEnclave::new());
        let alice =
            SecureKeyStore::open(UserId::from("alice"), backend.clone(), enclave.clone()).unwrap();
        let bob = SecureKeyStore::open(UserId::from("bob"), backend.clone(), enclave).unwrap();

        alice.put("k", b"von alice").await.unwrap();
        assert!(bob.get("k").await.unwrap().is_none());
        assert!(bob.keys().await.unwrap().is_empty());

        // Eintrag von alice in bobs Namensraum kopiert
        backend.set_raw("bob", "k", &backend.raw("alice", "k").unwrap());
        assert!(bob.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_und_clear() {
        let (store, _, _) = store_fuer("alice");
        store.put("a", b"1").await.unwrap();
        store.put("b", b"2").await.unwrap();

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
        assert_eq!(store.keys().await.unwrap(), vec!["b"]);

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn master_rotation_macht_eintraege_unlesbar() {
        let (store, _, _) = store_fuer("alice");
        store.put("alt", b"vorher").await.unwrap();

        store.rotate_master_key().unwrap();
        assert!(store.get("alt").await.unwrap().is_none());

        store.put("neu", b"nachher").await.unwrap();
        assert_eq!(store.get("neu").await.unwrap().unwrap().as_bytes(), b"nachher");
    }

    #[tokio::test]
    async fn wiedereroeffnen_mit_gleicher_enclave() {
        let (store, backend, enclave) = store_fuer("alice");
        store.put("k", b"bleibt").await.unwrap();
        drop(store);

        let reopened = SecureKeyStore::open(UserId::from("alice"), backend, enclave).unwrap();
        assert_eq!(reopened.get("k").await.unwrap().unwrap().as_bytes(), b"bleibt");
    }

    #[tokio::test]
    async fn master_secret_liegt_in_der_enclave() {
        let (_store, _, enclave) = store_fuer("alice");
        let master = enclave
            .get(&SecureKeyStore::master_alias(&UserId::from("alice")))
            .unwrap()
            .unwrap();
        assert_eq!(master.len(), KEY_LEN);
    }

    /// Enclave, die genau ein Lesen des Master-Secrets nach dem Lesen verzoegert
    struct LangsamesEnclave {
        inner: SoftwareEnclave,
        gelesen: parking_lot::Mutex<Option<std::sync::mpsc::Sender<()>>>,
    }

    impl SecureEnclave for LangsamesEnclave {
        fn generate_key(&self, alias: &str, kind: EnclaveKeyKind) -> chatvault_crypto::CryptoResult<()> {
            self.inner.generate_key(alias, kind)
        }

        fn get(&self, alias: &str) -> chatvault_crypto::CryptoResult<Option<SecretBytes>> {
            let value = self.inner.get(alias)?;
            if let Some(tx) = self.gelesen.lock().take() {
                let _ = tx.send(());
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Ok(value)
        }

        fn delete(&self, alias: &str) -> chatvault_crypto::CryptoResult<bool> {
            self.inner.delete(alias)
        }
    }

    #[tokio::test]
    async fn rotation_waehrend_ableitung_cacht_kein_altes_secret() {
        let backend = Arc::new(MemoryBackend::new());
        let enclave = Arc::new(LangsamesEnclave {
            inner: SoftwareEnclave::new(),
            gelesen: parking_lot::Mutex::new(None),
        });
        let store = SecureKeyStore::open(UserId::from("alice"), backend.clone(), enclave.clone())
            .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        *enclave.gelesen.lock() = Some(tx);
        std::thread::scope(|s| {
            s.spawn(|| store.storage_key().unwrap());
            let store = &store;
            s.spawn(move || {
                rx.recv().unwrap();
                store.rotate_master_key().unwrap();
            });
        });

        store.put("k", b"nach rotation").await.unwrap();
        let reopened = SecureKeyStore::open(UserId::from("alice"), backend, enclave).unwrap();
        assert_eq!(reopened.get("k").await.unwrap().unwrap().as_bytes(), b"nach rotation");
    }
}
