//! Ende-zu-Ende-Sitzung eines lokalen Benutzers
//!
//! Baut Schluesselspeicher, Cache, Schluesselverwaltung und Cipher aus
//! explizit uebergebenen Abhaengigkeiten zusammen. Es gibt keinen globalen
//! Zustand; mehrere Sitzungen (z.B. mehrere Benutzer in Tests) koexistieren.

use std::collections::BTreeMap;
use std::sync::Arc;

use chatvault_core::config::VerschluesselungsEinstellungen;
use chatvault_core::UserId;
use chatvault_crypto::{HybridCipher, HybridEnvelope, RsaIdentity, SecureEnclave};
use chatvault_keystore::{KeyValueBackend, SecureKeyStore};
use chatvault_observability::CryptoMetrics;
use chatvault_registry::{KeyRegistry, KeyRegistrySync};

use crate::cache::KeyCache;
use crate::error::{E2eError, E2eResult};
use crate::key_manager::GroupKeyManager;
use crate::message_cipher::MessageCipher;

/// Alle Dienste der Ende-zu-Ende-Schicht fuer einen Benutzer
#[derive(Debug, Clone)]
pub struct E2eSession {
    user_id: UserId,
    store: Arc<SecureKeyStore>,
    cache: Arc<KeyCache>,
    keys: GroupKeyManager,
    cipher: MessageCipher,
    hybrid: HybridCipher,
    registry: KeyRegistrySync,
    metrics: CryptoMetrics,
}

impl E2eSession {
    /// Oeffnet die Sitzung
    ///
    /// Erzeugt beim ersten Start Master-Secret und RSA-Identitaet in der
    /// Enclave und veroeffentlicht den oeffentlichen Schluessel.
    pub async fn new(
        user_id: UserId,
        enclave: Arc<dyn SecureEnclave>,
        backend: Arc<dyn KeyValueBackend>,
        registry: Arc<dyn KeyRegistry>,
        einstellungen: &VerschluesselungsEinstellungen,
        metrics: CryptoMetrics,
    ) -> E2eResult<Self> {
        let store = Arc::new(SecureKeyStore::open(
            user_id.clone(),
            backend,
            enclave.clone(),
        )?);

        // RSA-Schluesselerzeugung blockiert spuerbar
        let identity = {
            let user_id = user_id.clone();
            let bits = einstellungen.rsa_bits;
            tokio::task::spawn_blocking(move || {
                RsaIdentity::load_or_create(enclave.as_ref(), &user_id, bits)
            })
            .await
            .map_err(|e| E2eError::Intern(format!("Identitaet-Task abgebrochen: {e}")))??
        };
        let identity = Arc::new(identity);

        let registry = KeyRegistrySync::new(registry);
        let cache = Arc::new(KeyCache::new(metrics.clone()));
        let keys = GroupKeyManager::new(
            identity.clone(),
            store.clone(),
            registry.clone(),
            cache.clone(),
            metrics.clone(),
        );
        keys.ensure_identity().await?;

        let cipher = MessageCipher::new(
            store.clone(),
            cache.clone(),
            einstellungen.policy,
            metrics.clone(),
        )
        .mit_nachladen(keys.clone());

        tracing::info!(user_id = %user_id, policy = ?einstellungen.policy, "E2E-Sitzung geoeffnet");

        Ok(Self {
            user_id,
            store,
            cache,
            keys,
            cipher,
            hybrid: HybridCipher::new(identity),
            registry,
            metrics,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Gruppenschluessel-Verwaltung
    pub fn keys(&self) -> &GroupKeyManager {
        &self.keys
    }

    /// Gruppennachrichten ver- und entschluesseln
    pub fn cipher(&self) -> &MessageCipher {
        &self.cipher
    }

    pub fn hybrid(&self) -> &HybridCipher {
        &self.hybrid
    }

    pub fn store(&self) -> &Arc<SecureKeyStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &CryptoMetrics {
        &self.metrics
    }

    /// Hybrid-Verschluesselung fuer Benutzer mit veroeffentlichtem Schluessel
    pub async fn encrypt_for_users(
        &self,
        plaintext: &str,
        recipients: &[UserId],
    ) -> E2eResult<HybridEnvelope> {
        let mut public_keys = BTreeMap::new();
        for user_id in recipients {
            let record = self
                .registry
                .fetch_public_key(user_id)
                .await?
                .ok_or_else(|| E2eError::KeinOeffentlicherSchluessel(user_id.to_string()))?;
            public_keys.insert(user_id.clone(), record.public_key);
        }

        let envelope = self.hybrid.encrypt_for_recipients(plaintext, &public_keys)?;
        self.metrics.hybrid_nachricht("verschluesselt");
        Ok(envelope)
    }

    /// Entschluesselt einen Hybrid-Umschlag; schlaegt immer explizit fehl
    pub fn decrypt_hybrid(&self, envelope: &HybridEnvelope) -> E2eResult<String> {
        let plaintext = self.hybrid.decrypt(envelope)?;
        self.metrics.hybrid_nachricht("entschluesselt");
        Ok(plaintext)
    }
}
