//! Gemeinsame Test-Hilfen: mehrere Benutzer an einer Registry

#![allow(dead_code)]

use std::sync::Arc;

use chatvault_core::config::VerschluesselungsEinstellungen;
use chatvault_core::{EncryptionPolicy, UserId};
use chatvault_crypto::SoftwareEnclave;
use chatvault_e2e::E2eSession;
use chatvault_keystore::MemoryBackend;
use chatvault_observability::CryptoMetrics;
use chatvault_registry::{KeyRegistry, MemoryRegistry};

/// Eine Registry, beliebig viele Benutzer mit eigener Enclave und eigenem Speicher
pub struct Umgebung {
    pub registry: Arc<dyn KeyRegistry>,
}

impl Umgebung {
    pub fn new() -> Self {
        Self::mit_registry(Arc::new(MemoryRegistry::new()))
    }

    pub fn mit_registry(registry: Arc<dyn KeyRegistry>) -> Self {
        Self { registry }
    }

    pub async fn benutzer(&self, name: &str) -> E2eSession {
        self.benutzer_mit(name, EncryptionPolicy::FailClosed).await
    }

    pub async fn benutzer_mit(&self, name: &str, policy: EncryptionPolicy) -> E2eSession {
        let einstellungen = VerschluesselungsEinstellungen {
            policy,
            ..Default::default()
        };
        E2eSession::new(
            UserId::from(name),
            Arc::new(SoftwareEnclave::new()),
            Arc::new(MemoryBackend::new()),
            self.registry.clone(),
            &einstellungen,
            CryptoMetrics::neu().unwrap(),
        )
        .await
        .unwrap()
    }
}
