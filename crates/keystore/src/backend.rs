//! Persistenz-Backend fuer den Schluesselspeicher
//!
//! Das `KeyValueBackend`-Trait abstrahiert den konkreten Speicher (Memory,
//! SQLite, ...). Backends sehen nur bereits verschluesselte, Base64-kodierte
//! Werte. `namespace` trennt die Speicher mehrerer lokaler Benutzer.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::KeystoreResult;

/// Abstraktes Speicher-Backend fuer verschluesselte Eintraege
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Eintrag laden
    async fn load(&self, namespace: &str, key: &str) -> KeystoreResult<Option<String>>;

    /// Eintrag speichern (ueberschreibt)
    async fn store(&self, namespace: &str, key: &str, value: &str) -> KeystoreResult<()>;

    /// Eintrag loeschen; true wenn er existierte
    async fn delete(&self, namespace: &str, key: &str) -> KeystoreResult<bool>;

    /// Alle Eintraege eines Namensraums loeschen; Anzahl geloeschter Eintraege
    async fn delete_all(&self, namespace: &str) -> KeystoreResult<u64>;

    /// Alle Schluessel eines Namensraums, sortiert
    async fn keys(&self, namespace: &str) -> KeystoreResult<Vec<String>>;
}

/// Fluechtiges Backend im Arbeitsspeicher
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<(String, String), String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rohwert ohne Entschluesselung (fuer Tests des Speicherformats)
    pub fn raw(&self, namespace: &str, key: &str) -> Option<String> {
        self.entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|v| v.value().clone())
    }

    /// Rohwert direkt setzen (simuliert Datentraeger-Korruption in Tests)
    pub fn set_raw(&self, namespace: &str, key: &str, value: &str) {
        self.entries
            .insert((namespace.to_string(), key.to_string()), value.to_string());
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn load(&self, namespace: &str, key: &str) -> KeystoreResult<Option<String>> {
        Ok(self.raw(namespace, key))
    }

    async fn store(&self, namespace: &str, key: &str, value: &str) -> KeystoreResult<()> {
        self.set_raw(namespace, key, value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> KeystoreResult<bool> {
        Ok(self
            .entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    async fn delete_all(&self, namespace: &str) -> KeystoreResult<u64> {
        // Zaehlen im Closure, len() aendert sich durch parallele Inserts
        let mut entfernt = 0u64;
        self.entries.retain(|(ns, _), _| {
            if ns == namespace {
                entfernt += 1;
                false
            } else {
                true
            }
        });
        Ok(entfernt)
    }

    async fn keys(&self, namespace: &str) -> KeystoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
