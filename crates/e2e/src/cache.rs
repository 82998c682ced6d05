//! Arbeitsspeicher-Cache fuer Gruppenschluessel
//!
//! Pro Gruppe eine `OnceCell`: bei gleichzeitigem Cache-Miss laedt genau ein
//! Task den Keyring aus dem Schluesselspeicher, alle anderen warten auf dessen
//! Ergebnis. Fehlgeschlagene oder leere Ladevorgaenge lassen die Zelle leer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chatvault_core::GroupId;
use chatvault_crypto::{CryptoResult, GroupKey};
use chatvault_keystore::{GroupKeyring, SecureKeyStore};
use chatvault_observability::CryptoMetrics;
use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::{E2eError, E2eResult};

/// Entschluesselter Keyring einer Gruppe
#[derive(Debug)]
pub struct CachedKeys {
    current_version: u32,
    by_version: BTreeMap<u32, GroupKey>,
}

impl CachedKeys {
    fn from_keyring(keyring: &GroupKeyring) -> CryptoResult<Option<Self>> {
        let by_version: BTreeMap<u32, GroupKey> = keyring
            .all_keys()?
            .into_iter()
            .map(|key| (key.version, key))
            .collect();
        if !by_version.contains_key(&keyring.current_version()) {
            return Ok(None);
        }
        Ok(Some(Self {
            current_version: keyring.current_version(),
            by_version,
        }))
    }

    /// Aktiver Schluessel
    pub fn current(&self) -> Option<&GroupKey> {
        self.by_version.get(&self.current_version)
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn get(&self, version: u32) -> Option<&GroupKey> {
        self.by_version.get(&version)
    }
}

enum Ladefehler {
    Fehlt,
    Fehler(E2eError),
}

/// Gruppenschluessel-Cache eines Benutzers
pub struct KeyCache {
    cells: DashMap<GroupId, Arc<OnceCell<Arc<CachedKeys>>>>,
    ladevorgaenge: AtomicU64,
    metrics: CryptoMetrics,
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("gruppen", &self.cells.len())
            .field("ladevorgaenge", &self.ladevorgaenge())
            .finish()
    }
}

impl KeyCache {
    pub fn new(metrics: CryptoMetrics) -> Self {
        Self {
            cells: DashMap::new(),
            ladevorgaenge: AtomicU64::new(0),
            metrics,
        }
    }

    /// Liefert die Schluessel der Gruppe, laedt sie bei Bedarf aus `store`
    ///
    /// `Ok(None)` wenn lokal kein lesbarer Keyring existiert.
    pub async fn get_or_load(
        &self,
        group_id: &GroupId,
        store: &SecureKeyStore,
    ) -> E2eResult<Option<Arc<CachedKeys>>> {
        let cell = self.cells.entry(group_id.clone()).or_default().clone();

        let result = cell
            .get_or_try_init(|| async {
                self.ladevorgaenge.fetch_add(1, Ordering::SeqCst);
                let start = Instant::now();

                let keyring = store
                    .load_keyring(group_id)
                    .await
                    .map_err(|e| Ladefehler::Fehler(e.into()))?;
                self.metrics
                    .key_load_duration_seconds
                    .observe(start.elapsed().as_secs_f64());

                let keyring = keyring.ok_or(Ladefehler::Fehlt)?;
                let keys = CachedKeys::from_keyring(&keyring)
                    .map_err(|e| Ladefehler::Fehler(e.into()))?
                    .ok_or(Ladefehler::Fehlt)?;

                tracing::debug!(
                    group_id = %group_id,
                    version = keys.current_version,
                    versionen = keys.by_version.len(),
                    "Gruppenschluessel in Cache geladen"
                );
                Ok::<_, Ladefehler>(Arc::new(keys))
            })
            .await;

        self.gauge_aktualisieren();
        match result {
            Ok(keys) => Ok(Some(keys.clone())),
            Err(Ladefehler::Fehlt) => Ok(None),
            Err(Ladefehler::Fehler(e)) => Err(e),
        }
    }

    /// Verwirft die Schluessel einer Gruppe; der naechste Zugriff laedt neu
    pub fn invalidate(&self, group_id: &GroupId) {
        if self.cells.remove(group_id).is_some() {
            tracing::trace!(group_id = %group_id, "Cache-Eintrag verworfen");
        }
        self.gauge_aktualisieren();
    }

    pub fn clear(&self) {
        self.cells.clear();
        self.gauge_aktualisieren();
    }

    /// Anzahl der Gruppen mit geladenen Schluesseln
    pub fn len(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Anzahl gestarteter Ladevorgaenge aus dem Schluesselspeicher
    pub fn ladevorgaenge(&self) -> u64 {
        self.ladevorgaenge.load(Ordering::SeqCst)
    }

    fn gauge_aktualisieren(&self) {
        self.metrics.cached_groups.set(self.len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatvault_core::UserId;
    use chatvault_crypto::group::create_group_key;
    use chatvault_crypto::SoftwareEnclave;
    use chatvault_keystore::MemoryBackend;

    fn store() -> Arc<SecureKeyStore> {
        Arc::new(
            SecureKeyStore::open(
                UserId::from("alice"),
                Arc::new(MemoryBackend::new()),
                Arc::new(SoftwareEnclave::new()),
            )
            .unwrap(),
        )
    }

    fn cache() -> KeyCache {
        KeyCache::new(CryptoMetrics::neu().unwrap())
    }

    #[tokio::test]
    async fn treffer_laedt_nicht_erneut() {
        let store = store();
        let cache = cache();
        let g = GroupId::from("g1");
        store
            .store_group_key(&create_group_key(&g, 1, &UserId::from("alice")))
            .await
            .unwrap();

        let a = cache.get_or_load(&g, &store).await.unwrap().unwrap();
        let b = cache.get_or_load(&g, &store).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.ladevorgaenge(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.metrics.cached_groups.get(), 1);
    }

    #[tokio::test]
    async fn fehlender_keyring_wird_nicht_gecacht() {
        let store = store();
        let cache = cache();
        let g = GroupId::from("g1");

        assert!(cache.get_or_load(&g, &store).await.unwrap().is_none());
        assert!(cache.is_empty());

        store
            .store_group_key(&create_group_key(&g, 1, &UserId::from("alice")))
            .await
            .unwrap();
        let keys = cache.get_or_load(&g, &store).await.unwrap().unwrap();
        assert_eq!(keys.current_version(), 1);
        assert_eq!(cache.ladevorgaenge(), 2);
    }

    #[tokio::test]
    async fn invalidate_erzwingt_neuladen() {
        let store = store();
        let cache = cache();
        let g = GroupId::from("g1");
        let alice = UserId::from("alice");
        store.store_group_key(&create_group_key(&g, 1, &alice)).await.unwrap();
        cache.get_or_load(&g, &store).await.unwrap();

        store.store_group_key(&create_group_key(&g, 2, &alice)).await.unwrap();
        assert_eq!(
            cache.get_or_load(&g, &store).await.unwrap().unwrap().current_version(),
            1
        );

        cache.invalidate(&g);
        let keys = cache.get_or_load(&g, &store).await.unwrap().unwrap();
        assert_eq!(keys.current_version(), 2);
        assert!(keys.get(1).is_some());
        assert!(keys.get(3).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn gleichzeitiger_miss_laedt_genau_einmal() {
        let store = store();
        let cache = Arc::new(cache());
        let g = GroupId::from("g1");
        store
            .store_group_key(&create_group_key(&g, 1, &UserId::from("alice")))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let cache = cache.clone();
            let g = g.clone();
            handles.push(tokio::spawn(async move {
                cache.get_or_load(&g, &store).await.unwrap().unwrap()
            }));
        }

        let mut ergebnisse = Vec::new();
        for handle in handles {
            ergebnisse.push(handle.await.unwrap());
        }

        assert_eq!(cache.ladevorgaenge(), 1);
        assert!(ergebnisse.iter().all(|k| Arc::ptr_eq(k, &ergebnisse[0])));
    }

    #[tokio::test]
    async fn gruppen_sind_getrennt() {
        let store = store();
        let cache = cache();
        let alice = UserId::from("alice");
        let g1 = GroupId::from("g1");
        let g2 = GroupId::from("g2");
        store.store_group_key(&create_group_key(&g1, 1, &alice)).await.unwrap();
        store.store_group_key(&create_group_key(&g2, 5, &alice)).await.unwrap();

        let k1 = cache.get_or_load(&g1, &store).await.unwrap().unwrap();
        let k2 = cache.get_or_load(&g2, &store).await.unwrap().unwrap();
        assert_eq!(k1.current_version(), 1);
        assert_eq!(k2.current_version(), 5);

        cache.invalidate(&g1);
        assert_eq!(cache.len(), 1);
    }
}
