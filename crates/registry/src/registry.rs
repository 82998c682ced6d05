//! Registry-Abstraktion und In-Memory-Implementierung
//!
//! Die Registry ist ein hierarchischer JSON-Baum, adressiert ueber
//! `/`-getrennte Pfade. Schreiben von `null` (oder eines leeren Objekts)
//! loescht den Pfad; leer gewordene Elternknoten verschwinden mit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::{RegistryError, RegistryResult};
use crate::paths::{join, segments};

/// Groesse des Aenderungs-Kanals
const AENDERUNGS_KANAL_GROESSE: usize = 256;

/// Bedingung fuer einen Schreibvorgang (optimistische Nebenlaeufigkeit)
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub path: String,
    /// Erwarteter Wert; `None` heisst "Pfad existiert nicht"
    pub expected: Option<Value>,
}

impl Precondition {
    pub fn equals(path: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            expected: Some(expected.into()),
        }
    }

    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expected: None,
        }
    }
}

/// Aenderungsbenachrichtigung
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryChange {
    pub path: String,
    /// Neuer Wert; `None` wenn geloescht
    pub value: Option<Value>,
}

impl RegistryChange {
    /// True wenn die Aenderung `path` selbst, einen Vorfahren oder einen
    /// Nachfahren betrifft
    pub fn betrifft(&self, path: &str) -> bool {
        self.path == path
            || self.path.starts_with(&format!("{path}/"))
            || path.starts_with(&format!("{}/", self.path))
    }
}

/// Eventuell-konsistenter Schluessel-Sync-Dienst
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Ersetzt den Wert unter `path`
    async fn write(&self, path: &str, value: Value) -> RegistryResult<()>;

    /// Schreibt alle Kindpfade von `updates` relativ zu `path` in einem
    /// Schritt, optional nur wenn `precondition` erfuellt ist
    async fn update(
        &self,
        path: &str,
        updates: BTreeMap<String, Value>,
        precondition: Option<Precondition>,
    ) -> RegistryResult<()>;

    async fn read(&self, path: &str) -> RegistryResult<Option<Value>>;

    /// Loescht `path`; true wenn dort ein Wert war
    async fn delete(&self, path: &str) -> RegistryResult<bool>;

    fn subscribe(&self) -> broadcast::Receiver<RegistryChange>;

    /// Liefert den aktuellen Wert oder wartet auf den ersten geschriebenen
    async fn read_once(&self, path: &str) -> RegistryResult<Value> {
        let mut rx = self.subscribe();
        if let Some(value) = self.read(path).await? {
            return Ok(value);
        }

        loop {
            match rx.recv().await {
                Ok(change) if !change.betrifft(path) => continue,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(value) = self.read(path).await? {
                        return Ok(value);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(RegistryError::NichtErreichbar(
                        "Aenderungs-Kanal geschlossen".into(),
                    ));
                }
            }
        }
    }
}

/// In-Memory-Registry
///
/// Clone teilt den Zustand. Mit `set_erreichbar(false)` schlagen alle
/// Operationen mit `NichtErreichbar` fehl.
#[derive(Clone)]
pub struct MemoryRegistry {
    inner: Arc<MemoryRegistryInner>,
}

struct MemoryRegistryInner {
    tree: RwLock<Value>,
    erreichbar: AtomicBool,
    schreibvorgaenge: AtomicU64,
    change_tx: broadcast::Sender<RegistryChange>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegistry")
            .field("erreichbar", &self.ist_erreichbar())
            .field("schreibvorgaenge", &self.schreibvorgaenge())
            .finish_non_exhaustive()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(AENDERUNGS_KANAL_GROESSE);
        Self {
            inner: Arc::new(MemoryRegistryInner {
                tree: RwLock::new(Value::Object(Map::new())),
                erreichbar: AtomicBool::new(true),
                schreibvorgaenge: AtomicU64::new(0),
                change_tx,
            }),
        }
    }

    /// Simuliert Netzwerkausfall
    pub fn set_erreichbar(&self, erreichbar: bool) {
        self.inner.erreichbar.store(erreichbar, Ordering::SeqCst);
        tracing::debug!(erreichbar, "Registry-Erreichbarkeit geaendert");
    }

    pub fn ist_erreichbar(&self) -> bool {
        self.inner.erreichbar.load(Ordering::SeqCst)
    }

    /// Anzahl erfolgreicher Schreibvorgaenge (write, update, delete)
    pub fn schreibvorgaenge(&self) -> u64 {
        self.inner.schreibvorgaenge.load(Ordering::SeqCst)
    }

    /// Kompletter Baum (fuer Tests und Diagnose)
    pub fn snapshot(&self) -> Value {
        self.inner.tree.read().clone()
    }

    fn pruefe_erreichbar(&self) -> RegistryResult<()> {
        if self.ist_erreichbar() {
            Ok(())
        } else {
            Err(RegistryError::NichtErreichbar("Registry offline".into()))
        }
    }

    fn melden(&self, changes: Vec<RegistryChange>) {
        self.inner.schreibvorgaenge.fetch_add(1, Ordering::SeqCst);
        for change in changes {
            // Keine Empfaenger ist kein Fehler
            let _ = self.inner.change_tx.send(change);
        }
    }
}

#[async_trait]
impl KeyRegistry for MemoryRegistry {
    async fn write(&self, path: &str, value: Value) -> RegistryResult<()> {
        self.pruefe_erreichbar()?;
        let segs = segments(path)?;
        {
            let mut tree = self.inner.tree.write();
            set_at(&mut tree, &segs, value.clone());
        }
        tracing::trace!(path, "Registry geschrieben");
        self.melden(vec![change(path, value)]);
        Ok(())
    }

    async fn update(
        &self,
        path: &str,
        updates: BTreeMap<String, Value>,
        precondition: Option<Precondition>,
    ) -> RegistryResult<()> {
        self.pruefe_erreichbar()?;
        segments(path)?;

        let mut targets = Vec::with_capacity(updates.len());
        for (child, value) in updates {
            let full = join(path, &child);
            segments(&full)?;
            targets.push((full, value));
        }

        {
            let mut tree = self.inner.tree.write();

            if let Some(bedingung) = &precondition {
                let segs = segments(&bedingung.path)?;
                let gefunden = get_at(&tree, &segs).cloned();
                if gefunden != bedingung.expected {
                    return Err(RegistryError::Konflikt {
                        pfad: bedingung.path.clone(),
                        erwartet: beschreibe(bedingung.expected.as_ref()),
                        gefunden: beschreibe(gefunden.as_ref()),
                    });
                }
            }

            for (full, value) in &targets {
                let segs = segments(full)?;
                set_at(&mut tree, &segs, value.clone());
            }
        }

        tracing::trace!(path, anzahl = targets.len(), "Registry aktualisiert");
        self.melden(
            targets
                .into_iter()
                .map(|(full, value)| change(&full, value))
                .collect(),
        );
        Ok(())
    }

    async fn read(&self, path: &str) -> RegistryResult<Option<Value>> {
        self.pruefe_erreichbar()?;
        let segs = segments(path)?;
        Ok(get_at(&self.inner.tree.read(), &segs).cloned())
    }

    async fn delete(&self, path: &str) -> RegistryResult<bool> {
        self.pruefe_erreichbar()?;
        let segs = segments(path)?;
        let entfernt = remove_at(&mut self.inner.tree.write(), &segs);
        if entfernt {
            self.melden(vec![RegistryChange {
                path: path.to_string(),
                value: None,
            }]);
        }
        Ok(entfernt)
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.inner.change_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Baum-Operationen
// ---------------------------------------------------------------------------

fn ist_loeschung(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn change(path: &str, value: Value) -> RegistryChange {
    RegistryChange {
        path: path.to_string(),
        value: (!ist_loeschung(&value)).then_some(value),
    }
}

fn beschreibe(value: Option<&Value>) -> String {
    value.map_or_else(|| "<fehlt>".to_string(), Value::to_string)
}

fn get_at<'a>(node: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    segs.iter()
        .try_fold(node, |node, seg| node.as_object()?.get(*seg))
}

fn set_at(node: &mut Value, segs: &[&str], value: Value) {
    if ist_loeschung(&value) {
        remove_at(node, segs);
        return;
    }
    let Some((first, rest)) = segs.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_at(child, rest, value);
    }
}

fn remove_at(node: &mut Value, segs: &[&str]) -> bool {
    let Some((first, rest)) = segs.split_first() else {
        return false;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if rest.is_empty() {
        return map.remove(*first).is_some();
    }
    let Some(child) = map.get_mut(*first) else {
        return false;
    };
    let entfernt = remove_at(child, rest);
    if entfernt && child.as_object().is_some_and(|m| m.is_empty()) {
        map.remove(*first);
    }
    entfernt
}
