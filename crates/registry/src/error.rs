//! Fehlertypen fuer die Schluessel-Registry

use thiserror::Error;

/// Registry-Fehlertypen
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry nicht erreichbar: {0}")]
    NichtErreichbar(String),

    #[error("Konflikt bei {pfad}: erwartet {erwartet}, gefunden {gefunden}")]
    Konflikt {
        pfad: String,
        erwartet: String,
        gefunden: String,
    },

    #[error("Ungueltiger Pfad: {0}")]
    UngueltigerPfad(String),

    #[error("Ungueltige Daten unter {pfad}: {grund}")]
    UngueltigeDaten { pfad: String, grund: String },

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Gibt true zurueck wenn ein erneuter Versuch Erfolg haben kann
    ///
    /// Bei `Konflikt` muss der Aufrufer vorher den aktuellen Stand neu lesen.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::NichtErreichbar(_) | Self::Konflikt { .. })
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
