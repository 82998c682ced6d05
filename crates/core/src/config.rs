//! chatvault-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass chatvault ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};

/// Vollstaendige Konfiguration einer chatvault-Sitzung
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatvaultConfig {
    /// Lokale Benutzer-Identitaet
    pub benutzer: BenutzerEinstellungen,
    /// Lokaler verschluesselter Schluesselspeicher
    pub schluesselspeicher: SchluesselspeicherEinstellungen,
    /// Verschluesselungs-Richtlinien
    pub verschluesselung: VerschluesselungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Lokale Benutzer-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenutzerEinstellungen {
    /// ID des lokalen Benutzers im Registry-Dienst
    pub user_id: String,
}

impl Default for BenutzerEinstellungen {
    fn default() -> Self {
        Self {
            user_id: "local-user".into(),
        }
    }
}

/// Backend des Schluesselspeichers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeicherBackend {
    /// Fluechtig im Arbeitsspeicher (Tests, Entwicklung)
    Memory,
    /// SQLite-Datei
    #[default]
    Sqlite,
}

impl std::fmt::Display for SpeicherBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Einstellungen fuer den lokalen Schluesselspeicher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchluesselspeicherEinstellungen {
    pub backend: SpeicherBackend,
    /// Verbindungs-URL (nur fuer SQLite)
    pub url: String,
    /// Maximale Verbindungspool-Groesse
    pub max_verbindungen: u32,
    /// WAL-Modus fuer SQLite
    pub sqlite_wal: bool,
}

impl Default for SchluesselspeicherEinstellungen {
    fn default() -> Self {
        Self {
            backend: SpeicherBackend::Sqlite,
            url: "sqlite://chatvault-keys.db".into(),
            max_verbindungen: 4,
            sqlite_wal: true,
        }
    }
}

/// Verhalten wenn fuer eine Gruppe kein Schluessel verfuegbar ist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionPolicy {
    /// Senden verweigern und "Verschluesselung nicht verfuegbar" melden
    #[default]
    FailClosed,
    /// Klartext unveraendert durchreichen (Verhalten aelterer Clients)
    FailOpen,
}

/// Verschluesselungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerschluesselungsEinstellungen {
    pub policy: EncryptionPolicy,
    /// Modulus-Laenge der RSA-Identitaetsschluessel
    pub rsa_bits: usize,
}

impl Default for VerschluesselungsEinstellungen {
    fn default() -> Self {
        Self {
            policy: EncryptionPolicy::FailClosed,
            rsa_bits: 2048,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ChatvaultConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Parst die Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }
}
