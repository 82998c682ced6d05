//! chatvault-core – Gemeinsame Typen, Ereignisse und Konfiguration
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen chatvault-Crates gemeinsam genutzt werden.

pub mod config;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use config::{ChatvaultConfig, EncryptionPolicy, SpeicherBackend};
pub use event::KeyEvent;
pub use types::{GroupId, UserId};
