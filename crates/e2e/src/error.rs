//! Fehlertypen der Ende-zu-Ende-Schicht

use chatvault_crypto::CryptoError;
use chatvault_keystore::KeystoreError;
use chatvault_registry::RegistryError;
use thiserror::Error;

/// Fehler der Ende-zu-Ende-Schicht
#[derive(Debug, Error)]
pub enum E2eError {
    /// Verschluesselung nicht moeglich: kein Schluessel fuer die Gruppe
    #[error("Kein Schluessel fuer Gruppe {group_id}")]
    KeinSchluessel { group_id: String },

    #[error("{user_id} ist kein Mitglied von Gruppe {group_id}")]
    KeinMitglied { group_id: String, user_id: String },

    #[error("Kein oeffentlicher Schluessel fuer {0} veroeffentlicht")]
    KeinOeffentlicherSchluessel(String),

    #[error("Gruppe {0} hat keinen Schluessel-Datensatz")]
    GruppeNichtGefunden(String),

    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Schluesselspeicher-Fehler: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Registry-Fehler: {0}")]
    Registry(#[from] RegistryError),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl E2eError {
    /// True bei Konflikt oder nicht erreichbarer Registry
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Registry(e) if e.ist_wiederholbar())
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
