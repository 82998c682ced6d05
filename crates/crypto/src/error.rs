//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Schluessel-Generierung fehlgeschlagen: {0}")]
    SchluesselGenerierung(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Entschluesselung(String),

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("Kein Schluessel fuer Gruppe {group_id} (Version {version})")]
    KeinSchluessel { group_id: String, version: u32 },

    #[error("Kein eingewickelter Schluessel fuer Empfaenger {0}")]
    KeinEmpfaengerSchluessel(String),

    #[error("Ungueltiger oeffentlicher Schluessel fuer {user_id}: {grund}")]
    UngueltigerOeffentlicherSchluessel { user_id: String, grund: String },

    #[error("Unbekannter Algorithmus: {0}")]
    UnbekannterAlgorithmus(String),

    #[error("Secure-Enclave-Fehler: {0}")]
    Enclave(String),

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),

    #[error("RSA-Fehler: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

impl CryptoError {
    /// Gibt true zurueck wenn der Fehler auf fehlendes Schluesselmaterial
    /// zurueckgeht (statt auf manipulierte oder kaputte Daten)
    pub fn ist_schluessel_fehlt(&self) -> bool {
        matches!(
            self,
            Self::KeinSchluessel { .. } | Self::KeinEmpfaengerSchluessel(_)
        )
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = CryptoError::KeinSchluessel {
            group_id: "g1".into(),
            version: 2,
        };
        assert_eq!(e.to_string(), "Kein Schluessel fuer Gruppe g1 (Version 2)");
        assert!(e.ist_schluessel_fehlt());
        assert!(!CryptoError::Entschluesselung("tag".into()).ist_schluessel_fehlt());
    }
}
