//! Secure-Enclave-Abstraktion
//!
//! Schluessel, die das Geraet nie verlassen duerfen (Master-Secret des
//! Schluesselspeichers, privater RSA-Identitaetsschluessel), werden nur ueber
//! dieses Trait erzeugt und gelesen. Plattform-Implementierungen koennen
//! Android Keystore, iOS Keychain oder ein HSM anbinden.

use dashmap::DashMap;
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;

use crate::aead::generate_key;
use crate::error::{CryptoError, CryptoResult};
use crate::types::SecretBytes;

/// Art des zu erzeugenden Schluessels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnclaveKeyKind {
    /// 256-Bit symmetrischer Schluessel
    Aes256,
    /// RSA-Schluesselpaar, privater Teil als PKCS#8-DER abgelegt
    Rsa { bits: usize },
}

/// Plattform-Schluesselspeicher
pub trait SecureEnclave: Send + Sync {
    /// Erzeugt einen neuen Schluessel unter `alias` (ersetzt einen vorhandenen)
    fn generate_key(&self, alias: &str, kind: EnclaveKeyKind) -> CryptoResult<()>;

    /// Liest den Schluessel unter `alias`
    fn get(&self, alias: &str) -> CryptoResult<Option<SecretBytes>>;

    /// Loescht den Schluessel unter `alias`; true wenn einer vorhanden war
    fn delete(&self, alias: &str) -> CryptoResult<bool>;
}

/// Software-Enclave im Arbeitsspeicher
///
/// Fuer Tests und Plattformen ohne Hardware-Keystore. Schluessel ueberleben
/// keinen Prozess-Neustart.
#[derive(Debug, Default)]
pub struct SoftwareEnclave {
    keys: DashMap<String, SecretBytes>,
}

impl SoftwareEnclave {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureEnclave for SoftwareEnclave {
    fn generate_key(&self, alias: &str, kind: EnclaveKeyKind) -> CryptoResult<()> {
        let material = match kind {
            EnclaveKeyKind::Aes256 => generate_key(),
            EnclaveKeyKind::Rsa { bits } => {
                let private_key = RsaPrivateKey::new(&mut OsRng, bits)
                    .map_err(|e| CryptoError::SchluesselGenerierung(e.to_string()))?;
                let der = private_key
                    .to_pkcs8_der()
                    .map_err(|e| CryptoError::Enclave(e.to_string()))?;
                SecretBytes::new(der.as_bytes().to_vec())
            }
        };
        self.keys.insert(alias.to_string(), material);
        tracing::debug!(alias, ?kind, "Enclave-Schluessel erzeugt");
        Ok(())
    }

    fn get(&self, alias: &str) -> CryptoResult<Option<SecretBytes>> {
        Ok(self.keys.get(alias).map(|entry| entry.value().clone()))
    }

    fn delete(&self, alias: &str) -> CryptoResult<bool> {
        Ok(self.keys.remove(alias).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KEY_LEN;

    #[test]
    fn aes_schluessel_erzeugen_und_lesen() {
        let enclave = SoftwareEnclave::new();
        assert!(enclave.get("master").unwrap().is_none());

        enclave.generate_key("master", EnclaveKeyKind::Aes256).unwrap();
        let key = enclave.get("master").unwrap().unwrap();
        assert_eq!(key.len(), KEY_LEN);
    }

    #[test]
    fn erneutes_erzeugen_ersetzt_schluessel() {
        let enclave = SoftwareEnclave::new();
        enclave.generate_key("master", EnclaveKeyKind::Aes256).unwrap();
        let alt = enclave.get("master").unwrap().unwrap();
        enclave.generate_key("master", EnclaveKeyKind::Aes256).unwrap();
        let neu = enclave.get("master").unwrap().unwrap();
        assert_ne!(alt.as_bytes(), neu.as_bytes());
    }

    #[test]
    fn loeschen() {
        let enclave = SoftwareEnclave::new();
        enclave.generate_key("x", EnclaveKeyKind::Aes256).unwrap();
        assert!(enclave.delete("x").unwrap());
        assert!(!enclave.delete("x").unwrap());
        assert!(enclave.get("x").unwrap().is_none());
    }
}
