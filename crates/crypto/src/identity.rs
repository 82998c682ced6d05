//! RSA-Identitaetsschluessel
//!
//! Jeder Benutzer besitzt ein RSA-Schluessel-Paar (Standard 2048 Bit). Der
//! private Schluessel liegt ausschliesslich in der Secure Enclave, der
//! oeffentliche Schluessel wird Base64-kodiert (SPKI-DER) im Registry
//! veroeffentlicht. Damit werden Gruppenschluessel und Hybrid-Nachrichten pro
//! Empfaenger mit RSA-OAEP(SHA-256) eingewickelt.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chatvault_core::UserId;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::enclave::{EnclaveKeyKind, SecureEnclave};
use crate::error::{CryptoError, CryptoResult};
use crate::types::SecretBytes;

/// Standard-Modulus-Laenge
pub const RSA_BITS: usize = 2048;

/// RSA-Identitaet eines Benutzers
pub struct RsaIdentity {
    user_id: UserId,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl RsaIdentity {
    /// Enclave-Alias des privaten Schluessels
    pub fn alias_for(user_id: &UserId) -> String {
        format!("rsa_identity_{user_id}")
    }

    /// Laedt die Identitaet aus der Enclave, falls vorhanden
    pub fn load(enclave: &dyn SecureEnclave, user_id: &UserId) -> CryptoResult<Option<Self>> {
        let Some(der) = enclave.get(&Self::alias_for(user_id))? else {
            return Ok(None);
        };
        let private_key = RsaPrivateKey::from_pkcs8_der(der.as_bytes())
            .map_err(|e| CryptoError::Enclave(format!("Privater Schluessel unlesbar: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Some(Self {
            user_id: user_id.clone(),
            private_key,
            public_key,
        }))
    }

    /// Laedt die Identitaet oder erzeugt beim ersten Aufruf ein neues Paar
    pub fn load_or_create(
        enclave: &dyn SecureEnclave,
        user_id: &UserId,
        bits: usize,
    ) -> CryptoResult<Self> {
        if let Some(identity) = Self::load(enclave, user_id)? {
            return Ok(identity);
        }
        enclave.generate_key(&Self::alias_for(user_id), EnclaveKeyKind::Rsa { bits })?;
        tracing::info!(user_id = %user_id, bits, "RSA-Identitaet erzeugt");
        Self::load(enclave, user_id)?.ok_or_else(|| {
            CryptoError::Enclave("Schluessel nach Erzeugung nicht auffindbar".into())
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Oeffentlicher Schluessel als Base64(SPKI-DER)
    pub fn public_key_base64(&self) -> CryptoResult<String> {
        let der = self
            .public_key
            .to_public_key_der()
            .map_err(|e| CryptoError::UngueltigeDaten(e.to_string()))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// Wickelt einen mit dem eigenen oeffentlichen Schluessel
    /// eingewickelten Schluessel aus
    pub fn unwrap_key(&self, wrapped: &[u8]) -> CryptoResult<SecretBytes> {
        let raw = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| CryptoError::Entschluesselung(format!("RSA-OAEP: {e}")))?;
        Ok(SecretBytes::new(raw))
    }
}

impl std::fmt::Debug for RsaIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RsaIdentity {{ user_id: {}, private_key: [REDACTED] }}", self.user_id)
    }
}

/// Parst einen Base64(SPKI-DER)-kodierten oeffentlichen Schluessel
pub fn parse_public_key(user_id: &str, encoded: &str) -> CryptoResult<RsaPublicKey> {
    let invalid = |grund: String| CryptoError::UngueltigerOeffentlicherSchluessel {
        user_id: user_id.to_string(),
        grund,
    };
    let der = STANDARD.decode(encoded).map_err(|e| invalid(e.to_string()))?;
    RsaPublicKey::from_public_key_der(&der).map_err(|e| invalid(e.to_string()))
}

/// Wickelt rohes Schluesselmaterial fuer einen Empfaenger ein (RSA-OAEP/SHA-256)
pub fn wrap_key(public_key: &RsaPublicKey, key: &SecretBytes) -> CryptoResult<Vec<u8>> {
    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Verschluesselung(format!("RSA-OAEP: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
