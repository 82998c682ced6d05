//! Hybrid-Verschluesselung (RSA-OAEP + AES-256-GCM)
//!
//! Fuer Nachrichten an eine explizite Empfaengerliste ohne vorab verteilten
//! Gruppenschluessel:
//! 1. Frischer AES-256-Schluessel K und frischer IV pro Nachricht
//! 2. AES-GCM(plaintext) mit K
//! 3. K pro Empfaenger mit dessen oeffentlichem RSA-Schluessel einwickeln
//!
//! Jeder Empfaenger-Eintrag ist unabhaengig eingewickelt; ein kompromittierter
//! privater Schluessel legt nur die an diesen Empfaenger adressierten
//! Nachrichten offen.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chatvault_core::UserId;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::aead::{generate_key, open_base64, seal_base64};
use crate::error::{CryptoError, CryptoResult};
use crate::identity::{parse_public_key, wrap_key, RsaIdentity};
use crate::types::KEY_LEN;

/// Algorithmus-Kennung im Umschlag
pub const HYBRID_ALGORITHM: &str = "hybrid-rsa-aes";

/// Hybrid-Umschlag (Wire-Format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridEnvelope {
    /// Base64(iv || ciphertext || tag)
    pub encrypted_message: String,
    pub algorithm: String,
    /// Unix-Zeit in Millisekunden
    pub timestamp: i64,
    /// Empfaenger -> Base64(RSA-OAEP(K))
    pub keys: BTreeMap<UserId, String>,
}

impl HybridEnvelope {
    pub fn to_json(&self) -> CryptoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Hybrid-Cipher eines Benutzers
#[derive(Debug, Clone)]
pub struct HybridCipher {
    identity: Arc<RsaIdentity>,
}

impl HybridCipher {
    pub fn new(identity: Arc<RsaIdentity>) -> Self {
        Self { identity }
    }

    /// Eigener oeffentlicher Schluessel (Base64)
    pub fn get_public_key(&self) -> CryptoResult<String> {
        self.identity.public_key_base64()
    }

    /// Verschluesselt `plaintext` fuer alle Empfaenger
    ///
    /// `recipients` bildet Benutzer auf ihren Base64-kodierten oeffentlichen
    /// Schluessel ab. Ein unlesbarer Schluessel bricht den ganzen Vorgang ab.
    pub fn encrypt_for_recipients(
        &self,
        plaintext: &str,
        recipients: &BTreeMap<UserId, String>,
    ) -> CryptoResult<HybridEnvelope> {
        if recipients.is_empty() {
            return Err(CryptoError::UngueltigeDaten("Keine Empfaenger angegeben".into()));
        }

        let message_key = generate_key();
        let encrypted_message = seal_base64(message_key.as_bytes(), plaintext.as_bytes(), b"")?;

        let mut keys = BTreeMap::new();
        for (user_id, encoded_key) in recipients {
            let public_key = parse_public_key(user_id.as_str(), encoded_key)?;
            let wrapped = wrap_key(&public_key, &message_key)?;
            keys.insert(user_id.clone(), STANDARD.encode(wrapped));
        }

        tracing::debug!(
            sender = %self.identity.user_id(),
            empfaenger = keys.len(),
            "Hybrid-Nachricht verschluesselt"
        );

        Ok(HybridEnvelope {
            encrypted_message,
            algorithm: HYBRID_ALGORITHM.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            keys,
        })
    }

    /// Entschluesselt einen an diesen Benutzer adressierten Umschlag
    pub fn decrypt(&self, envelope: &HybridEnvelope) -> CryptoResult<String> {
        if envelope.algorithm != HYBRID_ALGORITHM {
            return Err(CryptoError::UnbekannterAlgorithmus(envelope.algorithm.clone()));
        }
        let me = self.identity.user_id();
        let wrapped = envelope
            .keys
            .get(me)
            .ok_or_else(|| CryptoError::KeinEmpfaengerSchluessel(me.to_string()))?;

        let message_key = self.identity.unwrap_key(&STANDARD.decode(wrapped)?)?;
        if message_key.len() != KEY_LEN {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: KEY_LEN,
                erhalten: message_key.len(),
            });
        }

        let plain = open_base64(message_key.as_bytes(), &envelope.encrypted_message, b"")?;
        String::from_utf8(plain)
            .map_err(|e| CryptoError::UngueltigeDaten(format!("Klartext kein UTF-8: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::SoftwareEnclave;
    use crate::identity::RSA_BITS;

    fn cipher(enclave: &SoftwareEnclave, user: &str) -> HybridCipher {
        let identity = RsaIdentity::load_or_create(enclave, &UserId::from(user), RSA_BITS).unwrap();
        HybridCipher::new(Arc::new(identity))
    }

    fn empfaenger(ciphers: &[(&str, &HybridCipher)]) -> BTreeMap<UserId, String> {
        ciphers
            .iter()
            .map(|(user, c)| (UserId::from(*user), c.get_public_key().unwrap()))
            .collect()
    }

    #[test]
    fn alle_empfaenger_koennen_entschluesseln() {
        let enclave = SoftwareEnclave::new();
        let alice = cipher(&enclave, "alice");
        let bob = cipher(&enclave, "bob");

        let env = alice
            .encrypt_for_recipients("Treffen um 8", &empfaenger(&[("alice", &alice), ("bob", &bob)]))
            .unwrap();

        assert_eq!(env.algorithm, HYBRID_ALGORITHM);
        assert_eq!(env.keys.len(), 2);
        assert_eq!(alice.decrypt(&env).unwrap(), "Treffen um 8");
        assert_eq!(bob.decrypt(&env).unwrap(), "Treffen um 8");
    }

    #[test]
    fn nicht_adressierter_benutzer_schlaegt_explizit_fehl() {
        let enclave = SoftwareEnclave::new();
        let alice = cipher(&enclave, "alice");
        let carol = cipher(&enclave, "carol");

        let env = alice
            .encrypt_for_recipients("nur fuer alice", &empfaenger(&[("alice", &alice)]))
            .unwrap();
        assert!(matches!(
            carol.decrypt(&env),
            Err(CryptoError::KeinEmpfaengerSchluessel(ref u)) if u == "carol"
        ));
    }

    #[test]
    fn kaputter_eintrag_von_b_stoert_a_nicht() {
        let enclave = SoftwareEnclave::new();
        let a = cipher(&enclave, "a");
        let b = cipher(&enclave, "b");
        let mut env = a
            .encrypt_for_recipients("isoliert", &empfaenger(&[("a", &a), ("b", &b)]))
            .unwrap();

        env.keys.insert(UserId::from("b"), "AAAA".into());
        assert_eq!(a.decrypt(&env).unwrap(), "isoliert");
        assert!(b.decrypt(&env).is_err());

        env.keys.remove(&UserId::from("b"));
        assert_eq!(a.decrypt(&env).unwrap(), "isoliert");
    }

    #[test]
    fn b_kann_eintrag_von_a_nicht_nutzen() {
        let enclave = SoftwareEnclave::new();
        let a = cipher(&enclave, "a");
        let b = cipher(&enclave, "b");
        let mut env = a
            .encrypt_for_recipients("isoliert", &empfaenger(&[("a", &a), ("b", &b)]))
            .unwrap();

        let eintrag_a = env.keys[&UserId::from("a")].clone();
        env.keys.insert(UserId::from("b"), eintrag_a);
        assert!(matches!(b.decrypt(&env), Err(CryptoError::Entschluesselung(_))));
    }

    #[test]
    fn manipulierter_ciphertext_schlaegt_fehl() {
        let enclave = SoftwareEnclave::new();
        let a = cipher(&enclave, "a");
        let mut env = a
            .encrypt_for_recipients("original", &empfaenger(&[("a", &a)]))
            .unwrap();

        let mut raw = STANDARD.decode(&env.encrypted_message).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        env.encrypted_message = STANDARD.encode(raw);
        assert!(a.decrypt(&env).is_err());
    }

    #[test]
    fn unbekannter_algorithmus() {
        let enclave = SoftwareEnclave::new();
        let a = cipher(&enclave, "a");
        let mut env = a
            .encrypt_for_recipients("x", &empfaenger(&[("a", &a)]))
            .unwrap();
        env.algorithm = "rot13".into();
        assert!(matches!(a.decrypt(&env), Err(CryptoError::UnbekannterAlgorithmus(_))));
    }

    #[test]
    fn ungueltiger_empfaengerschluessel_bricht_ab() {
        let enclave = SoftwareEnclave::new();
        let a = cipher(&enclave, "a");
        let mut recipients = empfaenger(&[("a", &a)]);
        recipients.insert(UserId::from("kaputt"), "kein-schluessel".into());
        assert!(matches!(
            a.encrypt_for_recipients("x", &recipients),
            Err(CryptoError::UngueltigerOeffentlicherSchluessel { .. })
        ));
    }

    #[test]
    fn keine_empfaenger() {
        let enclave = SoftwareEnclave::new();
        let a = cipher(&enclave, "a");
        assert!(a.encrypt_for_recipients("x", &BTreeMap::new()).is_err());
    }

    #[test]
    fn json_format() {
        let enclave = SoftwareEnclave::new();
        let a = cipher(&enclave, "a");
        let env = a
            .encrypt_for_recipients("json", &empfaenger(&[("a", &a)]))
            .unwrap();

        let json = env.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["algorithm"], "hybrid-rsa-aes");
        assert!(value["encryptedMessage"].is_string());
        assert!(value["timestamp"].is_i64());
        assert!(value["keys"]["a"].is_string());

        let decoded = HybridEnvelope::from_json(&json).unwrap();
        assert_eq!(a.decrypt(&decoded).unwrap(), "json");
    }
}
