//! AES-256-GCM Versiegelung
//!
//! Gemeinsamer Baustein fuer Schluesselspeicher, Gruppennachrichten und
//! Hybrid-Umschlaege.
//!
//! ## Format
//! ```text
//! [iv(12)] [ciphertext] [auth_tag(16)]
//! ```
//!
//! Der IV wird bei jedem Aufruf frisch aus `OsRng` gezogen. Ein Zaehler ohne
//! persistierten Zustand wuerde nach einem Neustart IVs wiederholen.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{SecretBytes, KEY_LEN, NONCE_LEN, TAG_LEN};

/// Erzeugt einen neuen zufaelligen 256-Bit-Schluessel
pub fn generate_key() -> SecretBytes {
    let mut key = vec![0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    SecretBytes::new(key)
}

/// Verschluesselt `plaintext` und gibt `iv || ciphertext || tag` zurueck
pub fn seal(key: &[u8], plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = cipher_for(key)?;

    let mut iv = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Entschluesselt `iv || ciphertext || tag`
pub fn open(key: &[u8], sealed: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::UngueltigeDaten(format!(
            "Versiegelte Daten zu kurz: {} Bytes",
            sealed.len()
        )));
    }
    let cipher = cipher_for(key)?;
    let (iv, ciphertext) = sealed.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

/// Wie [`seal`], Ergebnis Base64-kodiert
pub fn seal_base64(key: &[u8], plaintext: &[u8], aad: &[u8]) -> CryptoResult<String> {
    Ok(STANDARD.encode(seal(key, plaintext, aad)?))
}

/// Wie [`open`], Eingabe Base64-kodiert
pub fn open_base64(key: &[u8], encoded: &str, aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let sealed = STANDARD.decode(encoded)?;
    open(key, &sealed, aad)
}

fn cipher_for(key: &[u8]) -> CryptoResult<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: KEY_LEN,
            erhalten: key.len(),
        });
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
