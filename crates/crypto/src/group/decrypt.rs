//! Entschluesselung von Gruppennachrichten
//!
//! Verifiziert dabei den Auth-Tag und die AAD (Schema + Version + Gruppe).

use crate::aead::open;
use crate::error::{CryptoError, CryptoResult};
use crate::group::envelope::{EnvelopeParse, GroupEnvelope};
use crate::types::GroupKey;

/// Entschluesselt einen geparsten Umschlag mit der passenden Schluesselversion
pub fn decrypt_message(envelope: &GroupEnvelope, key: &GroupKey) -> CryptoResult<String> {
    if envelope.version != key.version {
        return Err(CryptoError::KeinSchluessel {
            group_id: key.group_id.to_string(),
            version: envelope.version,
        });
    }
    let aad = GroupEnvelope::aad(key.version, &key.group_id);
    let plain = open(key.key_bytes.as_bytes(), &envelope.sealed, &aad)?;
    String::from_utf8(plain)
        .map_err(|e| CryptoError::UngueltigeDaten(format!("Klartext kein UTF-8: {e}")))
}

/// Entschluesselt einen Umschlag in Textform
///
/// Klartext ohne Praefix ist hier ein Fehler; die Unterscheidung
/// Klartext/Umschlag trifft der Aufrufer ueber [`GroupEnvelope::parse`].
pub fn decrypt_message_str(text: &str, key: &GroupKey) -> CryptoResult<String> {
    match GroupEnvelope::parse(text) {
        EnvelopeParse::Envelope(envelope) => decrypt_message(&envelope, key),
        EnvelopeParse::Plain => Err(CryptoError::UngueltigeDaten("Kein Umschlag".into())),
        EnvelopeParse::Malformed(grund) => Err(CryptoError::UngueltigeDaten(grund)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
