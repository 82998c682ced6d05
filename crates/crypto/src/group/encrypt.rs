//! Verschluesselung von Gruppennachrichten
//!
//! Verschluesselt einen Nachrichtentext mit einer Version des
//! Gruppenschluessels und verpackt ihn in einen `cv1:`-Umschlag.

use crate::aead::seal;
use crate::error::CryptoResult;
use crate::group::envelope::GroupEnvelope;
use crate::types::GroupKey;

/// Verschluesselt `plaintext` mit dem Gruppenschluessel
pub fn encrypt_message(plaintext: &str, key: &GroupKey) -> CryptoResult<String> {
    let aad = GroupEnvelope::aad(key.version, &key.group_id);
    let sealed = seal(key.key_bytes.as_bytes(), plaintext.as_bytes(), &aad)?;
    Ok(GroupEnvelope {
        version: key.version,
        sealed,
    }
    .encode())
}
