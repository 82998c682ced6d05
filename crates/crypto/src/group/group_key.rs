//! Gruppen-Schluessel pro Gruppe
//!
//! Jede Gruppe hat einen symmetrischen AES-256-GCM-Schluessel. Beim Entfernen
//! eines Mitglieds wird der Schluessel rotiert (neue Version).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chatvault_core::{GroupId, UserId};
use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;

use crate::aead::generate_key;
use crate::error::{CryptoError, CryptoResult};
use crate::identity::{wrap_key, RsaIdentity};
use crate::types::{GroupKey, KEY_LEN};

/// Erstellt einen neuen Gruppen-Schluessel
pub fn create_group_key(group_id: &GroupId, version: u32, creator: &UserId) -> GroupKey {
    GroupKey {
        group_id: group_id.clone(),
        version,
        key_bytes: generate_key(),
        creator: creator.clone(),
        created_at: Utc::now(),
    }
}

/// Version nach einer Rotation; `u32::MAX` hat keine Nachfolgerin
pub fn next_version(version: u32) -> CryptoResult<u32> {
    version
        .checked_add(1)
        .ok_or_else(|| CryptoError::UngueltigeDaten(format!("Schluesselversion {version} erschoepft")))
}

/// Rotiert einen Gruppen-Schluessel (neues Material, Version + 1)
pub fn rotate_group_key(current: &GroupKey, rotated_by: &UserId) -> CryptoResult<GroupKey> {
    Ok(create_group_key(
        &current.group_id,
        next_version(current.version)?,
        rotated_by,
    ))
}

/// Wickelt den Gruppenschluessel fuer ein Mitglied ein (Base64)
pub fn wrap_key_for_member(key: &GroupKey, member_public_key: &RsaPublicKey) -> CryptoResult<String> {
    let wrapped = wrap_key(member_public_key, &key.key_bytes)?;
    Ok(STANDARD.encode(wrapped))
}

/// Metadaten eines eingewickelten Schluessels aus dem Registry
#[derive(Debug, Clone)]
pub struct WrappedKeyInfo<'a> {
    pub group_id: &'a GroupId,
    pub version: u32,
    pub creator: &'a UserId,
    pub created_at: DateTime<Utc>,
}

/// Wickelt einen Base64-kodierten Mitglieds-Eintrag mit der eigenen
/// Identitaet aus
pub fn unwrap_key_for_member(
    identity: &RsaIdentity,
    wrapped: &str,
    info: WrappedKeyInfo<'_>,
) -> CryptoResult<GroupKey> {
    let raw = STANDARD.decode(wrapped)?;
    let key_bytes = identity.unwrap_key(&raw)?;
    if key_bytes.len() != KEY_LEN {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: KEY_LEN,
            erhalten: key_bytes.len(),
        });
    }
    Ok(GroupKey {
        group_id: info.group_id.clone(),
        version: info.version,
        key_bytes,
        creator: info.creator.clone(),
        created_at: info.created_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::SoftwareEnclave;
    use crate::identity::RSA_BITS;

    fn info<'a>(group: &'a GroupId, creator: &'a UserId, version: u32) -> WrappedKeyInfo<'a> {
        WrappedKeyInfo {
            group_id: group,
            version,
            creator,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn group_key_erstellen() {
        let key = create_group_key(&GroupId::from("g1"), 1, &UserId::from("alice"));
        assert_eq!(key.key_bytes.len(), 32);
        assert_eq!(key.version, 1);
        assert_eq!(key.group_id.as_str(), "g1");
        assert_eq!(key.creator.as_str(), "alice");
    }

    #[test]
    fn group_key_rotation_erhoeht_version() {
        let key1 = create_group_key(&GroupId::from("g1"), 1, &UserId::from("alice"));
        let key2 = rotate_group_key(&key1, &UserId::from("bob")).unwrap();

        assert_eq!(key2.version, 2);
        assert_eq!(key2.creator.as_str(), "bob");
        // Neuer Schluessel muss verschieden sein
        assert_ne!(key1.key_bytes.as_bytes(), key2.key_bytes.as_bytes());
    }

    #[test]
    fn letzte_version_hat_keine_nachfolgerin() {
        assert_eq!(next_version(41).unwrap(), 42);
        assert!(matches!(
            next_version(u32::MAX),
            Err(CryptoError::UngueltigeDaten(_))
        ));

        let key = create_group_key(&GroupId::from("g1"), u32::MAX, &UserId::from("alice"));
        assert!(rotate_group_key(&key, &UserId::from("bob")).is_err());
    }

    #[test]
    fn group_key_wrap_und_unwrap_roundtrip() {
        let enclave = SoftwareEnclave::new();
        let bob = UserId::from("bob");
        let identity = RsaIdentity::load_or_create(&enclave, &bob, RSA_BITS).unwrap();

        let group = GroupId::from("g1");
        let alice = UserId::from("alice");
        let original = create_group_key(&group, 4, &alice);

        let wrapped = wrap_key_for_member(&original, identity.public_key()).unwrap();
        let unwrapped = unwrap_key_for_member(&identity, &wrapped, info(&group, &alice, 4)).unwrap();

        assert_eq!(unwrapped.key_bytes.as_bytes(), original.key_bytes.as_bytes());
        assert_eq!(unwrapped.version, 4);
    }

    #[test]
    fn jedes_mitglied_erhaelt_anderen_eintrag() {
        let enclave = SoftwareEnclave::new();
        let a = RsaIdentity::load_or_create(&enclave, &UserId::from("a"), RSA_BITS).unwrap();
        let b = RsaIdentity::load_or_create(&enclave, &UserId::from("b"), RSA_BITS).unwrap();
        let key = create_group_key(&GroupId::from("g"), 1, &UserId::from("a"));

        let wa = wrap_key_for_member(&key, a.public_key()).unwrap();
        let wb = wrap_key_for_member(&key, b.public_key()).unwrap();
        assert_ne!(wa, wb);
        // b kann den Eintrag von a nicht verwenden
        let group = GroupId::from("g");
        let creator = UserId::from("a");
        assert!(unwrap_key_for_member(&b, &wa, info(&group, &creator, 1)).is_err());
    }

    #[test]
    fn kaputter_eintrag_schlaegt_fehl() {
        let enclave = SoftwareEnclave::new();
        let identity =
            RsaIdentity::load_or_create(&enclave, &UserId::from("bob"), RSA_BITS).unwrap();
        let group = GroupId::from("g");
        let creator = UserId::from("a");
        let result = unwrap_key_for_member(&identity, "AAAA", info(&group, &creator, 1));
        assert!(result.is_err());
    }
}
