//! Pfad-Layout der Registry
//!
//! ```text
//! groupKeys/<groupId>/members/<userId>   eingewickelter Gruppenschluessel
//! groupKeys/<groupId>/metadata           RecordMetadata
//! publicKeys/<userId>                    PublicKeyRecord
//! ```

use chatvault_core::{GroupId, UserId};

use crate::error::{RegistryError, RegistryResult};

pub const GROUP_KEYS: &str = "groupKeys";
pub const PUBLIC_KEYS: &str = "publicKeys";

/// Zeichen, die in einem Pfadsegment nicht vorkommen duerfen
const VERBOTEN: &[char] = &['/', '.', '#', '$', '[', ']'];

/// Zerlegt einen `/`-getrennten Pfad in Segmente
pub fn segments(path: &str) -> RegistryResult<Vec<&str>> {
    let segs: Vec<&str> = path.split('/').collect();
    if segs.iter().any(|s| s.is_empty()) {
        return Err(RegistryError::UngueltigerPfad(path.to_string()));
    }
    Ok(segs)
}

/// Verbindet Basis- und relativen Pfad
pub fn join(base: &str, child: &str) -> String {
    format!("{base}/{child}")
}

/// Prueft eine ID auf Verwendbarkeit als einzelnes Pfadsegment
pub fn validate_id(id: &str) -> RegistryResult<()> {
    if id.is_empty() || id.contains(VERBOTEN) {
        return Err(RegistryError::UngueltigerPfad(format!(
            "ID '{id}' ist kein gueltiges Pfadsegment"
        )));
    }
    Ok(())
}

pub fn group_record(group_id: &GroupId) -> String {
    format!("{GROUP_KEYS}/{group_id}")
}

pub fn members(group_id: &GroupId) -> String {
    format!("{GROUP_KEYS}/{group_id}/members")
}

pub fn member(group_id: &GroupId, user_id: &UserId) -> String {
    format!("{GROUP_KEYS}/{group_id}/members/{user_id}")
}

pub fn metadata(group_id: &GroupId) -> String {
    format!("{GROUP_KEYS}/{group_id}/metadata")
}

pub fn metadata_version(group_id: &GroupId) -> String {
    format!("{GROUP_KEYS}/{group_id}/metadata/version")
}

pub fn public_key(user_id: &UserId) -> String {
    format!("{PUBLIC_KEYS}/{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let g = GroupId::from("g1");
        let u = UserId::from("u2");
        assert_eq!(member(&g, &u), "groupKeys/g1/members/u2");
        assert_eq!(metadata_version(&g), "groupKeys/g1/metadata/version");
        assert_eq!(public_key(&u), "publicKeys/u2");
    }

    #[test]
    fn leere_segmente_sind_ungueltig() {
        assert!(segments("a/b").is_ok());
        assert!(segments("").is_err());
        assert!(segments("a//b").is_err());
        assert!(segments("/a").is_err());
    }

    #[test]
    fn ids_ohne_sonderzeichen() {
        assert!(validate_id("user-42").is_ok());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a.b").is_err());
        assert!(validate_id("").is_err());
    }
}
