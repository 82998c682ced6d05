//! Gemeinsame Identifikationstypen fuer chatvault
//!
//! Benutzer- und Gruppen-IDs stammen aus dem externen Registry-Dienst und
//! sind opake Strings. Das Newtype-Pattern schliesst Verwechslungen zwischen
//! beiden zur Compilezeit aus.

use serde::{Deserialize, Serialize};

/// Eindeutige Benutzer-ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Eindeutige Gruppen-ID (ein Chat mit gemeinsamem Gruppenschluessel)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namensraum-Schluessel im lokalen Schluesselspeicher (`group_<id>`)
    pub fn storage_key(&self) -> String {
        format!("group_{}", self.0)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_storage_key() {
        assert_eq!(GroupId::from("g1").storage_key(), "group_g1");
    }

    #[test]
    fn ids_sind_serde_transparent() {
        let uid = UserId::from("alice");
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, "\"alice\"");
        let uid2: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, uid2);
    }

    #[test]
    fn display_ohne_praefix() {
        assert_eq!(UserId::from("u2").to_string(), "u2");
        assert_eq!(GroupId::from("g1").to_string(), "g1");
    }
}
