//! Schluessel-Ereignisse
//!
//! Jede Zustandsaenderung eines Gruppenschluessels wird als `KeyEvent`
//! ueber einen `tokio::sync::broadcast`-Kanal verteilt. Abonnenten (z.B. die
//! Chat-Oberflaeche) entscheiden selbst, ob sie ihren Schluessel neu laden.

use serde::{Deserialize, Serialize};

use crate::types::{GroupId, UserId};

/// Alle Ereignisse im Lebenszyklus eines Gruppenschluessels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEvent {
    /// Gruppe wurde mit Schluessel Version 1 angelegt
    GroupCreated { group_id: GroupId, creator: UserId },
    /// Neues Mitglied hat einen eingewickelten Schluessel erhalten
    MemberAdded {
        group_id: GroupId,
        user_id: UserId,
        version: u32,
    },
    /// Mitglied entfernt, Schluessel rotiert
    KeyRotated {
        group_id: GroupId,
        removed: UserId,
        version: u32,
    },
    /// Schluessel wurde lokal geladen
    KeyLoaded { group_id: GroupId, version: u32 },
    /// Verschluesselung der Gruppe vollstaendig entfernt
    GroupDeleted { group_id: GroupId },
}

impl KeyEvent {
    /// Die betroffene Gruppe
    pub fn group_id(&self) -> &GroupId {
        match self {
            Self::GroupCreated { group_id, .. }
            | Self::MemberAdded { group_id, .. }
            | Self::KeyRotated { group_id, .. }
            | Self::KeyLoaded { group_id, .. }
            | Self::GroupDeleted { group_id } => group_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = KeyEvent::KeyRotated {
            group_id: GroupId::from("g1"),
            removed: UserId::from("u2"),
            version: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: KeyEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.group_id().as_str(), "g1");
    }
}
