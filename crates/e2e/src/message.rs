//! Nachrichten-Typen an der Zustell-Schnittstelle

use chatvault_core::{GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eine Gruppennachricht wie sie zugestellt wird
///
/// Nur `body` wird ver- bzw. entschluesselt; Absender, Zeitstempel und
/// Routing-Felder bleiben im Klartext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(group_id: GroupId, sender_id: UserId, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            sender_id,
            body: body.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ergebnis einer Entschluesselung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptedText {
    /// Umschlag gefunden und geoeffnet
    Decrypted(String),
    /// Kein Umschlag: Klartext- oder Alt-Nachricht, unveraendert
    Unencrypted(String),
    /// Umschlag vorhanden, aber nicht zu oeffnen; enthaelt den Originaltext
    Undecryptable(String),
}

impl DecryptedText {
    /// Anzeigetext: Klartext, sonst der unveraenderte Originaltext
    pub fn into_display_text(self) -> String {
        match self {
            Self::Decrypted(text) | Self::Unencrypted(text) | Self::Undecryptable(text) => text,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Decrypted(text) | Self::Unencrypted(text) | Self::Undecryptable(text) => text,
        }
    }

    pub fn is_decrypted(&self) -> bool {
        matches!(self, Self::Decrypted(_))
    }

    pub fn is_undecryptable(&self) -> bool {
        matches!(self, Self::Undecryptable(_))
    }
}

/// Empfangene Nachricht mit Entschluesselungsstatus des Inhalts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedChatMessage {
    pub id: Uuid,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub body: DecryptedText,
    pub timestamp: DateTime<Utc>,
}

impl DecryptedChatMessage {
    /// Zurueck zur Zustellform mit dem Anzeigetext als Inhalt
    pub fn into_chat_message(self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            group_id: self.group_id,
            sender_id: self.sender_id,
            body: self.body.into_display_text(),
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anzeigetext() {
        assert_eq!(DecryptedText::Decrypted("a".into()).into_display_text(), "a");
        assert_eq!(DecryptedText::Unencrypted("b".into()).into_display_text(), "b");
        assert_eq!(DecryptedText::Undecryptable("cv1:xx".into()).into_display_text(), "cv1:xx");
        assert!(DecryptedText::Undecryptable("x".into()).is_undecryptable());
        assert!(!DecryptedText::Unencrypted("x".into()).is_decrypted());
    }

    #[test]
    fn json_feldnamen() {
        let msg = ChatMessage::new(GroupId::from("g1"), UserId::from("alice"), "hallo");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["groupId"], "g1");
        assert_eq!(value["senderId"], "alice");
        assert_eq!(value["body"], "hallo");
        assert!(value["id"].is_string());
        assert!(value["timestamp"].is_string());
    }
}
