//! Ver- und Entschluesselung von Gruppennachrichten
//!
//! Verschluesseln nutzt immer die aktuelle Schluesselversion der Gruppe.
//! Entschluesseln waehlt die Version aus dem Umschlag-Header, damit Nachrichten
//! aus der Zeit vor einer Rotation lesbar bleiben.
//!
//! Mit `mit_nachladen` holt der Cipher fehlende Schluessel einmal aus der
//! Registry: beim Verschluesseln ohne lokalen Schluessel, beim Entschluesseln
//! wenn der Umschlag eine neuere Version traegt als lokal bekannt.

use std::sync::Arc;

use chatvault_core::{EncryptionPolicy, GroupId};
use chatvault_crypto::group::{decrypt_message, encrypt_message};
use chatvault_crypto::{CryptoError, EnvelopeParse, GroupEnvelope};
use chatvault_keystore::SecureKeyStore;
use chatvault_observability::{CryptoMetrics, FehlerGrund};
use tracing::{debug, warn};

use crate::cache::KeyCache;
use crate::error::{E2eError, E2eResult};
use crate::key_manager::GroupKeyManager;
use crate::message::{ChatMessage, DecryptedChatMessage, DecryptedText};

/// Nachrichten-Cipher eines Benutzers
#[derive(Clone)]
pub struct MessageCipher {
    store: Arc<SecureKeyStore>,
    cache: Arc<KeyCache>,
    policy: EncryptionPolicy,
    metrics: CryptoMetrics,
    nachladen: Option<GroupKeyManager>,
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCipher")
            .field("user_id", self.store.user_id())
            .field("policy", &self.policy)
            .field("nachladen", &self.nachladen.is_some())
            .finish_non_exhaustive()
    }
}

impl MessageCipher {
    pub fn new(
        store: Arc<SecureKeyStore>,
        cache: Arc<KeyCache>,
        policy: EncryptionPolicy,
        metrics: CryptoMetrics,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
            metrics,
            nachladen: None,
        }
    }

    /// Fehlende Schluessel ueber `keys` aus der Registry nachladen
    pub fn mit_nachladen(mut self, keys: GroupKeyManager) -> Self {
        self.nachladen = Some(keys);
        self
    }

    pub fn policy(&self) -> EncryptionPolicy {
        self.policy
    }

    /// Verschluesselt `plaintext` mit dem aktuellen Gruppenschluessel
    ///
    /// Ohne Schluessel, auch nach dem Nachladen: `KeinSchluessel`
    /// (fail-closed) oder unveraenderter Klartext (fail-open).
    pub async fn encrypt_for_group(&self, plaintext: &str, group_id: &GroupId) -> E2eResult<String> {
        let mut keys = self.cache.get_or_load(group_id, &self.store).await?;
        if keys.is_none() && self.nachladen_fuer_senden(group_id).await? {
            keys = self.cache.get_or_load(group_id, &self.store).await?;
        }

        let Some(key) = keys.as_deref().and_then(|k| k.current()) else {
            return match self.policy {
                EncryptionPolicy::FailClosed => {
                    debug!(group_id = %group_id, "Verschluesselung nicht moeglich, kein Schluessel");
                    Err(E2eError::KeinSchluessel {
                        group_id: group_id.to_string(),
                    })
                }
                EncryptionPolicy::FailOpen => {
                    warn!(
                        group_id = %group_id,
                        "Kein Gruppenschluessel, Nachricht wird im Klartext gesendet"
                    );
                    self.metrics.plaintext_fallbacks_total.inc();
                    Ok(plaintext.to_string())
                }
            };
        };

        let ciphertext = encrypt_message(plaintext, key)?;
        self.metrics.messages_encrypted_total.inc();
        Ok(ciphertext)
    }

    /// Entschluesselt einen empfangenen Text
    ///
    /// Fehler gibt es nur bei I/O-Problemen des Schluesselspeichers; alles
    /// andere, auch ein gescheitertes Nachladen, wird im `DecryptedText`
    /// ausgedrueckt.
    pub async fn decrypt_for_group(&self, text: &str, group_id: &GroupId) -> E2eResult<DecryptedText> {
        let envelope = match GroupEnvelope::parse(text) {
            EnvelopeParse::Plain => return Ok(DecryptedText::Unencrypted(text.to_string())),
            EnvelopeParse::Malformed(grund) => {
                warn!(group_id = %group_id, grund = %grund, "Umschlag nicht lesbar");
                self.metrics.entschluesselung_fehlgeschlagen(FehlerGrund::Format);
                return Ok(DecryptedText::Undecryptable(text.to_string()));
            }
            EnvelopeParse::Envelope(envelope) => envelope,
        };

        let mut keys = self.cache.get_or_load(group_id, &self.store).await?;
        let neuer_als_lokal = keys
            .as_deref()
            .map_or(true, |k| envelope.version > k.current_version());
        if neuer_als_lokal && self.nachladen_fuer_empfang(group_id, envelope.version).await {
            keys = self.cache.get_or_load(group_id, &self.store).await?;
        }

        let Some(key) = keys.as_deref().and_then(|k| k.get(envelope.version)) else {
            debug!(
                group_id = %group_id,
                version = envelope.version,
                "Kein Schluessel fuer Umschlag-Version"
            );
            self.metrics.entschluesselung_fehlgeschlagen(FehlerGrund::KeinSchluessel);
            return Ok(DecryptedText::Undecryptable(text.to_string()));
        };

        match decrypt_message(&envelope, key) {
            Ok(plaintext) => {
                self.metrics.messages_decrypted_total.inc();
                Ok(DecryptedText::Decrypted(plaintext))
            }
            Err(e) => {
                let grund = match e {
                    CryptoError::UngueltigeDaten(_) => FehlerGrund::Format,
                    _ => FehlerGrund::Authentifizierung,
                };
                warn!(
                    group_id = %group_id,
                    version = envelope.version,
                    fehler = %e,
                    "Nachricht nicht entschluesselbar"
                );
                self.metrics.entschluesselung_fehlgeschlagen(grund);
                Ok(DecryptedText::Undecryptable(text.to_string()))
            }
        }
    }

    /// True wenn ein eigener Eintrag geladen wurde
    ///
    /// Kein Eintrag ist kein Fehler, dann entscheidet die Policy. Andere
    /// Fehler (z.B. Registry nicht erreichbar) gehen an den Aufrufer.
    async fn nachladen_fuer_senden(&self, group_id: &GroupId) -> E2eResult<bool> {
        let Some(keys) = &self.nachladen else {
            return Ok(false);
        };
        match keys.load_group_key(group_id).await {
            Ok(_) => Ok(true),
            Err(E2eError::KeinSchluessel { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Wie `nachladen_fuer_senden`, aber jeder Fehler endet als `Undecryptable`
    async fn nachladen_fuer_empfang(&self, group_id: &GroupId, version: u32) -> bool {
        let Some(keys) = &self.nachladen else {
            return false;
        };
        match keys.load_group_key(group_id).await {
            Ok(_) => true,
            Err(e) => {
                debug!(group_id = %group_id, version, fehler = %e, "Nachladen fuer Umschlag fehlgeschlagen");
                false
            }
        }
    }

    /// Verschluesselt den Inhalt einer ausgehenden Nachricht
    pub async fn encrypt_chat_message(&self, mut message: ChatMessage) -> E2eResult<ChatMessage> {
        message.body = self.encrypt_for_group(&message.body, &message.group_id).await?;
        Ok(message)
    }

    /// Entschluesselt den Inhalt einer empfangenen Nachricht
    pub async fn decrypt_chat_message(&self, message: ChatMessage) -> E2eResult<DecryptedChatMessage> {
        let body = self.decrypt_for_group(&message.body, &message.group_id).await?;
        Ok(DecryptedChatMessage {
            id: message.id,
            group_id: message.group_id,
            sender_id: message.sender_id,
            body,
            timestamp: message.timestamp,
        })
    }
}
