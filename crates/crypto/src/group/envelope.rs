//! Versionierter Nachrichten-Umschlag fuer Gruppennachrichten
//!
//! ## Format
//! ```text
//! "cv1:" base64( [scheme(1)] [version(4)] [iv(12)] [ciphertext] [auth_tag(16)] )
//! ```
//!
//! Das Textpraefix macht die Erkennung deterministisch: Ohne `cv1:` ist ein
//! Text Klartext, mit `cv1:` muss er ein gueltiger Umschlag sein.
//!
//! ## AAD
//! ```text
//! [scheme(1)] [version(4)] [group_id]
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chatvault_core::GroupId;

use crate::types::{NONCE_LEN, TAG_LEN};

/// Textpraefix jedes verschluesselten Nachrichtentexts
pub const ENVELOPE_PREFIX: &str = "cv1:";

/// Schema-Byte: AES-256-GCM mit Gruppenschluessel
pub const SCHEME_GROUP_AES_GCM: u8 = 0x01;

const HEADER_LEN: usize = 1 + 4;

/// Geparster Umschlag einer Gruppennachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEnvelope {
    /// Schluesselversion, mit der verschluesselt wurde
    pub version: u32,
    /// `iv || ciphertext || tag`
    pub sealed: Vec<u8>,
}

/// Ergebnis der Umschlag-Erkennung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeParse {
    /// Kein `cv1:`-Praefix: Klartext
    Plain,
    Envelope(GroupEnvelope),
    /// Praefix vorhanden, Inhalt aber kaputt
    Malformed(String),
}

impl GroupEnvelope {
    /// Serialisiert zum Texttransportformat
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(HEADER_LEN + self.sealed.len());
        raw.push(SCHEME_GROUP_AES_GCM);
        raw.extend_from_slice(&self.version.to_be_bytes());
        raw.extend_from_slice(&self.sealed);
        format!("{ENVELOPE_PREFIX}{}", STANDARD.encode(raw))
    }

    /// Erkennt und parst einen Umschlag
    pub fn parse(text: &str) -> EnvelopeParse {
        let Some(encoded) = text.strip_prefix(ENVELOPE_PREFIX) else {
            return EnvelopeParse::Plain;
        };
        let raw = match STANDARD.decode(encoded) {
            Ok(raw) => raw,
            Err(e) => return EnvelopeParse::Malformed(format!("Base64: {e}")),
        };
        if raw.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return EnvelopeParse::Malformed(format!("Umschlag zu kurz: {} Bytes", raw.len()));
        }
        if raw[0] != SCHEME_GROUP_AES_GCM {
            return EnvelopeParse::Malformed(format!("Unbekanntes Schema 0x{:02x}", raw[0]));
        }
        let version = u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]);
        EnvelopeParse::Envelope(Self {
            version,
            sealed: raw[HEADER_LEN..].to_vec(),
        })
    }

    /// Authenticated Additional Data fuer diese Gruppe
    pub fn aad(version: u32, group_id: &GroupId) -> Vec<u8> {
        let mut aad = Vec::with_capacity(HEADER_LEN + group_id.as_str().len());
        aad.push(SCHEME_GROUP_AES_GCM);
        aad.extend_from_slice(&version.to_be_bytes());
        aad.extend_from_slice(group_id.as_str().as_bytes());
        aad
    }
}

/// true wenn der Text das Umschlag-Praefix traegt
pub fn is_envelope(text: &str) -> bool {
    text.starts_with(ENVELOPE_PREFIX)
}
