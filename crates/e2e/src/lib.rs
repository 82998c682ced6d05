//! # chatvault-e2e
//!
//! Ende-zu-Ende-Verschluesselung fuer Gruppenchats.
//!
//! ## Module
//! - `session` - `E2eSession`, verdrahtet alle Dienste eines Benutzers
//! - `key_manager` - `GroupKeyManager`: Anlegen, Hinzufuegen, Rotation, Laden
//! - `message_cipher` - `MessageCipher`: Gruppennachrichten ver-/entschluesseln
//! - `cache` - Schluessel-Cache mit genau einem Ladevorgang pro Miss
//! - `message` - `ChatMessage`, `DecryptedText`
//! - `error` - Fehlertypen

pub mod cache;
pub mod error;
pub mod key_manager;
pub mod message;
pub mod message_cipher;
pub mod session;

pub use cache::{CachedKeys, KeyCache};
pub use error::{E2eError, E2eResult};
pub use key_manager::GroupKeyManager;
pub use message::{ChatMessage, DecryptedChatMessage, DecryptedText};
pub use message_cipher::MessageCipher;
pub use session::E2eSession;
