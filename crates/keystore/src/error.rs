//! Fehlertypen fuer den Schluesselspeicher

use chatvault_crypto::CryptoError;
use thiserror::Error;

/// Schluesselspeicher-Fehlertypen
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("SQLx-Fehler: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration-Fehler: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Interner Schluesselspeicher-Fehler: {0}")]
    Intern(String),
}

impl KeystoreError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

pub type KeystoreResult<T> = Result<T, KeystoreError>;
