//! SQLite-Backend mit WAL-Modus

use std::str::FromStr;

use async_trait::async_trait;
use chatvault_core::config::SchluesselspeicherEinstellungen;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::backend::KeyValueBackend;
use crate::error::KeystoreResult;

/// Persistentes Backend auf einer SQLite-Datei
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Oeffnet (oder erstellt) die Datenbank und fuehrt Migrationen aus
    pub async fn oeffnen(config: &SchluesselspeicherEinstellungen) -> KeystoreResult<Self> {
        let opts = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(if config.sqlite_wal {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            });

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_verbindungen)
            .connect_with(opts)
            .await?;

        info!(url = %config.url, wal = config.sqlite_wal, "Schluesselspeicher-Datenbank geoeffnet");

        let backend = Self { pool };
        backend.migrationen_ausfuehren().await?;
        Ok(backend)
    }

    /// In-Memory-Datenbank fuer Tests
    pub async fn in_memory() -> KeystoreResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            // In-Memory benoetigt mindestens 1 persistente Verbindung
            .min_connections(1)
            .connect_with(opts)
            .await?;

        let backend = Self { pool };
        backend.migrationen_ausfuehren().await?;
        Ok(backend)
    }

    pub async fn migrationen_ausfuehren(&self) -> KeystoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Schliesst den Pool; ausstehende Schreibvorgaenge werden abgeschlossen
    pub async fn schliessen(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    async fn load(&self, namespace: &str, key: &str) -> KeystoreResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM secure_entries WHERE namespace = ? AND entry_key = ?",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn store(&self, namespace: &str, key: &str, value: &str) -> KeystoreResult<()> {
        sqlx::query(
            "INSERT INTO secure_entries (namespace, entry_key, value, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(namespace, entry_key)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> KeystoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM secure_entries WHERE namespace = ? AND entry_key = ?")
                .bind(namespace)
                .bind(key)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, namespace: &str) -> KeystoreResult<u64> {
        let result = sqlx::query("DELETE FROM secure_entries WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn keys(&self, namespace: &str) -> KeystoreResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT entry_key FROM secure_entries WHERE namespace = ? ORDER BY entry_key",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }
}
