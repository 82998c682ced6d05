//! chatvault-cli – Bibliotheks-Root
//!
//! Baut aus der Konfiguration eine Sitzung fuer den lokalen Benutzer und
//! spielt einen vollstaendigen Gruppen-Lebenszyklus durch: anlegen,
//! Mitglied aufnehmen, Mitglied entfernen mit Rotation. Die Registry lebt
//! dabei im Arbeitsspeicher.
//!
//! Auch die Enclave ist eine `SoftwareEnclave` und wird pro Durchlauf neu
//! erzeugt. Mit dem SQLite-Backend landen die versiegelten Eintraege zwar auf
//! der Platte, der naechste Start hat aber ein anderes Master-Secret und kann
//! sie nicht mehr lesen. Der SQLite-Pfad zeigt also nur die Ablage; eine
//! dauerhafte Enclave muss die einbettende Anwendung mitbringen.

use std::fmt;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use chatvault_core::config::SchluesselspeicherEinstellungen;
use chatvault_core::{ChatvaultConfig, GroupId, SpeicherBackend, UserId};
use chatvault_crypto::SoftwareEnclave;
use chatvault_e2e::{DecryptedText, E2eSession};
use chatvault_keystore::{KeyValueBackend, MemoryBackend, SqliteBackend};
use chatvault_observability::CryptoMetrics;
use chatvault_registry::{KeyRegistry, MemoryRegistry};

/// Benutzer-ID des Partners im Durchlauf
pub const PARTNER_ID: &str = "demo-partner";

/// Gruppen-ID des Durchlaufs
pub const DEMO_GRUPPE: &str = "demo-gruppe";

/// Oeffnet das konfigurierte Schluesselspeicher-Backend
pub async fn backend_oeffnen(
    config: &SchluesselspeicherEinstellungen,
) -> Result<Arc<dyn KeyValueBackend>> {
    Ok(match config.backend {
        SpeicherBackend::Memory => Arc::new(MemoryBackend::new()),
        SpeicherBackend::Sqlite => Arc::new(
            SqliteBackend::oeffnen(config)
                .await
                .with_context(|| format!("Schluesselspeicher '{}' nicht zu oeffnen", config.url))?,
        ),
    })
}

/// Ergebnis des Durchlaufs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bericht {
    pub benutzer: UserId,
    pub gruppe: GroupId,
    /// Version nach dem Entfernen des Partners
    pub version: u32,
    /// Was der Partner vor seinem Entfernen lesen konnte
    pub partner_vorher: DecryptedText,
    /// Was der Partner nach der Rotation sieht
    pub partner_nachher: DecryptedText,
}

impl fmt::Display for Bericht {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Benutzer:          {}", self.benutzer)?;
        writeln!(f, "Gruppe:            {} (Version {})", self.gruppe, self.version)?;
        writeln!(f, "Partner vorher:    {:?}", self.partner_vorher)?;
        write!(f, "Partner nachher:   {:?}", self.partner_nachher)
    }
}

/// Spielt den Gruppen-Lebenszyklus mit dem lokalen Benutzer als Ersteller durch
pub async fn durchlauf_ausfuehren(
    config: &ChatvaultConfig,
    backend: Arc<dyn KeyValueBackend>,
    metrics: CryptoMetrics,
) -> Result<Bericht> {
    let registry: Arc<dyn KeyRegistry> = Arc::new(MemoryRegistry::new());

    let ich = E2eSession::new(
        UserId::from(config.benutzer.user_id.as_str()),
        Arc::new(SoftwareEnclave::new()),
        backend,
        registry.clone(),
        &config.verschluesselung,
        metrics,
    )
    .await?;
    let partner = E2eSession::new(
        UserId::from(PARTNER_ID),
        Arc::new(SoftwareEnclave::new()),
        Arc::new(MemoryBackend::new()),
        registry,
        &config.verschluesselung,
        CryptoMetrics::neu()?,
    )
    .await?;

    let gruppe = GroupId::from(DEMO_GRUPPE);
    ich.keys().create_group_with_encryption(&gruppe).await?;
    let vorher = ich.cipher().encrypt_for_group("hello", &gruppe).await?;

    ich.keys()
        .add_user_to_group_encryption(&gruppe, partner.user_id())
        .await?;
    partner.keys().await_group_key(&gruppe).await?;
    let partner_vorher = partner.cipher().decrypt_for_group(&vorher, &gruppe).await?;

    let version = ich
        .keys()
        .remove_user_and_rotate_key(&gruppe, partner.user_id())
        .await?;
    let nachher = ich.cipher().encrypt_for_group("world", &gruppe).await?;
    let partner_nachher = partner.cipher().decrypt_for_group(&nachher, &gruppe).await?;

    ensure!(
        ich.cipher().decrypt_for_group(&nachher, &gruppe).await?.is_decrypted(),
        "Ersteller kann eigene Nachricht nach Rotation nicht lesen"
    );

    tracing::info!(gruppe = %gruppe, version, "Durchlauf abgeschlossen");

    Ok(Bericht {
        benutzer: ich.user_id().clone(),
        gruppe,
        version,
        partner_vorher,
        partner_nachher,
    })
}
