//! chatvault – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und fuehrt den
//! Gruppen-Durchlauf mit einem Partner-Benutzer vor.

use anyhow::Result;
use chatvault_cli::{backend_oeffnen, durchlauf_ausfuehren};
use chatvault_core::ChatvaultConfig;
use chatvault_observability::{logging_initialisieren, CryptoMetrics};

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = std::env::var("CHATVAULT_CONFIG").unwrap_or_else(|_| "chatvault.toml".into());
    let config = ChatvaultConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        user_id = %config.benutzer.user_id,
        backend = %config.schluesselspeicher.backend,
        "chatvault wird initialisiert"
    );

    let backend = backend_oeffnen(&config.schluesselspeicher).await?;
    let metrics = CryptoMetrics::neu()?;
    let bericht = durchlauf_ausfuehren(&config, backend, metrics.clone()).await?;

    println!("{bericht}");
    println!("{}", metrics.exportieren()?);
    Ok(())
}
