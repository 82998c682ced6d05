//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `CV_LOG_LEVEL`: Log-Level oder EnvFilter-Direktive, ueberschreibt die Config
//! - `CV_LOG_FORMAT`: Format (text/json), ueberschreibt die Config

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "CV_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "CV_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor `level` / `format` aus der Config.
/// Ein ungueltiger Filter faellt auf `info` zurueck.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_aufloesen(std::env::var(ENV_LOG_FORMAT).ok(), format);

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Waehlt das Format: Umgebung vor Config, unbekannte Werte werden zu `text`
pub fn format_aufloesen(aus_env: Option<String>, konfiguriert: &str) -> String {
    let gewaehlt = aus_env.unwrap_or_else(|| konfiguriert.to_string());
    if log_format_gueltig(&gewaehlt) {
        gewaehlt
    } else {
        "text".to_string()
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
