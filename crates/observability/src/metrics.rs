//! Prometheus-Metriken der Verschluesselungsschicht
//!
//! Registrierte Metriken:
//! - `chatvault_messages_encrypted_total` – Counter: Verschluesselte Gruppennachrichten
//! - `chatvault_messages_decrypted_total` – Counter: Erfolgreich entschluesselte Gruppennachrichten
//! - `chatvault_decrypt_failures_total` – Counter: Fehlgeschlagene Entschluesselungen (grund)
//! - `chatvault_plaintext_fallbacks_total` – Counter: Klartext-Fallbacks (fail-open)
//! - `chatvault_key_rotations_total` – Counter: Schluesselrotationen
//! - `chatvault_hybrid_messages_total` – Counter: Hybrid-Nachrichten (richtung)
//! - `chatvault_cached_groups` – Gauge: Gruppen im Schluessel-Cache
//! - `chatvault_key_load_duration_seconds` – Histogram: Laden eines Gruppen-Keyrings

use std::sync::Arc;

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Ursache einer fehlgeschlagenen Entschluesselung (Label `grund`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FehlerGrund {
    /// Kein Schluessel fuer die Version im Umschlag
    KeinSchluessel,
    /// Tag-Pruefung fehlgeschlagen
    Authentifizierung,
    /// Umschlag nicht dekodierbar
    Format,
}

impl FehlerGrund {
    pub fn label(self) -> &'static str {
        match self {
            Self::KeinSchluessel => "kein_schluessel",
            Self::Authentifizierung => "authentifizierung",
            Self::Format => "format",
        }
    }
}

/// Alle chatvault-Prometheus-Metriken
#[derive(Clone)]
pub struct CryptoMetrics {
    pub registry: Arc<Registry>,

    pub messages_encrypted_total: IntCounter,
    pub messages_decrypted_total: IntCounter,
    pub decrypt_failures_total: IntCounterVec,
    pub plaintext_fallbacks_total: IntCounter,
    pub key_rotations_total: IntCounter,
    pub hybrid_messages_total: IntCounterVec,
    pub cached_groups: IntGauge,
    pub key_load_duration_seconds: Histogram,
}

impl std::fmt::Debug for CryptoMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoMetrics").finish_non_exhaustive()
    }
}

impl CryptoMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let messages_encrypted_total = IntCounter::with_opts(Opts::new(
            "chatvault_messages_encrypted_total",
            "Anzahl verschluesselter Gruppennachrichten",
        ))?;
        registry.register(Box::new(messages_encrypted_total.clone()))?;

        let messages_decrypted_total = IntCounter::with_opts(Opts::new(
            "chatvault_messages_decrypted_total",
            "Anzahl erfolgreich entschluesselter Gruppennachrichten",
        ))?;
        registry.register(Box::new(messages_decrypted_total.clone()))?;

        let decrypt_failures_total = IntCounterVec::new(
            Opts::new(
                "chatvault_decrypt_failures_total",
                "Fehlgeschlagene Entschluesselungen nach Ursache",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(decrypt_failures_total.clone()))?;

        let plaintext_fallbacks_total = IntCounter::with_opts(Opts::new(
            "chatvault_plaintext_fallbacks_total",
            "Nachrichten, die mangels Schluessel im Klartext gesendet wurden",
        ))?;
        registry.register(Box::new(plaintext_fallbacks_total.clone()))?;

        let key_rotations_total = IntCounter::with_opts(Opts::new(
            "chatvault_key_rotations_total",
            "Anzahl durchgefuehrter Schluesselrotationen",
        ))?;
        registry.register(Box::new(key_rotations_total.clone()))?;

        let hybrid_messages_total = IntCounterVec::new(
            Opts::new(
                "chatvault_hybrid_messages_total",
                "Hybrid verschluesselte Nachrichten",
            ),
            &["richtung"],
        )?;
        registry.register(Box::new(hybrid_messages_total.clone()))?;

        let cached_groups = IntGauge::with_opts(Opts::new(
            "chatvault_cached_groups",
            "Gruppen mit Schluesseln im Arbeitsspeicher-Cache",
        ))?;
        registry.register(Box::new(cached_groups.clone()))?;

        let key_load_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "chatvault_key_load_duration_seconds",
                "Dauer des Ladens eines Gruppen-Keyrings in Sekunden",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(key_load_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            messages_encrypted_total,
            messages_decrypted_total,
            decrypt_failures_total,
            plaintext_fallbacks_total,
            key_rotations_total,
            hybrid_messages_total,
            cached_groups,
            key_load_duration_seconds,
        })
    }

    pub fn entschluesselung_fehlgeschlagen(&self, grund: FehlerGrund) {
        self.decrypt_failures_total
            .with_label_values(&[grund.label()])
            .inc();
    }

    pub fn entschluesselung_fehler_anzahl(&self, grund: FehlerGrund) -> u64 {
        self.decrypt_failures_total
            .with_label_values(&[grund.label()])
            .get()
    }

    /// `richtung` ist `verschluesselt` oder `entschluesselt`
    pub fn hybrid_nachricht(&self, richtung: &str) {
        self.hybrid_messages_total
            .with_label_values(&[richtung])
            .inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = CryptoMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn getrennte_instanzen_teilen_nichts() {
        let a = CryptoMetrics::neu().unwrap();
        let b = CryptoMetrics::neu().unwrap();
        a.messages_encrypted_total.inc();
        assert_eq!(a.messages_encrypted_total.get(), 1);
        assert_eq!(b.messages_encrypted_total.get(), 0);
    }

    #[test]
    fn fehler_nach_grund() {
        let metriken = CryptoMetrics::neu().unwrap();
        metriken.entschluesselung_fehlgeschlagen(FehlerGrund::KeinSchluessel);
        metriken.entschluesselung_fehlgeschlagen(FehlerGrund::KeinSchluessel);
        metriken.entschluesselung_fehlgeschlagen(FehlerGrund::Authentifizierung);

        assert_eq!(metriken.entschluesselung_fehler_anzahl(FehlerGrund::KeinSchluessel), 2);
        assert_eq!(metriken.entschluesselung_fehler_anzahl(FehlerGrund::Authentifizierung), 1);
        assert_eq!(metriken.entschluesselung_fehler_anzahl(FehlerGrund::Format), 0);
    }

    #[test]
    fn export_prometheus_format() {
        let metriken = CryptoMetrics::neu().unwrap();
        metriken.messages_encrypted_total.inc();
        metriken.cached_groups.set(3);
        metriken.hybrid_nachricht("verschluesselt");

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("chatvault_messages_encrypted_total 1"));
        assert!(output.contains("chatvault_cached_groups 3"));
        assert!(output.contains("chatvault_hybrid_messages_total{richtung=\"verschluesselt\"} 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = CryptoMetrics::neu().unwrap();

        // Vec-Metriken erscheinen in gather() erst nach dem ersten Label-Zugriff
        metriken.entschluesselung_fehlgeschlagen(FehlerGrund::Format);
        metriken.hybrid_nachricht("entschluesselt");

        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        for name in [
            "chatvault_messages_encrypted_total",
            "chatvault_messages_decrypted_total",
            "chatvault_decrypt_failures_total",
            "chatvault_plaintext_fallbacks_total",
            "chatvault_key_rotations_total",
            "chatvault_hybrid_messages_total",
            "chatvault_cached_groups",
            "chatvault_key_load_duration_seconds",
        ] {
            assert!(namen.contains(&name), "{name} fehlt");
        }
    }
}
