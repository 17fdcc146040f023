use crate::engine::{BackupSummary, RestoreReport};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct BackupMetrics {
    pub devices_completed: IntCounter,
    pub devices_aborted: IntCounter,
    pub params_read: IntCounter,
    pub params_defaulted: IntCounter,
    pub params_unavailable: IntCounter,
    pub writes_accepted: IntCounter,
    pub writes_rejected: IntCounter,
    pub families_loaded: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub dev: BackupMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let dev = BackupMetrics {
            devices_completed: counter("dbk_devices_completed", "Device sessions completed")?,
            devices_aborted: counter("dbk_devices_aborted", "Device sessions aborted")?,
            params_read: counter("dbk_params_read", "Parameters read and decoded")?,
            params_defaulted: counter(
                "dbk_params_defaulted",
                "Parameters recorded with their catalog default",
            )?,
            params_unavailable: counter(
                "dbk_params_unavailable",
                "Parameters recorded as unavailable",
            )?,
            writes_accepted: counter("dbk_writes_accepted", "Restore writes accepted")?,
            writes_rejected: counter("dbk_writes_rejected", "Restore writes rejected")?,
            families_loaded: IntGauge::new("dbk_families_loaded", "Registered device families")
                .map_err(|e| format!("metrics init error: {e}"))?,
        };
        let _ = registry.register(Box::new(dev.devices_completed.clone()));
        let _ = registry.register(Box::new(dev.devices_aborted.clone()));
        let _ = registry.register(Box::new(dev.params_read.clone()));
        let _ = registry.register(Box::new(dev.params_defaulted.clone()));
        let _ = registry.register(Box::new(dev.params_unavailable.clone()));
        let _ = registry.register(Box::new(dev.writes_accepted.clone()));
        let _ = registry.register(Box::new(dev.writes_rejected.clone()));
        let _ = registry.register(Box::new(dev.families_loaded.clone()));
        Ok(Self { registry, dev })
    }

    pub fn observe_backup(&self, summary: &BackupSummary) {
        self.dev.devices_completed.inc();
        self.dev.params_read.inc_by(summary.read as u64);
        self.dev.params_defaulted.inc_by(summary.defaulted as u64);
        self.dev.params_unavailable.inc_by(summary.unavailable as u64);
    }

    pub fn observe_abort(&self) {
        self.dev.devices_aborted.inc();
    }

    pub fn observe_restore(&self, report: &RestoreReport) {
        if report.aborted.is_some() {
            self.dev.devices_aborted.inc();
        } else {
            self.dev.devices_completed.inc();
        }
        self.dev.writes_accepted.inc_by(report.written.len() as u64);
        self.dev.writes_rejected.inc_by(report.rejected.len() as u64);
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let hub = MetricsHub::new().unwrap();
        hub.observe_backup(&BackupSummary {
            read: 3,
            defaulted: 1,
            unavailable: 0,
            skipped: 2,
        });
        hub.observe_abort();
        hub.observe_restore(&RestoreReport {
            written: vec![1, 2],
            rejected: vec![(3, "locked".into())],
            ..Default::default()
        });
        let text = hub.encode_text();
        assert!(text.contains("dbk_params_read 3"));
        assert!(text.contains("dbk_devices_completed 2"));
        assert!(text.contains("dbk_devices_aborted 1"));
        assert!(text.contains("dbk_writes_rejected 1"));
    }
}
