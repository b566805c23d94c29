//! Prometheus gauges for particulate matter readings.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `airquality_pm` | Gauge | `type` = `pm2.5` \| `pm10` |
//!
//! The gauge family lives in its own [`Registry`], so the `/metrics` endpoint
//! exposes exactly this family. Only the latest value per label is kept.

use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::error::ExporterError;
use crate::sensor::{Measurement, PM10_LABEL, PM25_LABEL};
use crate::Result;

/// Name of the gauge family.
pub const PM_METRIC_NAME: &str = "airquality_pm";

/// Help text of the gauge family.
pub const PM_METRIC_HELP: &str = "Airquality PM metric";

/// Labeled gauge store for particulate matter readings.
///
/// All methods take `&self` and are safe to call from the measurement thread
/// while HTTP requests encode the registry.
#[derive(Clone)]
pub struct PmGauges {
    registry: Registry,
    pm: GaugeVec,
}

impl PmGauges {
    /// Create the gauge family and register it with a fresh registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let pm = GaugeVec::new(Opts::new(PM_METRIC_NAME, PM_METRIC_HELP), &["type"])?;
        registry.register(Box::new(pm.clone()))?;
        Ok(Self { registry, pm })
    }

    /// Set the gauge for one label, replacing the previous value.
    pub fn set(&self, label: &str, value: f64) {
        self.pm.with_label_values(&[label]).set(value);
    }

    /// Latest value for a label, or `None` if it was never set.
    pub fn get(&self, label: &str) -> Option<f64> {
        self.pm
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.get_name() == "type" && pair.get_value() == label)
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Publish both values of a measurement.
    pub fn publish(&self, measurement: &Measurement) {
        self.set(PM25_LABEL, measurement.pm25);
        self.set(PM10_LABEL, measurement.pm10);
    }

    /// Encode the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ExporterError::Metrics(prometheus::Error::Msg(e.to_string())))
    }

    /// Content type of [`encode_text`](Self::encode_text) output.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}
