use parking_lot::{Mutex, RwLock};
use ::prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{collector::Collect, error::Result, metrics::Metrics};

/// A registered metric vector and the label names it was registered with, in order.
struct Family<V> {
    vec: V,
    label_names: Vec<String>,
}

impl<V> Family<V> {
    fn new(vec: V, label_names: &[&str]) -> Self {
        Self {
            vec,
            label_names: label_names.iter().map(|name| name.to_string()).collect(),
        }
    }

    /// Label values in registration order, or `None` if the names don't match.
    fn values<'a>(&self, labels: &[(&str, &'a str)]) -> Option<Vec<&'a str>> {
        if labels.len() != self.label_names.len() {
            return None;
        }
        self.label_names
            .iter()
            .map(|name| {
                labels
                    .iter()
                    .find(|(key, _)| *key == name.as_str())
                    .map(|(_, value)| *value)
            })
            .collect()
    }
}

/// [`Metrics`] backed by a `prometheus` registry.
///
/// Collectors hooked in through [`Metrics::on_collect`] run at the start of
/// every [`PrometheusMetrics::gather`], so gauges are refreshed per scrape.
/// Overlapping scrapes wait for the running collection cycle to finish, so a
/// collector never runs concurrently with itself.
#[derive(Default)]
pub struct PrometheusMetrics {
    registry: Registry,
    counters: RwLock<HashMap<String, Family<IntCounterVec>>>,
    gauges: RwLock<HashMap<String, Family<GaugeVec>>>,
    histograms: RwLock<HashMap<String, Family<HistogramVec>>>,
    collectors: Mutex<Vec<Arc<dyn Collect>>>,
    cycle: tokio::sync::Mutex<()>,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs every collector, then gathers the registry.
    ///
    /// A failing collector is logged and skipped; its gauges keep their last values.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        {
            let _cycle = self.cycle.lock().await;
            let collectors: Vec<Arc<dyn Collect>> = self.collectors.lock().clone();
            let results =
                futures::future::join_all(collectors.iter().map(|collector| collector.collect()))
                    .await;
            for result in results {
                if let Err(e) = result {
                    log::warn!("Metrics collection cycle failed: {e}");
                }
            }
        }

        self.registry.gather()
    }

    /// [`PrometheusMetrics::gather`] rendered in the text exposition format.
    pub async fn render(&self) -> Result<String> {
        let families = self.gather().await;
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Metrics for PrometheusMetrics {
    fn register_counter(&self, name: &str, help: &str, labels: &[&str]) -> Result<()> {
        let mut counters = self.counters.write();
        if counters.contains_key(name) {
            return Ok(());
        }
        let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(counter.clone()))?;
        counters.insert(name.to_string(), Family::new(counter, labels));
        Ok(())
    }

    fn register_gauge(&self, name: &str, help: &str, labels: &[&str]) -> Result<()> {
        let mut gauges = self.gauges.write();
        if gauges.contains_key(name) {
            return Ok(());
        }
        let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(gauge.clone()))?;
        gauges.insert(name.to_string(), Family::new(gauge, labels));
        Ok(())
    }

    fn register_histogram(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> Result<()> {
        let mut histograms = self.histograms.write();
        if histograms.contains_key(name) {
            return Ok(());
        }
        let histogram =
            HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets.to_vec()), labels)?;
        self.registry.register(Box::new(histogram.clone()))?;
        histograms.insert(name.to_string(), Family::new(histogram, labels));
        Ok(())
    }

    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]) {
        let counters = self.counters.read();
        let Some(family) = counters.get(name) else {
            log::warn!("Dropping increment of unregistered counter {name}");
            return;
        };
        let Some(values) = family.values(labels) else {
            log::warn!("Dropping increment of {name}: unexpected labels {labels:?}");
            return;
        };
        match family.vec.get_metric_with_label_values(&values) {
            Ok(counter) => counter.inc_by(value),
            Err(e) => log::warn!("Dropping increment of {name}: {e}"),
        }
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let gauges = self.gauges.read();
        let Some(family) = gauges.get(name) else {
            log::warn!("Dropping update of unregistered gauge {name}");
            return;
        };
        let Some(values) = family.values(labels) else {
            log::warn!("Dropping update of {name}: unexpected labels {labels:?}");
            return;
        };
        match family.vec.get_metric_with_label_values(&values) {
            Ok(gauge) => gauge.set(value),
            Err(e) => log::warn!("Dropping update of {name}: {e}"),
        }
    }

    fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let histograms = self.histograms.read();
        let Some(family) = histograms.get(name) else {
            log::warn!("Dropping observation of unregistered histogram {name}");
            return;
        };
        let Some(values) = family.values(labels) else {
            log::warn!("Dropping observation of {name}: unexpected labels {labels:?}");
            return;
        };
        match family.vec.get_metric_with_label_values(&values) {
            Ok(histogram) => histogram.observe(value),
            Err(e) => log::warn!("Dropping observation of {name}: {e}"),
        }
    }

    fn on_collect(&self, collector: Arc<dyn Collect>) {
        self.collectors.lock().push(collector);
    }
}
