//! Metrics recorder initialization and configuration.

use {anyhow::Result, tracing::info};

/// Handle to the metrics system, providing access to exported metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    /// A handle that renders nothing. Recording stays a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "prometheus")]
            prometheus_handle: None,
        }
    }

    /// Whether a recorder is installed behind this handle.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle.is_some()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            false
        }
    }

    /// Render metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle
                .as_ref()
                .map(|h| h.render())
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
    /// Global labels to add to all metrics
    pub global_labels: Vec<(String, String)>,
}

/// Initialize the metrics system.
///
/// Call once at startup. The recorder is process-global, so a second call
/// with `enabled` set fails.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle::disabled());
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        info!("prometheus metrics exporter initialized");
        Ok(MetricsHandle {
            prometheus_handle: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle::disabled())
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    use {
        crate::{buckets, webhook},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(webhook::PROCESSING_DURATION_SECONDS.to_string()),
            &buckets::WEBHOOK_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            &buckets::HTTP_DURATION,
        )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    // Installs globally and returns a render handle without spawning the
    // exporter's own HTTP listener; the gateway serves /metrics itself.
    Ok(builder.install_recorder()?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_renders_empty() {
        let handle = init_metrics(MetricsRecorderConfig::default()).unwrap();
        assert!(!handle.is_enabled());
        assert!(handle.render().is_empty());
    }

    #[test]
    fn names_share_prefix() {
        for name in [
            crate::webhook::DELIVERIES_TOTAL,
            crate::messages::CREATED_TOTAL,
            crate::websocket::CONNECTIONS_ACTIVE,
        ] {
            assert!(name.starts_with("inbox_"));
        }
    }
}
