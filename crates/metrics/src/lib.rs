//! Metrics for the inbox service.
//!
//! Every crate records through the `metrics` facade using the names defined
//! here. With the `prometheus` feature the gateway installs a recorder and
//! serves its rendering on `/metrics`; without it all recording is a no-op.
//!
//! ```rust,ignore
//! use inbox_metrics::{counter, webhook};
//!
//! counter!(webhook::DELIVERIES_TOTAL, "result" => "accepted").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
