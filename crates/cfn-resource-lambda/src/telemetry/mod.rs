//! Invocation telemetry: request-scoped logging and handler metrics.
//!
//! - [`InstrumentationBootstrap`] decides, per invocation, between remote
//!   and local-only telemetry.
//! - [`InvocationLogger`] and [`MetricsPublisher`] queue their records on
//!   [`DeliveryQueue`]s that the entry point drains before returning.
//! - Delivery goes through the [`MetricsSink`] / [`LogSink`] capabilities,
//!   backed by CloudWatch by default.

pub mod aws;
pub mod bootstrap;
pub mod log_stream;
pub mod logger;
pub mod metrics;
pub mod queue;
pub mod sink;

pub use aws::{sdk_config_for, AwsTelemetryFactory};
pub use bootstrap::{Instrumentation, InstrumentationBootstrap, DEFAULT_REGION};
pub use logger::{redact, InvocationLabels, InvocationLogger, LogLevel};
pub use metrics::MetricsPublisher;
pub use queue::{DeliveryPolicy, DeliveryQueue};
pub use sink::{LogRecord, LogSink, MetricDatum, MetricUnit, MetricsSink, SinkError, TelemetryFactory};
