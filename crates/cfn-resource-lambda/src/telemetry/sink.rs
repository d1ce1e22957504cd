//! Telemetry delivery capabilities.
//!
//! The engine only needs four log operations and one metric operation from
//! the outside world. They are expressed as object-safe async traits so the
//! AWS-backed implementations in [`aws`](super::aws) can be swapped for
//! in-memory ones under test.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cfn_resource_lib::Credentials;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by a telemetry sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The addressed log group (or stream) does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The resource being created already exists.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Delivery did not complete within the policy timeout.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// Any other service or transport failure.
    #[error("telemetry service error: {0}")]
    Service(String),
}

impl SinkError {
    /// Short label used as the exception-type metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            SinkError::NotFound(_) => "ResourceNotFoundException",
            SinkError::AlreadyExists(_) => "ResourceAlreadyExistsException",
            SinkError::Timeout(_) => "TimeoutError",
            SinkError::Service(_) => "ServiceError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnit {
    Count,
    Milliseconds,
}

/// A single metric observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDatum {
    pub name: String,
    /// Dimension name/value pairs, in publication order.
    pub dimensions: Vec<(String, String)>,
    pub unit: MetricUnit,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricDatum {
    /// Value of the named dimension, if present.
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A single line delivered to a remote log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn put_metric(&self, namespace: &str, datum: MetricDatum) -> Result<(), SinkError>;
}

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Looks up a stream by exact name among streams sharing its prefix.
    ///
    /// Returns [`SinkError::NotFound`] when the log group itself is missing.
    async fn find_log_stream(&self, group: &str, stream: &str) -> Result<Option<String>, SinkError>;

    async fn create_log_group(&self, group: &str) -> Result<(), SinkError>;

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError>;

    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        records: Vec<LogRecord>,
    ) -> Result<(), SinkError>;
}

/// Produces sinks bound to one invocation's provider credentials.
pub trait TelemetryFactory: Send + Sync {
    fn metrics_sink(&self, credentials: &Credentials, region: &str) -> Arc<dyn MetricsSink>;

    fn log_sink(&self, credentials: &Credentials, region: &str) -> Arc<dyn LogSink>;
}
