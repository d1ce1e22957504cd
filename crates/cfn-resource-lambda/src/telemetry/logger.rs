//! Request-scoped logging.
//!
//! Every record is emitted through `tracing` inside the invocation span.
//! When a remote log stream has been set up the record is also rendered as a
//! JSON line and queued for delivery to CloudWatch Logs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, Span};

use super::metrics::MetricsPublisher;
use super::queue::DeliveryQueue;
use super::sink::{LogRecord, LogSink};

/// Field names whose values never reach a log destination.
const REDACTED_KEYS: [&str; 7] = [
    "CallerCredentials",
    "ProviderCredentials",
    "TypeConfiguration",
    "credentials",
    "typeConfiguration",
    "callerCredentials",
    "providerCredentials",
];

const REDACTED: &str = "[REDACTED]";

/// Returns a copy of `value` with sensitive fields masked at any depth.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let inner = if REDACTED_KEYS.contains(&key.as_str()) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(inner)
                    };
                    (key.clone(), inner)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        leaf => leaf.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Labels attached to every record of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvocationLabels {
    pub action: String,
    pub resource_type: String,
    pub version: Option<String>,
    pub region: Option<String>,
    pub stack_id: Option<String>,
    pub logical_resource_id: Option<String>,
    pub request_id: String,
}

/// Destination for the JSON-line copy of each record.
pub(crate) struct RemoteStream {
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) group: String,
    pub(crate) stream: String,
    pub(crate) queue: DeliveryQueue,
    pub(crate) metrics: MetricsPublisher,
}

#[derive(Clone)]
pub struct InvocationLogger {
    span: Span,
    labels: Option<Arc<InvocationLabels>>,
    remote: Option<Arc<RemoteStream>>,
}

impl std::fmt::Debug for InvocationLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationLogger")
            .field("labels", &self.labels)
            .field(
                "remote",
                &self
                    .remote
                    .as_ref()
                    .map(|remote| format!("{}/{}", remote.group, remote.stream)),
            )
            .finish()
    }
}

impl InvocationLogger {
    /// Process-level logger used before any invocation context exists.
    pub fn local_default() -> Self {
        Self {
            span: tracing::info_span!("cfn_resource"),
            labels: None,
            remote: None,
        }
    }

    /// Child logger carrying one invocation's labels.
    pub fn for_invocation(&self, labels: InvocationLabels) -> Self {
        let span = tracing::info_span!(
            parent: &self.span,
            "invocation",
            action = %labels.action,
            resource_type = %labels.resource_type,
            version = labels.version.as_deref(),
            region = labels.region.as_deref(),
            stack_id = labels.stack_id.as_deref(),
            logical_resource_id = labels.logical_resource_id.as_deref(),
            request_id = %labels.request_id,
        );
        Self {
            span,
            labels: Some(Arc::new(labels)),
            remote: None,
        }
    }

    pub(crate) fn with_remote(mut self, remote: RemoteStream) -> Self {
        self.remote = Some(Arc::new(remote));
        self
    }

    /// Whether records are also shipped to a remote log stream.
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn labels(&self) -> Option<&InvocationLabels> {
        self.labels.as_deref()
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, None);
    }

    /// Emits a record with structured fields; sensitive fields are redacted.
    pub fn log(&self, level: LogLevel, message: &str, fields: Option<&Value>) {
        let fields = fields.map(redact);
        let rendered = fields.as_ref().map(Value::to_string);
        let rendered = rendered.as_deref();

        match level {
            LogLevel::Debug => {
                tracing::debug!(parent: &self.span, fields = rendered, "{message}")
            }
            LogLevel::Info => tracing::info!(parent: &self.span, fields = rendered, "{message}"),
            LogLevel::Warn => tracing::warn!(parent: &self.span, fields = rendered, "{message}"),
            LogLevel::Error => {
                tracing::error!(parent: &self.span, fields = rendered, "{message}")
            }
        }

        if let Some(remote) = &self.remote {
            self.ship(remote, level, message, fields, Utc::now());
        }
    }

    fn ship(
        &self,
        remote: &Arc<RemoteStream>,
        level: LogLevel,
        message: &str,
        fields: Option<Value>,
        timestamp: DateTime<Utc>,
    ) {
        let mut line = json!({
            "timestamp": timestamp.to_rfc3339(),
            "level": level,
            "message": message,
        });
        if let Some(object) = line.as_object_mut() {
            if let Some(labels) = &self.labels {
                object.insert(
                    "cloudformation".into(),
                    serde_json::to_value(labels.as_ref()).unwrap_or(Value::Null),
                );
            }
            if let Some(fields) = fields {
                object.insert("fields".into(), fields);
            }
        }

        let record = LogRecord {
            timestamp,
            message: line.to_string(),
        };
        let target = Arc::clone(remote);
        let on_failure_metrics = remote.metrics.clone();
        remote.queue.submit(
            move || {
                let target = Arc::clone(&target);
                let record = record.clone();
                async move {
                    target
                        .sink
                        .put_log_events(&target.group, &target.stream, vec![record])
                        .await
                }
            },
            move |err| {
                error!(error = %err, "error publishing log message");
                on_failure_metrics.publish_log_delivery_exception(Utc::now(), err.kind());
            },
        );
    }
}
