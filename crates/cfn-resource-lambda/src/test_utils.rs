//! Test utilities for resource provider testing.
//!
//! In-memory telemetry sinks and a TPS report fixture resource, shared by the
//! unit tests of this crate and by provider crates that enable the
//! `test-utils` feature.
//!
//! # Usage
//!
//! ```ignore
//! use cfn_resource_lambda::test_utils::{tps_resource_schema, RecordingTelemetryFactory};
//!
//! let factory = Arc::new(RecordingTelemetryFactory::default());
//! let resource = ResourceBuilder::from_resource_schema(&tps_resource_schema())?
//!     .telemetry(factory.clone())
//!     .handlers(MyHandlers)
//!     .build()?;
//! ```

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cfn_resource_lib::Credentials;
use serde_json::{json, Value};

use crate::telemetry::{
    LogRecord, LogSink, MetricDatum, MetricsSink, SinkError, TelemetryFactory,
};

/// CloudFormation resource schema of the TPS report fixture resource.
///
/// `TPSCode` is the server-assigned primary identifier.
pub fn tps_resource_schema() -> Value {
    json!({
        "typeName": "Community::Testing::TPSReport",
        "description": "A TPS report",
        "definitions": {
            "Memo": {
                "type": "object",
                "properties": {
                    "Heading": {"type": "string"},
                    "Body": {"type": "string"}
                },
                "additionalProperties": false
            }
        },
        "properties": {
            "TPSCode": {"type": "string", "pattern": "^[0-9]{1,10}$"},
            "Title": {"type": "string", "minLength": 1, "maxLength": 250},
            "CoverSheetIncluded": {"type": "boolean"},
            "DueDate": {"type": "string"},
            "ApprovalDate": {"type": "string"},
            "Memo": {"$ref": "#/definitions/Memo"},
            "SecondCopyOfMemo": {"$ref": "#/definitions/Memo"},
            "TestCode": {"type": "string", "enum": ["NOT_STARTED", "CANCELLED"]},
            "Authors": {"type": "array", "items": {"type": "string"}},
            "Copies": {"type": "integer"}
        },
        "additionalProperties": false,
        "required": ["TestCode", "Title", "TPSCode"],
        "readOnlyProperties": ["/properties/TPSCode"],
        "primaryIdentifier": ["/properties/TPSCode"],
        "handlers": {
            "create": {"permissions": []},
            "read": {"permissions": []},
            "update": {"permissions": []},
            "delete": {"permissions": []},
            "list": {"permissions": []}
        }
    })
}

/// Metrics sink that keeps every datum in memory.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    recorded: Mutex<Vec<(String, MetricDatum)>>,
}

impl RecordingMetricsSink {
    /// `(namespace, datum)` pairs in delivery order.
    pub fn recorded(&self) -> Vec<(String, MetricDatum)> {
        self.recorded.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Recorded data with the given metric name.
    pub fn named(&self, name: &str) -> Vec<MetricDatum> {
        self.recorded()
            .into_iter()
            .filter(|(_, datum)| datum.name == name)
            .map(|(_, datum)| datum)
            .collect()
    }
}

#[async_trait]
impl MetricsSink for RecordingMetricsSink {
    async fn put_metric(&self, namespace: &str, datum: MetricDatum) -> Result<(), SinkError> {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push((namespace.to_string(), datum));
        }
        Ok(())
    }
}

/// Metrics sink whose every call fails.
#[derive(Debug, Default)]
pub struct FailingMetricsSink;

#[async_trait]
impl MetricsSink for FailingMetricsSink {
    async fn put_metric(&self, _namespace: &str, _datum: MetricDatum) -> Result<(), SinkError> {
        Err(SinkError::Service("metrics unavailable".into()))
    }
}

#[derive(Debug, Default)]
struct LogState {
    groups: BTreeSet<String>,
    streams: BTreeSet<(String, String)>,
    stream_creations: usize,
    events: Vec<(String, String, LogRecord)>,
}

/// In-memory log service honoring group/stream existence.
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    state: Mutex<LogState>,
}

impl RecordingLogSink {
    pub fn has_group(&self, group: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.groups.contains(group))
            .unwrap_or(false)
    }

    pub fn has_stream(&self, group: &str, stream: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.streams.contains(&(group.to_string(), stream.to_string())))
            .unwrap_or(false)
    }

    pub fn stream_creations(&self) -> usize {
        self.state.lock().map(|s| s.stream_creations).unwrap_or(0)
    }

    /// `(group, stream, record)` triples in delivery order.
    pub fn events(&self) -> Vec<(String, String, LogRecord)> {
        self.state
            .lock()
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogSink for RecordingLogSink {
    async fn find_log_stream(&self, group: &str, stream: &str) -> Result<Option<String>, SinkError> {
        let state = self
            .state
            .lock()
            .map_err(|_| SinkError::Service("poisoned".into()))?;
        if !state.groups.contains(group) {
            return Err(SinkError::NotFound(group.to_string()));
        }
        let key = (group.to_string(), stream.to_string());
        Ok(state.streams.contains(&key).then(|| stream.to_string()))
    }

    async fn create_log_group(&self, group: &str) -> Result<(), SinkError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkError::Service("poisoned".into()))?;
        if state.groups.insert(group.to_string()) {
            Ok(())
        } else {
            Err(SinkError::AlreadyExists(group.to_string()))
        }
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkError::Service("poisoned".into()))?;
        if !state.groups.contains(group) {
            return Err(SinkError::NotFound(group.to_string()));
        }
        if state.streams.insert((group.to_string(), stream.to_string())) {
            state.stream_creations += 1;
            Ok(())
        } else {
            Err(SinkError::AlreadyExists(stream.to_string()))
        }
    }

    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        records: Vec<LogRecord>,
    ) -> Result<(), SinkError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkError::Service("poisoned".into()))?;
        for record in records {
            state.events.push((group.to_string(), stream.to_string(), record));
        }
        Ok(())
    }
}

/// Log service whose every call fails with a service error.
#[derive(Debug, Default)]
pub struct FailingLogSink;

#[async_trait]
impl LogSink for FailingLogSink {
    async fn find_log_stream(&self, _group: &str, _stream: &str) -> Result<Option<String>, SinkError> {
        Err(SinkError::Service("log service unavailable".into()))
    }

    async fn create_log_group(&self, _group: &str) -> Result<(), SinkError> {
        Err(SinkError::Service("log service unavailable".into()))
    }

    async fn create_log_stream(&self, _group: &str, _stream: &str) -> Result<(), SinkError> {
        Err(SinkError::Service("log service unavailable".into()))
    }

    async fn put_log_events(
        &self,
        _group: &str,
        _stream: &str,
        _records: Vec<LogRecord>,
    ) -> Result<(), SinkError> {
        Err(SinkError::Service("log service unavailable".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkBehavior {
    #[default]
    Record,
    Fail,
}

/// Factory handing out shared in-memory sinks and remembering each request.
#[derive(Debug, Default)]
pub struct RecordingTelemetryFactory {
    metrics_behavior: SinkBehavior,
    log_behavior: SinkBehavior,
    metrics: Arc<RecordingMetricsSink>,
    logs: Arc<RecordingLogSink>,
    requests: Mutex<Vec<(Credentials, String)>>,
}

impl RecordingTelemetryFactory {
    pub fn with_log_behavior(log_behavior: SinkBehavior) -> Self {
        Self {
            log_behavior,
            ..Self::default()
        }
    }

    pub fn with_metrics_behavior(metrics_behavior: SinkBehavior) -> Self {
        Self {
            metrics_behavior,
            ..Self::default()
        }
    }

    pub fn metrics_sink_handle(&self) -> Arc<RecordingMetricsSink> {
        Arc::clone(&self.metrics)
    }

    pub fn log_sink_handle(&self) -> Arc<RecordingLogSink> {
        Arc::clone(&self.logs)
    }

    /// Number of sinks handed out so far.
    pub fn sinks_created(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Region of every sink request, in order.
    pub fn regions(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|(_, region)| region.clone()).collect())
            .unwrap_or_default()
    }

    /// Credentials of every sink request, in order.
    pub fn credentials(&self) -> Vec<Credentials> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|(credentials, _)| credentials.clone()).collect())
            .unwrap_or_default()
    }

    fn remember(&self, credentials: &Credentials, region: &str) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((credentials.clone(), region.to_string()));
        }
    }
}

impl TelemetryFactory for RecordingTelemetryFactory {
    fn metrics_sink(&self, credentials: &Credentials, region: &str) -> Arc<dyn MetricsSink> {
        self.remember(credentials, region);
        match self.metrics_behavior {
            SinkBehavior::Record => self.metrics_sink_handle() as Arc<dyn MetricsSink>,
            SinkBehavior::Fail => Arc::new(FailingMetricsSink),
        }
    }

    fn log_sink(&self, credentials: &Credentials, region: &str) -> Arc<dyn LogSink> {
        self.remember(credentials, region);
        match self.log_behavior {
            SinkBehavior::Record => self.log_sink_handle() as Arc<dyn LogSink>,
            SinkBehavior::Fail => Arc::new(FailingLogSink),
        }
    }
}
