//! Per-invocation instrumentation setup.
//!
//! Telemetry is best effort. Missing provider credentials select local-only
//! logging and disabled metrics without any network call; a failure while
//! provisioning the remote log stream is logged, reported as a log delivery
//! metric, and also falls back to local logging. Neither case fails the
//! invocation.

use std::sync::Arc;

use cfn_resource_lib::Credentials;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use super::log_stream::{ensure_log_stream, log_stream_name};
use super::logger::{InvocationLabels, InvocationLogger, LogLevel, RemoteStream};
use super::metrics::MetricsPublisher;
use super::queue::{DeliveryPolicy, DeliveryQueue};
use super::sink::{SinkError, TelemetryFactory};

/// Region assumed when an invocation does not name one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// The logger, metrics publisher and pending-delivery queues of one
/// invocation.
#[derive(Debug, Clone)]
pub struct Instrumentation {
    pub logger: InvocationLogger,
    pub metrics: MetricsPublisher,
    drainables: Vec<DeliveryQueue>,
}

impl Instrumentation {
    /// Local-only logging with metrics disabled.
    pub fn local(logger: InvocationLogger) -> Self {
        Self {
            logger,
            metrics: MetricsPublisher::disabled(),
            drainables: Vec::new(),
        }
    }

    /// Queues the entry point must drain before returning, logs first.
    pub fn drainables(&self) -> &[DeliveryQueue] {
        &self.drainables
    }

    /// Waits for every queued log and metric delivery to settle.
    ///
    /// Bounded: each delivery enforces the policy timeout itself.
    pub async fn drain(&self) {
        for queue in &self.drainables {
            queue.drain().await;
        }
    }
}

/// Builds [`Instrumentation`] for each invocation.
#[derive(Clone)]
pub struct InstrumentationBootstrap {
    factory: Arc<dyn TelemetryFactory>,
    policy: DeliveryPolicy,
    default_logger: InvocationLogger,
}

impl std::fmt::Debug for InstrumentationBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentationBootstrap")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl InstrumentationBootstrap {
    pub fn new(
        factory: Arc<dyn TelemetryFactory>,
        policy: DeliveryPolicy,
        default_logger: InvocationLogger,
    ) -> Self {
        Self {
            factory,
            policy,
            default_logger,
        }
    }

    pub fn default_logger(&self) -> &InvocationLogger {
        &self.default_logger
    }

    pub async fn begin(
        &self,
        labels: InvocationLabels,
        provider_credentials: Option<&Credentials>,
        log_group: Option<&str>,
    ) -> Instrumentation {
        let region = labels
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let stream = log_stream_name(&labels.resource_type, labels.logical_resource_id.as_deref());
        let resource_type = labels.resource_type.clone();
        let logger = self.default_logger.for_invocation(labels);

        let Some(credentials) = provider_credentials.filter(|c| c.has_access_key()) else {
            logger.debug("no provider credentials, skipping CloudWatch metrics and log stream creation");
            return Instrumentation::local(logger);
        };

        let metrics_queue = DeliveryQueue::new(self.policy);
        let metrics = MetricsPublisher::new(
            self.factory.metrics_sink(credentials, &region),
            &resource_type,
            metrics_queue.clone(),
        );

        let Some(group) = log_group.filter(|g| !g.is_empty()) else {
            logger.warn("no provider log group name, logging locally only");
            return Instrumentation {
                logger,
                metrics,
                drainables: vec![metrics_queue],
            };
        };

        let sink = self.factory.log_sink(credentials, &region);
        let provisioned = tokio::time::timeout(
            self.policy.timeout,
            ensure_log_stream(sink.as_ref(), group, &stream),
        )
        .await
        .unwrap_or(Err(SinkError::Timeout(self.policy.timeout)));

        if let Err(err) = provisioned {
            warn!(error = %err, group, stream = %stream, "error ensuring log stream");
            logger.log(
                LogLevel::Error,
                "error ensuring log group",
                Some(&json!({ "error": err.to_string(), "logGroupName": group })),
            );
            metrics.publish_log_delivery_exception(Utc::now(), err.kind());
            return Instrumentation {
                logger,
                metrics,
                drainables: vec![metrics_queue],
            };
        }

        let log_queue = DeliveryQueue::new(self.policy);
        let logger = logger.with_remote(RemoteStream {
            sink,
            group: group.to_string(),
            stream,
            queue: log_queue.clone(),
            metrics: metrics.clone(),
        });

        Instrumentation {
            logger,
            metrics,
            drainables: vec![log_queue, metrics_queue],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::metrics::{DIMENSION_ACTION_TYPE, LOG_DELIVERY_ACTION};
    use crate::test_utils::{RecordingTelemetryFactory, SinkBehavior};

    fn labels() -> InvocationLabels {
        InvocationLabels {
            action: "CREATE".into(),
            resource_type: "Org::Service::Report".into(),
            region: Some("eu-west-1".into()),
            logical_resource_id: Some("MyReport".into()),
            request_id: "req-1".into(),
            ..InvocationLabels::default()
        }
    }

    fn bootstrap(factory: Arc<RecordingTelemetryFactory>) -> InstrumentationBootstrap {
        InstrumentationBootstrap::new(factory, DeliveryPolicy::default(), InvocationLogger::local_default())
    }

    fn provider_credentials() -> Credentials {
        Credentials::new("AKIA", "secret", Some("token".into()))
    }

    #[tokio::test]
    async fn no_credentials_means_local_only_and_no_sink_calls() {
        let factory = Arc::new(RecordingTelemetryFactory::default());
        let instrumentation = bootstrap(factory.clone())
            .begin(labels(), None, Some("provider-logs"))
            .await;

        assert!(!instrumentation.logger.is_remote());
        assert!(!instrumentation.metrics.is_enabled());
        assert!(instrumentation.drainables().is_empty());
        assert_eq!(factory.sinks_created(), 0);
    }

    #[tokio::test]
    async fn credentials_without_access_key_are_ignored() {
        let factory = Arc::new(RecordingTelemetryFactory::default());
        let instrumentation = bootstrap(factory.clone())
            .begin(labels(), Some(&Credentials::default()), Some("provider-logs"))
            .await;
        assert!(!instrumentation.metrics.is_enabled());
        assert_eq!(factory.sinks_created(), 0);
    }

    #[tokio::test]
    async fn full_setup_fans_out_to_remote_stream() {
        let factory = Arc::new(RecordingTelemetryFactory::default());
        let instrumentation = bootstrap(factory.clone())
            .begin(labels(), Some(&provider_credentials()), Some("provider-logs"))
            .await;

        assert!(instrumentation.logger.is_remote());
        assert!(instrumentation.metrics.is_enabled());
        assert_eq!(instrumentation.drainables().len(), 2);
        assert!(factory
            .log_sink_handle()
            .has_stream("provider-logs", "Org/Service/Report/MyReport"));
        assert_eq!(factory.regions(), vec!["eu-west-1".to_string(); 2]);
    }

    #[tokio::test]
    async fn missing_log_group_keeps_metrics_only() {
        let factory = Arc::new(RecordingTelemetryFactory::default());
        let instrumentation = bootstrap(factory)
            .begin(labels(), Some(&provider_credentials()), None)
            .await;
        assert!(!instrumentation.logger.is_remote());
        assert!(instrumentation.metrics.is_enabled());
        assert_eq!(instrumentation.drainables().len(), 1);
    }

    #[tokio::test]
    async fn log_stream_failure_degrades_and_reports() {
        let factory = Arc::new(RecordingTelemetryFactory::with_log_behavior(SinkBehavior::Fail));
        let instrumentation = bootstrap(factory.clone())
            .begin(labels(), Some(&provider_credentials()), Some("provider-logs"))
            .await;

        assert!(!instrumentation.logger.is_remote());
        assert!(instrumentation.metrics.is_enabled());
        instrumentation.drain().await;

        let recorded = factory.metrics_sink_handle().recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].1.dimension(DIMENSION_ACTION_TYPE),
            Some(LOG_DELIVERY_ACTION)
        );
    }
}
