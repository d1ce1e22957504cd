//! Handler metrics published to CloudWatch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::queue::DeliveryQueue;
use super::sink::{MetricDatum, MetricUnit, MetricsSink};

pub const METRIC_HANDLER_EXCEPTION: &str = "HandlerException";
pub const METRIC_INVOCATION_COUNT: &str = "HandlerInvocationCount";
pub const METRIC_INVOCATION_DURATION: &str = "HandlerInvocationDuration";

pub const DIMENSION_ACTION_TYPE: &str = "DimensionKeyActionType";
pub const DIMENSION_EXCEPTION_TYPE: &str = "DimensionKeyExceptionType";
pub const DIMENSION_RESOURCE_TYPE: &str = "DimensionKeyResourceType";

/// Action dimension used for failures of the log delivery pipeline itself.
pub const LOG_DELIVERY_ACTION: &str = "ProviderLogDelivery";

const METRIC_NAMESPACE_ROOT: &str = "AWS/CloudFormation";

/// `Org::Service::Thing` → `Org/Service/Thing`.
pub fn telemetry_prefix(resource_type: &str) -> String {
    resource_type.replace("::", "/")
}

/// CloudWatch namespace for a resource type's metrics.
pub fn metric_namespace(resource_type: &str) -> String {
    format!("{METRIC_NAMESPACE_ROOT}/{}", telemetry_prefix(resource_type))
}

struct Publisher {
    sink: Arc<dyn MetricsSink>,
    namespace: String,
    resource_type: String,
    queue: DeliveryQueue,
}

/// Queues metric data for background delivery.
///
/// A disabled publisher (no provider credentials) accepts every call and
/// does nothing. Publishing never blocks and never fails the caller.
#[derive(Clone, Default)]
pub struct MetricsPublisher {
    inner: Option<Arc<Publisher>>,
}

impl std::fmt::Debug for MetricsPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(publisher) => f
                .debug_struct("MetricsPublisher")
                .field("namespace", &publisher.namespace)
                .field("pending", &publisher.queue.pending())
                .finish(),
            None => f.write_str("MetricsPublisher(disabled)"),
        }
    }
}

impl MetricsPublisher {
    pub fn new(sink: Arc<dyn MetricsSink>, resource_type: &str, queue: DeliveryQueue) -> Self {
        Self {
            inner: Some(Arc::new(Publisher {
                sink,
                namespace: metric_namespace(resource_type),
                resource_type: resource_type.to_string(),
                queue,
            })),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Queue backing this publisher, if enabled.
    pub fn queue(&self) -> Option<&DeliveryQueue> {
        self.inner.as_ref().map(|publisher| &publisher.queue)
    }

    pub fn publish(
        &self,
        name: &str,
        dimensions: Vec<(String, String)>,
        unit: MetricUnit,
        value: f64,
        timestamp: DateTime<Utc>,
    ) {
        let Some(publisher) = &self.inner else {
            return;
        };
        debug!(metric = name, "publishing metric");

        let datum = MetricDatum {
            name: name.to_string(),
            dimensions,
            unit,
            value,
            timestamp,
        };
        let sink = Arc::clone(&publisher.sink);
        let namespace = publisher.namespace.clone();
        let metric = datum.name.clone();
        publisher.queue.submit(
            move || {
                let sink = Arc::clone(&sink);
                let namespace = namespace.clone();
                let datum = datum.clone();
                async move { sink.put_metric(&namespace, datum).await }
            },
            move |err| warn!(metric = %metric, error = %err, "failed to publish metric"),
        );
    }

    pub fn publish_invocation(&self, timestamp: DateTime<Utc>, action: &str) {
        self.publish(
            METRIC_INVOCATION_COUNT,
            self.action_dimensions(action, None),
            MetricUnit::Count,
            1.0,
            timestamp,
        );
    }

    pub fn publish_duration(&self, timestamp: DateTime<Utc>, action: &str, milliseconds: f64) {
        self.publish(
            METRIC_INVOCATION_DURATION,
            self.action_dimensions(action, None),
            MetricUnit::Milliseconds,
            milliseconds,
            timestamp,
        );
    }

    pub fn publish_exception(&self, timestamp: DateTime<Utc>, action: &str, exception_type: &str) {
        self.publish(
            METRIC_HANDLER_EXCEPTION,
            self.action_dimensions(action, Some(exception_type)),
            MetricUnit::Count,
            1.0,
            timestamp,
        );
    }

    pub fn publish_log_delivery_exception(&self, timestamp: DateTime<Utc>, exception_type: &str) {
        self.publish_exception(timestamp, LOG_DELIVERY_ACTION, exception_type);
    }

    fn action_dimensions(&self, action: &str, exception_type: Option<&str>) -> Vec<(String, String)> {
        let resource_type = self
            .inner
            .as_ref()
            .map(|publisher| publisher.resource_type.clone())
            .unwrap_or_default();
        let mut dimensions = vec![(DIMENSION_ACTION_TYPE.to_string(), action.to_string())];
        if let Some(exception_type) = exception_type {
            dimensions.push((DIMENSION_EXCEPTION_TYPE.to_string(), exception_type.to_string()));
        }
        dimensions.push((DIMENSION_RESOURCE_TYPE.to_string(), resource_type));
        dimensions
    }
}
