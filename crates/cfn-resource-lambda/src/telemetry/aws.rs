//! CloudWatch and CloudWatch Logs backed sinks.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_cloudwatch::primitives::DateTime as SmithyDateTime;
use aws_sdk_cloudwatch::types::{
    Dimension, MetricDatum as CloudWatchDatum, StandardUnit,
};
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use cfn_resource_lib::Credentials;

use super::sink::{
    LogRecord, LogSink, MetricDatum, MetricUnit, MetricsSink, SinkError, TelemetryFactory,
};

/// Page size used when looking up an existing log stream.
const LOG_STREAM_PAGE_SIZE: i32 = 5;

const CREDENTIALS_PROVIDER_NAME: &str = "cfn-resource-request";

/// SDK configuration scoped to one set of request credentials and region.
///
/// Without an access key the configuration carries no credentials provider.
pub fn sdk_config_for(credentials: &Credentials, region: &str) -> SdkConfig {
    let mut builder = SdkConfig::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(region.to_string()));

    if credentials.has_access_key() {
        let scoped = aws_credential_types::Credentials::new(
            credentials.access_key_id.clone().unwrap_or_default(),
            credentials.secret_access_key.clone().unwrap_or_default(),
            credentials.session_token.clone(),
            None,
            CREDENTIALS_PROVIDER_NAME,
        );
        builder = builder.credentials_provider(SharedCredentialsProvider::new(scoped));
    }

    builder.build()
}

fn service_error<E: std::error::Error>(err: E) -> SinkError {
    SinkError::Service(DisplayErrorContext(err).to_string())
}

/// Converts a queued datum into its `PutMetricData` form.
fn cloudwatch_datum(datum: MetricDatum) -> CloudWatchDatum {
    let unit = match datum.unit {
        MetricUnit::Count => StandardUnit::Count,
        MetricUnit::Milliseconds => StandardUnit::Milliseconds,
    };
    let dimensions = datum
        .dimensions
        .into_iter()
        .map(|(name, value)| Dimension::builder().name(name).value(value).build())
        .collect();

    CloudWatchDatum::builder()
        .metric_name(datum.name)
        .unit(unit)
        .value(datum.value)
        .timestamp(SmithyDateTime::from_millis(datum.timestamp.timestamp_millis()))
        .set_dimensions(Some(dimensions))
        .build()
}

/// Publishes metric data through `PutMetricData`.
#[derive(Debug, Clone)]
pub struct CloudWatchMetricsSink {
    client: aws_sdk_cloudwatch::Client,
}

impl CloudWatchMetricsSink {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatch::Client::new(config),
        }
    }
}

#[async_trait]
impl MetricsSink for CloudWatchMetricsSink {
    async fn put_metric(&self, namespace: &str, datum: MetricDatum) -> Result<(), SinkError> {
        self.client
            .put_metric_data()
            .namespace(namespace)
            .metric_data(cloudwatch_datum(datum))
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }
}

/// Delivers log lines through the CloudWatch Logs API.
#[derive(Debug, Clone)]
pub struct CloudWatchLogSink {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl CloudWatchLogSink {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatchlogs::Client::new(config),
        }
    }
}

#[async_trait]
impl LogSink for CloudWatchLogSink {
    async fn find_log_stream(&self, group: &str, stream: &str) -> Result<Option<String>, SinkError> {
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .describe_log_streams()
                .log_group_name(group)
                .log_stream_name_prefix(stream)
                .limit(LOG_STREAM_PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| {
                    let err = err.into_service_error();
                    if err.is_resource_not_found_exception() {
                        SinkError::NotFound(group.to_string())
                    } else {
                        service_error(err)
                    }
                })?;

            if page
                .log_streams()
                .iter()
                .any(|candidate| candidate.log_stream_name() == Some(stream))
            {
                return Ok(Some(stream.to_string()));
            }

            match page.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => return Ok(None),
            }
        }
    }

    async fn create_log_group(&self, group: &str) -> Result<(), SinkError> {
        self.client
            .create_log_group()
            .log_group_name(group)
            .send()
            .await
            .map_err(|err| {
                let err = err.into_service_error();
                if err.is_resource_already_exists_exception() {
                    SinkError::AlreadyExists(group.to_string())
                } else {
                    service_error(err)
                }
            })?;
        Ok(())
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        self.client
            .create_log_stream()
            .log_group_name(group)
            .log_stream_name(stream)
            .send()
            .await
            .map_err(|err| {
                let err = err.into_service_error();
                if err.is_resource_already_exists_exception() {
                    SinkError::AlreadyExists(stream.to_string())
                } else if err.is_resource_not_found_exception() {
                    SinkError::NotFound(group.to_string())
                } else {
                    service_error(err)
                }
            })?;
        Ok(())
    }

    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        records: Vec<LogRecord>,
    ) -> Result<(), SinkError> {
        let events = records
            .into_iter()
            .map(|record| {
                InputLogEvent::builder()
                    .timestamp(record.timestamp.timestamp_millis())
                    .message(record.message)
                    .build()
                    .map_err(service_error)
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .put_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .set_log_events(Some(events))
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }
}

/// Default factory: one SDK client pair per invocation's credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsTelemetryFactory;

impl TelemetryFactory for AwsTelemetryFactory {
    fn metrics_sink(&self, credentials: &Credentials, region: &str) -> Arc<dyn MetricsSink> {
        Arc::new(CloudWatchMetricsSink::new(&sdk_config_for(credentials, region)))
    }

    fn log_sink(&self, credentials: &Credentials, region: &str) -> Arc<dyn LogSink> {
        Arc::new(CloudWatchLogSink::new(&sdk_config_for(credentials, region)))
    }
}
