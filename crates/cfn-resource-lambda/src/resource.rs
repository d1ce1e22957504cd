//! Resource assembly and Lambda entry points.
//!
//! A [`ResourceBuilder`] fixes the resource definition and telemetry setup
//! first, then takes the callback set exactly once in
//! [`ResourceBuilder::handlers`]. The resulting [`Resource`] is immutable and
//! serves both the production envelope and the local test request.
//!
//! Each entry point has a single catch boundary: whatever fails below it,
//! including a panic in a callback, comes back as a `FAILED`
//! [`ProgressEvent`]. Queued telemetry is drained before the response is
//! returned.

use std::sync::Arc;
use std::time::Instant;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use cfn_resource_lib::{
    failure_response, Action, Credentials, Envelope, Failure, OperationStatus, ProgressEvent,
    ResourceDefinition, TestRequest, ValidationFailure,
};
use chrono::Utc;
use lambda_runtime::{service_fn, Context, LambdaEvent};
use serde_json::{json, Value};
use tracing::{info, warn, Instrument};

use crate::context::HandlerContext;
use crate::dispatch::{parse_action, ActionDispatcher, DispatchRequest};
use crate::handlers::ResourceHandlers;
use crate::telemetry::{
    AwsTelemetryFactory, DeliveryPolicy, Instrumentation, InstrumentationBootstrap,
    InvocationLabels, InvocationLogger, LogLevel, TelemetryFactory, DEFAULT_REGION,
};
use crate::tracing_init::init_tracing;

/// Resource type version label used by the test entry point.
pub const TEST_TYPE_VERSION: &str = "0.1.0.dev1";

/// Stack id label used by the test entry point.
pub const TEST_STACK_ID: &str = "TestStack";

/// Action dimension used for metrics of an event without an action.
pub const MISSING_ACTION_LABEL: &str = "UNKNOWN";

/// First phase of resource assembly: configuration without callbacks.
pub struct ResourceBuilder {
    definition: ResourceDefinition,
    telemetry: Arc<dyn TelemetryFactory>,
    policy: DeliveryPolicy,
    default_logger: InvocationLogger,
    handlers: Option<Arc<dyn ResourceHandlers>>,
}

impl std::fmt::Debug for ResourceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBuilder")
            .field("type_name", &self.definition.type_name())
            .field("policy", &self.policy)
            .field("handlers", &self.handlers.is_some())
            .finish_non_exhaustive()
    }
}

impl ResourceBuilder {
    /// Starts from a properties schema and the wire names of the primary
    /// identifier fields.
    pub fn new<I, S>(
        type_name: impl Into<String>,
        properties_schema: Value,
        identifiers: I,
    ) -> cfn_resource_lib::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let definition = ResourceDefinition::new(type_name, properties_schema, identifiers)?;
        Ok(Self::from_definition(definition))
    }

    /// Starts from a CloudFormation resource schema document.
    pub fn from_resource_schema(document: &Value) -> cfn_resource_lib::Result<Self> {
        let definition = ResourceDefinition::from_resource_schema(document)?;
        Ok(Self::from_definition(definition))
    }

    pub fn from_definition(definition: ResourceDefinition) -> Self {
        Self {
            definition,
            telemetry: Arc::new(AwsTelemetryFactory),
            policy: DeliveryPolicy::default(),
            default_logger: InvocationLogger::local_default(),
            handlers: None,
        }
    }

    /// Replaces the type-configuration schema. Its `required` list is kept
    /// as declared.
    pub fn type_configuration_schema(mut self, schema: Value) -> cfn_resource_lib::Result<Self> {
        self.definition = self.definition.with_type_configuration_schema(schema)?;
        Ok(self)
    }

    /// Replaces the CloudWatch-backed telemetry sinks.
    pub fn telemetry(mut self, factory: Arc<dyn TelemetryFactory>) -> Self {
        self.telemetry = factory;
        self
    }

    pub fn delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Logger used before an invocation has its own.
    pub fn default_logger(mut self, logger: InvocationLogger) -> Self {
        self.default_logger = logger;
        self
    }

    /// Registers the callback set.
    pub fn handlers<H>(mut self, handlers: H) -> Self
    where
        H: ResourceHandlers + 'static,
    {
        self.handlers = Some(Arc::new(handlers));
        self
    }

    /// Finalizes the resource; fails if no callbacks were registered.
    pub fn build(self) -> cfn_resource_lib::Result<Resource> {
        let Some(handlers) = self.handlers else {
            return Err(cfn_resource_lib::Error::HandlersNotRegistered {
                type_name: self.definition.type_name().to_string(),
            });
        };
        let dispatcher = ActionDispatcher::new(Arc::new(self.definition), handlers);
        let bootstrap = InstrumentationBootstrap::new(self.telemetry, self.policy, self.default_logger);
        Ok(Resource {
            inner: Arc::new(ResourceInner {
                dispatcher,
                bootstrap,
            }),
        })
    }
}

#[derive(Debug)]
struct ResourceInner {
    dispatcher: ActionDispatcher,
    bootstrap: InstrumentationBootstrap,
}

/// A finalized resource provider.
#[derive(Debug, Clone)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

/// Per-invocation values the callback context is built from.
struct Invocation {
    action: String,
    request_id: String,
    region: String,
    credentials: Option<Credentials>,
    logical_resource_id: Option<String>,
}

impl Resource {
    pub fn definition(&self) -> &ResourceDefinition {
        self.inner.dispatcher.definition()
    }

    /// Production entry point for `lambda_runtime`.
    pub async fn entrypoint(&self, event: LambdaEvent<Value>) -> Result<ProgressEvent, lambda_runtime::Error> {
        let (payload, context) = event.into_parts();
        Ok(self.handle(payload, &context).await)
    }

    /// Test entry point for `lambda_runtime`.
    pub async fn test_entrypoint(&self, event: LambdaEvent<Value>) -> Result<ProgressEvent, lambda_runtime::Error> {
        let (payload, context) = event.into_parts();
        Ok(self.handle_test(payload, &context).await)
    }

    /// Serves the production entry point until the runtime shuts down.
    pub async fn run(self) -> Result<(), lambda_runtime::Error> {
        init_tracing();
        info!(type_name = self.definition().type_name(), "starting resource provider");
        lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
            let resource = self.clone();
            async move { resource.entrypoint(event).await }
        }))
        .await
    }

    /// Serves the test entry point until the runtime shuts down.
    pub async fn run_test(self) -> Result<(), lambda_runtime::Error> {
        init_tracing();
        info!(type_name = self.definition().type_name(), "starting resource provider test entry point");
        lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
            let resource = self.clone();
            async move { resource.test_entrypoint(event).await }
        }))
        .await
    }

    /// Handles one production envelope. Never fails.
    pub async fn handle(&self, payload: Value, context: &Context) -> ProgressEvent {
        let envelope = match Envelope::parse(&payload) {
            Ok(envelope) => envelope,
            Err(failure) => return self.reject(failure),
        };

        let callback_context = envelope.callback_context();
        let Envelope {
            action,
            region,
            resource_type,
            resource_type_version,
            stack_id,
            request_data,
            next_token,
            ..
        } = envelope;

        let labels = InvocationLabels {
            action: action.clone(),
            resource_type,
            version: resource_type_version,
            region: Some(region.clone()),
            stack_id,
            logical_resource_id: request_data.logical_resource_id.clone(),
            request_id: context.request_id.clone(),
        };
        let instrumentation = self
            .inner
            .bootstrap
            .begin(
                labels,
                request_data.provider_credentials.as_ref(),
                request_data.provider_log_group_name.as_deref(),
            )
            .await;

        let invocation = Invocation {
            action,
            request_id: context.request_id.clone(),
            region,
            credentials: request_data.caller_credentials,
            logical_resource_id: request_data.logical_resource_id.clone(),
        };
        let request = DispatchRequest {
            resource_properties: request_data.resource_properties,
            previous_resource_properties: request_data.previous_resource_properties,
            type_configuration: request_data.type_configuration,
            callback_context,
            next_token,
            logical_resource_id: request_data.logical_resource_id,
        };

        self.invoke(invocation, request, &instrumentation, false).await
    }

    /// Handles one local test request. Never fails.
    ///
    /// Successful resource models of every action but READ are checked
    /// against the resource schema before they are returned. In-progress
    /// models are partial and are returned unchecked.
    pub async fn handle_test(&self, payload: Value, context: &Context) -> ProgressEvent {
        let test = match TestRequest::parse(&payload) {
            Ok(test) => test,
            Err(failure) => return self.reject(failure),
        };

        let region = test
            .region
            .clone()
            .filter(|region| !region.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let logical_resource_id = test.request.logical_resource_identifier.clone();

        let labels = InvocationLabels {
            action: test.action.clone(),
            resource_type: self.definition().type_name().to_string(),
            version: Some(TEST_TYPE_VERSION.to_string()),
            region: Some(region.clone()),
            stack_id: Some(TEST_STACK_ID.to_string()),
            logical_resource_id: logical_resource_id.clone(),
            request_id: context.request_id.clone(),
        };

        let log_group = test.log_group_name.as_deref().filter(|group| !group.is_empty());
        let provider_credentials = match log_group {
            Some(_) => default_chain_credentials(&region).await,
            None => None,
        };
        let instrumentation = self
            .inner
            .bootstrap
            .begin(labels, provider_credentials.as_ref(), log_group)
            .await;

        let invocation = Invocation {
            action: test.action,
            request_id: context.request_id.clone(),
            region,
            credentials: test.credentials,
            logical_resource_id: logical_resource_id.clone(),
        };
        let request = DispatchRequest {
            resource_properties: test.request.desired_resource_state,
            previous_resource_properties: test.request.previous_resource_state,
            type_configuration: test.request.type_configuration,
            callback_context: test.callback_context,
            next_token: test.request.next_token,
            logical_resource_id,
        };

        self.invoke(invocation, request, &instrumentation, true).await
    }

    fn reject(&self, failure: ValidationFailure) -> ProgressEvent {
        self.inner.bootstrap.default_logger().log(
            LogLevel::Error,
            "invalid request",
            Some(&json!({ "error": failure.explanation() })),
        );
        failure_response(&Failure::from(failure))
    }

    async fn invoke(
        &self,
        invocation: Invocation,
        request: DispatchRequest,
        instrumentation: &Instrumentation,
        revalidate: bool,
    ) -> ProgressEvent {
        let started = Instant::now();
        let action = match invocation.action.as_str() {
            "" => MISSING_ACTION_LABEL.to_string(),
            raw => raw.to_string(),
        };
        let metrics = &instrumentation.metrics;
        let logger = &instrumentation.logger;

        metrics.publish_invocation(Utc::now(), &action);

        let response = match self.run_dispatch(invocation, request, instrumentation, revalidate).await {
            Ok(response) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                metrics.publish_duration(Utc::now(), &action, elapsed);
                response
            }
            Err(failure) => {
                logger.log(
                    LogLevel::Error,
                    "handler invocation failed",
                    Some(&json!({ "error": failure.to_string() })),
                );
                if let Some(exception_type) = failure.exception_type() {
                    metrics.publish_exception(Utc::now(), &action, &exception_type);
                }
                failure_response(&failure)
            }
        };

        instrumentation.drain().await;
        response
    }

    async fn run_dispatch(
        &self,
        invocation: Invocation,
        request: DispatchRequest,
        instrumentation: &Instrumentation,
        revalidate: bool,
    ) -> Result<ProgressEvent, Failure> {
        let action = parse_action(&invocation.action)?;
        let ctx = HandlerContext::new(
            action,
            invocation.request_id,
            invocation.region,
            invocation.credentials,
            invocation.logical_resource_id,
            instrumentation.logger.clone(),
            instrumentation.metrics.clone(),
            Arc::clone(self.inner.dispatcher.definition()),
        );

        let dispatcher = self.inner.dispatcher.clone();
        let span = instrumentation.logger.span().clone();
        let task = tokio::spawn(async move { dispatcher.dispatch(request, &ctx).await }.instrument(span));

        let response = match task.await {
            Ok(result) => result?,
            Err(join) if join.is_panic() => return Err(Failure::from_panic(join.into_panic())),
            Err(join) => return Err(anyhow::Error::new(join).into()),
        };

        if revalidate {
            self.revalidate(action, &response)?;
        }
        Ok(response)
    }

    fn revalidate(&self, action: Action, response: &ProgressEvent) -> Result<(), ValidationFailure> {
        if action == Action::Read || response.status != OperationStatus::Success {
            return Ok(());
        }
        let Some(model) = &response.resource_model else {
            return Ok(());
        };
        self.definition()
            .schema()
            .ensure(model)
            .map(|_| ())
            .map_err(|failure| ValidationFailure::new("ResourceModel", failure.errors().to_vec()))
    }
}

/// Provider credentials from the default AWS chain, for local testing.
async fn default_chain_credentials(region: &str) -> Option<Credentials> {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    let provider = config.credentials_provider()?;
    match provider.provide_credentials().await {
        Ok(resolved) => Some(Credentials::new(
            resolved.access_key_id(),
            resolved.secret_access_key(),
            resolved.session_token().map(str::to_string),
        )),
        Err(err) => {
            warn!(error = %err, "could not resolve provider credentials, logging locally only");
            None
        }
    }
}
