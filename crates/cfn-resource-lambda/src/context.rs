//! Invocation-scoped state handed to resource callbacks.
//!
//! A [`HandlerContext`] is built fresh for every invocation and passed to
//! the callback explicitly, so concurrent invocations served by one process
//! never observe each other's logger, metrics, credentials or region.

use std::fmt;
use std::sync::Arc;

use aws_config::SdkConfig;
use cfn_resource_lib::{Action, Credentials, HandlerError, HandlerErrorCode, ResourceDefinition};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::events::HandlerResult;
use crate::telemetry::{sdk_config_for, InvocationLogger, MetricsPublisher};

/// Delay CloudFormation waits before re-invoking an in-progress handler.
pub const DEFAULT_CALLBACK_DELAY_SECONDS: u32 = 10;

/// Re-invocation details for an in-progress result.
#[derive(Debug, Clone, PartialEq)]
pub struct InProgressOptions {
    pub callback_context: Map<String, Value>,
    pub callback_delay_seconds: u32,
    pub message: Option<String>,
    pub error_code: Option<HandlerErrorCode>,
}

impl Default for InProgressOptions {
    fn default() -> Self {
        Self {
            callback_context: Map::new(),
            callback_delay_seconds: DEFAULT_CALLBACK_DELAY_SECONDS,
            message: None,
            error_code: None,
        }
    }
}

impl InProgressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback_context(mut self, callback_context: Map<String, Value>) -> Self {
        self.callback_context = callback_context;
        self
    }

    pub fn delay_seconds(mut self, seconds: u32) -> Self {
        self.callback_delay_seconds = seconds;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error_code(mut self, code: HandlerErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }
}

/// Everything a callback may use during one invocation.
pub struct HandlerContext {
    action: Action,
    request_id: String,
    region: String,
    credentials: Option<Credentials>,
    logical_resource_id: Option<String>,
    logger: InvocationLogger,
    metrics: MetricsPublisher,
    definition: Arc<ResourceDefinition>,
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("action", &self.action)
            .field("request_id", &self.request_id)
            .field("region", &self.region)
            .field("credentials", &self.credentials)
            .field("logical_resource_id", &self.logical_resource_id)
            .field("type_name", &self.definition.type_name())
            .finish()
    }
}

impl HandlerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action: Action,
        request_id: impl Into<String>,
        region: impl Into<String>,
        credentials: Option<Credentials>,
        logical_resource_id: Option<String>,
        logger: InvocationLogger,
        metrics: MetricsPublisher,
        definition: Arc<ResourceDefinition>,
    ) -> Self {
        Self {
            action,
            request_id: request_id.into(),
            region: region.into(),
            credentials,
            logical_resource_id,
            logger,
            metrics,
            definition,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Caller credentials for this invocation, if CloudFormation sent any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn logical_resource_id(&self) -> Option<&str> {
        self.logical_resource_id.as_deref()
    }

    pub fn logger(&self) -> &InvocationLogger {
        &self.logger
    }

    pub fn metrics(&self) -> &MetricsPublisher {
        &self.metrics
    }

    pub fn type_name(&self) -> &str {
        self.definition.type_name()
    }

    /// SDK configuration scoped to the caller credentials and region.
    pub fn sdk_config(&self) -> SdkConfig {
        let credentials = self.credentials.clone().unwrap_or_default();
        sdk_config_for(&credentials, &self.region)
    }

    /// Terminal CREATE success; `properties` must carry every identifier.
    pub fn created<T: Serialize>(&self, properties: &T) -> Result<HandlerResult, HandlerError> {
        self.complete(properties)
    }

    /// Terminal UPDATE success; `properties` must carry every identifier.
    pub fn updated<T: Serialize>(&self, properties: &T) -> Result<HandlerResult, HandlerError> {
        self.complete(properties)
    }

    /// READ result; `properties` must carry every identifier.
    pub fn read_result<T: Serialize>(&self, properties: &T) -> Result<HandlerResult, HandlerError> {
        self.complete(properties)
    }

    pub fn create_in_progress<T: Serialize>(
        &self,
        properties: &T,
        options: InProgressOptions,
    ) -> Result<HandlerResult, HandlerError> {
        self.in_progress(properties, options)
    }

    pub fn update_in_progress<T: Serialize>(
        &self,
        properties: &T,
        options: InProgressOptions,
    ) -> Result<HandlerResult, HandlerError> {
        self.in_progress(properties, options)
    }

    pub fn delete_in_progress<T: Serialize>(
        &self,
        properties: &T,
        options: InProgressOptions,
    ) -> Result<HandlerResult, HandlerError> {
        self.in_progress(properties, options)
    }

    pub fn deleted(&self) -> HandlerResult {
        HandlerResult::DeleteSuccess
    }

    /// A page of LIST results; every record must carry the identifiers.
    pub fn list_result<T: Serialize>(
        &self,
        records: &[T],
        next_token: Option<String>,
    ) -> Result<HandlerResult, HandlerError> {
        let resource_ids = records
            .iter()
            .map(|record| {
                let record = to_object(record)?;
                self.require_identifiers(&record)?;
                Ok(record)
            })
            .collect::<Result<Vec<_>, HandlerError>>()?;
        Ok(HandlerResult::ListSuccess {
            resource_ids,
            next_token,
        })
    }

    /// `AlreadyExists` error for CREATE.
    pub fn already_exists(&self, identifier: impl fmt::Display) -> HandlerError {
        HandlerError::already_exists(self.type_name(), &identifier.to_string())
    }

    pub fn not_found(&self, identifier: impl fmt::Display) -> HandlerError {
        HandlerError::not_found(self.type_name(), &identifier.to_string())
    }

    fn complete<T: Serialize>(&self, properties: &T) -> Result<HandlerResult, HandlerError> {
        let properties = to_object(properties)?;
        self.require_identifiers(&properties)?;
        Ok(HandlerResult::Success { properties })
    }

    fn in_progress<T: Serialize>(
        &self,
        properties: &T,
        options: InProgressOptions,
    ) -> Result<HandlerResult, HandlerError> {
        Ok(HandlerResult::InProgress {
            properties: to_object(properties)?,
            callback_context: options.callback_context,
            callback_delay_seconds: options.callback_delay_seconds,
            message: options.message,
            error_code: options.error_code,
        })
    }

    pub(crate) fn require_identifiers(&self, properties: &Map<String, Value>) -> Result<(), HandlerError> {
        let missing = self.definition.identifiers().missing_callback(properties);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::internal_failure(format!(
                "{} result is missing primary identifier(s): {}",
                self.type_name(),
                missing.join(", ")
            )))
        }
    }
}

fn to_object<T: Serialize>(properties: &T) -> Result<Map<String, Value>, HandlerError> {
    match serde_json::to_value(properties) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HandlerError::internal_failure(format!(
            "resource model must serialize to an object, got {other}"
        ))),
        Err(err) => Err(HandlerError::internal_failure(format!(
            "resource model could not be serialized: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tps_resource_schema;
    use serde_json::json;

    fn context() -> HandlerContext {
        let definition = ResourceDefinition::from_resource_schema(&tps_resource_schema()).unwrap();
        HandlerContext::new(
            Action::Create,
            "req-1",
            "eu-west-1",
            Some(Credentials::new("AKIA", "secret", None)),
            Some("MyReport".into()),
            InvocationLogger::local_default(),
            MetricsPublisher::disabled(),
            Arc::new(definition),
        )
    }

    #[test]
    fn created_requires_every_identifier() {
        let ctx = context();
        let err = ctx
            .created(&json!({"title": "My Title", "testCode": "NOT_STARTED"}))
            .unwrap_err();
        assert_eq!(err.code(), HandlerErrorCode::InternalFailure);
        assert!(err.message().contains("tpsCode"));

        let err = ctx.created(&json!({"tpsCode": null, "title": "x"})).unwrap_err();
        assert_eq!(err.code(), HandlerErrorCode::InternalFailure);

        let ok = ctx
            .created(&json!({"tpsCode": "123", "title": "My Title"}))
            .unwrap();
        assert!(matches!(ok, HandlerResult::Success { .. }));
    }

    #[test]
    fn in_progress_defaults_to_ten_second_delay() {
        let ctx = context();
        let result = ctx
            .create_in_progress(
                &json!({"title": "partial"}),
                InProgressOptions::new().message("waiting"),
            )
            .unwrap();
        match result {
            HandlerResult::InProgress {
                callback_delay_seconds,
                message,
                ..
            } => {
                assert_eq!(callback_delay_seconds, DEFAULT_CALLBACK_DELAY_SECONDS);
                assert_eq!(message.as_deref(), Some("waiting"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn list_records_must_carry_identifiers() {
        let ctx = context();
        assert!(ctx
            .list_result(&[json!({"tpsCode": "a"}), json!({"title": "b"})], None)
            .is_err());
        let page = ctx
            .list_result(&[json!({"tpsCode": "a"})], Some("next".into()))
            .unwrap();
        assert!(matches!(page, HandlerResult::ListSuccess { ref next_token, .. } if next_token.as_deref() == Some("next")));
    }

    #[test]
    fn non_object_models_are_rejected() {
        let err = context().updated(&"just a string").unwrap_err();
        assert_eq!(err.code(), HandlerErrorCode::InternalFailure);
    }

    #[test]
    fn already_exists_names_the_resource() {
        let err = context().already_exists("123");
        assert_eq!(err.code(), HandlerErrorCode::AlreadyExists);
        assert!(err.message().contains("Community::Testing::TPSReport"));
        assert!(err.message().contains("123"));
    }

    #[test]
    fn sdk_config_uses_invocation_region() {
        let config = context().sdk_config();
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
    }
}
