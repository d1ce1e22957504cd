//! Wire response shapes returned to CloudFormation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status of a handler invocation as seen by CloudFormation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

/// Closed taxonomy of handler failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerErrorCode {
    NotUpdatable,
    InvalidRequest,
    AccessDenied,
    InvalidCredentials,
    AlreadyExists,
    NotFound,
    ResourceConflict,
    Throttling,
    ServiceLimitExceeded,
    NotStabilized,
    GeneralServiceException,
    ServiceInternalError,
    NetworkFailure,
    InternalFailure,
    InvalidTypeConfiguration,
}

impl HandlerErrorCode {
    /// Every member of the taxonomy, in declaration order.
    pub const ALL: [HandlerErrorCode; 15] = [
        HandlerErrorCode::NotUpdatable,
        HandlerErrorCode::InvalidRequest,
        HandlerErrorCode::AccessDenied,
        HandlerErrorCode::InvalidCredentials,
        HandlerErrorCode::AlreadyExists,
        HandlerErrorCode::NotFound,
        HandlerErrorCode::ResourceConflict,
        HandlerErrorCode::Throttling,
        HandlerErrorCode::ServiceLimitExceeded,
        HandlerErrorCode::NotStabilized,
        HandlerErrorCode::GeneralServiceException,
        HandlerErrorCode::ServiceInternalError,
        HandlerErrorCode::NetworkFailure,
        HandlerErrorCode::InternalFailure,
        HandlerErrorCode::InvalidTypeConfiguration,
    ];

    /// The code exactly as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            HandlerErrorCode::NotUpdatable => "NotUpdatable",
            HandlerErrorCode::InvalidRequest => "InvalidRequest",
            HandlerErrorCode::AccessDenied => "AccessDenied",
            HandlerErrorCode::InvalidCredentials => "InvalidCredentials",
            HandlerErrorCode::AlreadyExists => "AlreadyExists",
            HandlerErrorCode::NotFound => "NotFound",
            HandlerErrorCode::ResourceConflict => "ResourceConflict",
            HandlerErrorCode::Throttling => "Throttling",
            HandlerErrorCode::ServiceLimitExceeded => "ServiceLimitExceeded",
            HandlerErrorCode::NotStabilized => "NotStabilized",
            HandlerErrorCode::GeneralServiceException => "GeneralServiceException",
            HandlerErrorCode::ServiceInternalError => "ServiceInternalError",
            HandlerErrorCode::NetworkFailure => "NetworkFailure",
            HandlerErrorCode::InternalFailure => "InternalFailure",
            HandlerErrorCode::InvalidTypeConfiguration => "InvalidTypeConfiguration",
        }
    }
}

impl fmt::Display for HandlerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound response for a single invocation.
///
/// Only four shapes are ever produced, one per constructor:
///
/// - [`ProgressEvent::success`]: `SUCCESS` with an optional resource model
///   (absent for DELETE).
/// - [`ProgressEvent::in_progress`]: `IN_PROGRESS` with a partial model and
///   the callback context for the next invocation.
/// - [`ProgressEvent::list_success`]: `SUCCESS` with a page of models and the
///   pagination token.
/// - [`ProgressEvent::failed`]: `FAILED` with an error code and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProgressEvent {
    pub status: OperationStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<HandlerErrorCode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_model: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_models: Option<Vec<Value>>,

    /// Present on list responses; `null` once the listing is exhausted.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "list_token"
    )]
    pub next_token: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_context: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_delay_seconds: Option<u32>,
}

impl ProgressEvent {
    fn empty(status: OperationStatus) -> Self {
        Self {
            status,
            error_code: None,
            message: None,
            resource_model: None,
            resource_models: None,
            next_token: None,
            callback_context: None,
            callback_delay_seconds: None,
        }
    }

    /// Terminal success, carrying the model when the action has one.
    pub fn success(resource_model: Option<Value>) -> Self {
        Self {
            resource_model,
            ..Self::empty(OperationStatus::Success)
        }
    }

    /// Non-terminal progress; CloudFormation re-invokes with `callback_context`.
    pub fn in_progress(
        resource_model: Value,
        callback_context: Map<String, Value>,
        callback_delay_seconds: u32,
        message: Option<String>,
        error_code: Option<HandlerErrorCode>,
    ) -> Self {
        Self {
            resource_model: Some(resource_model),
            callback_context: Some(callback_context),
            callback_delay_seconds: Some(callback_delay_seconds),
            message,
            error_code,
            ..Self::empty(OperationStatus::InProgress)
        }
    }

    /// A page of listed models.
    pub fn list_success(resource_models: Vec<Value>, next_token: Option<String>) -> Self {
        Self {
            resource_models: Some(resource_models),
            next_token: Some(next_token),
            ..Self::empty(OperationStatus::Success)
        }
    }

    /// Terminal failure.
    pub fn failed(error_code: HandlerErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(error_code),
            message: Some(message.into()),
            ..Self::empty(OperationStatus::Failed)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed
    }
}

/// `NextToken` is serialized as an explicit `null` on exhausted listings.
mod list_token {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(Some(token)) => serializer.serialize_str(token),
            _ => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_serializes_code_and_message_only() {
        let event = ProgressEvent::failed(HandlerErrorCode::NotFound, "gone");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"Status": "FAILED", "ErrorCode": "NotFound", "Message": "gone"})
        );
    }

    #[test]
    fn exhausted_list_serializes_null_token() {
        let event = ProgressEvent::list_success(vec![json!({"Id": "a"})], None);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["NextToken"], Value::Null);
        assert!(value.as_object().unwrap().contains_key("NextToken"));
        assert_eq!(value["ResourceModels"], json!([{"Id": "a"}]));
    }

    #[test]
    fn delete_success_has_no_model() {
        let value = serde_json::to_value(ProgressEvent::success(None)).unwrap();
        assert_eq!(value, json!({"Status": "SUCCESS"}));
    }

    #[test]
    fn in_progress_carries_callback_fields() {
        let mut context = Map::new();
        context.insert("step".into(), json!("wait"));
        let event = ProgressEvent::in_progress(json!({"Title": "t"}), context, 10, None, None);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["Status"], "IN_PROGRESS");
        assert_eq!(value["CallbackContext"], json!({"step": "wait"}));
        assert_eq!(value["CallbackDelaySeconds"], 10);
    }

    #[test]
    fn error_code_wire_names_match_display() {
        for code in HandlerErrorCode::ALL {
            let value = serde_json::to_value(code).unwrap();
            assert_eq!(value, Value::String(code.to_string()));
        }
    }
}
