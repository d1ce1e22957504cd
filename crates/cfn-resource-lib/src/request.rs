//! Inbound request types for the production and test entry points.
//!
//! Every struct tolerates unknown fields so new CloudFormation request
//! attributes never break a deployed provider.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationFailure;

/// The five resource lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Read => "READ",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::List => "LIST",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Action::Create),
            "READ" => Ok(Action::Read),
            "UPDATE" => Ok(Action::Update),
            "DELETE" => Ok(Action::Delete),
            "LIST" => Ok(Action::List),
            other => Err(other.to_string()),
        }
    }
}

/// Short-lived AWS credentials scoped to one invocation.
///
/// `Debug` never prints secret material, and the type is not
/// `Serialize`.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    #[serde(default, alias = "accessKeyId")]
    pub access_key_id: Option<String>,
    #[serde(default, alias = "secretAccessKey")]
    pub secret_access_key: Option<String>,
    #[serde(default, alias = "sessionToken")]
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: Some(access_key_id.into()),
            secret_access_key: Some(secret_access_key.into()),
            session_token,
        }
    }

    /// Credentials are only usable when an access key id is present.
    pub fn has_access_key(&self) -> bool {
        self.access_key_id
            .as_deref()
            .is_some_and(|key| !key.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "[REDACTED]"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "[REDACTED]"))
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Re-invocation bookkeeping sent by CloudFormation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestContext {
    #[serde(default)]
    pub invocation: Option<u64>,
    #[serde(default)]
    pub callback_context: Option<Value>,
    #[serde(default)]
    pub cloud_watch_events_rule_name: Option<String>,
    #[serde(default)]
    pub cloud_watch_events_target_id: Option<String>,
}

/// Payload section of the envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestData {
    #[serde(default)]
    pub logical_resource_id: Option<String>,
    #[serde(default)]
    pub caller_credentials: Option<Credentials>,
    #[serde(default)]
    pub provider_credentials: Option<Credentials>,
    #[serde(default)]
    pub resource_properties: Option<Value>,
    #[serde(default, alias = "OldResourceProperties")]
    pub previous_resource_properties: Option<Value>,
    #[serde(default)]
    pub provider_log_group_name: Option<String>,
    #[serde(default)]
    pub system_tags: Option<Map<String, Value>>,
    #[serde(default)]
    pub stack_tags: Option<Map<String, Value>>,
    #[serde(default)]
    pub type_configuration: Option<Value>,
}

/// The validated top-level invocation request.
///
/// `action` is kept as the raw string so an unrecognised value is reported
/// by the dispatcher, with telemetry in place, instead of being rejected as
/// malformed input.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope {
    /// Empty when the event carries no action.
    #[serde(default, deserialize_with = "action_text")]
    pub action: String,
    pub region: String,
    pub resource_type: String,
    #[serde(default)]
    pub resource_type_version: Option<String>,
    #[serde(default, rename = "AWSAccountId")]
    pub aws_account_id: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub request_type: Option<String>,
    #[serde(default, alias = "StackID")]
    pub stack_id: Option<String>,
    #[serde(default)]
    pub callback_context: Option<Value>,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
    pub request_data: RequestData,
    #[serde(default)]
    pub next_token: Option<String>,
}

impl Envelope {
    /// Parses and validates a raw production event.
    pub fn parse(raw: &Value) -> Result<Self, ValidationFailure> {
        if !raw.is_object() {
            return Err(ValidationFailure::single(
                "Request",
                format!("expected a JSON object, got {}", kind_of(raw)),
            ));
        }
        Self::deserialize(raw).map_err(|e| ValidationFailure::single("Request", e.to_string()))
    }

    /// Callback context from either the top level or the request context.
    pub fn callback_context(&self) -> Option<Map<String, Value>> {
        let top = self.callback_context.as_ref();
        let nested = self
            .request_context
            .as_ref()
            .and_then(|ctx| ctx.callback_context.as_ref());
        top.or(nested).and_then(|value| value.as_object().cloned())
    }
}

/// Simplified request accepted by the local-testing entry point.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default, deserialize_with = "action_text")]
    pub action: String,
    pub request: TestRequestBody,
    #[serde(default)]
    pub callback_context: Option<Map<String, Value>>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub log_group_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequestBody {
    #[serde(default)]
    pub client_request_token: Option<String>,
    #[serde(default)]
    pub desired_resource_state: Option<Value>,
    #[serde(default)]
    pub previous_resource_state: Option<Value>,
    #[serde(default)]
    pub logical_resource_identifier: Option<String>,
    #[serde(default)]
    pub type_configuration: Option<Value>,
    #[serde(default)]
    pub next_token: Option<String>,
}

impl TestRequest {
    /// Parses and validates a raw test event.
    pub fn parse(raw: &Value) -> Result<Self, ValidationFailure> {
        if !raw.is_object() {
            return Err(ValidationFailure::single(
                "TestRequest",
                format!("expected a JSON object, got {}", kind_of(raw)),
            ));
        }
        Self::deserialize(raw).map_err(|e| ValidationFailure::single("TestRequest", e.to_string()))
    }
}

/// Reads an action as text; `null` becomes empty and any other non-string
/// value is rendered as JSON, so dispatch can report it.
fn action_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(action) => action,
        other => other.to_string(),
    })
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
