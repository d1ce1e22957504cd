//! Callback-facing events and results.
//!
//! Every key in these payloads is already in callback casing; the
//! dispatcher converts on the way in and out.

use cfn_resource_lib::{Action, HandlerErrorCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

fn decode<T: DeserializeOwned>(map: &Map<String, Value>) -> serde_json::Result<T> {
    serde_json::from_value(Value::Object(map.clone()))
}

/// Input to the CREATE callback.
///
/// Primary identifier fields are never present: they are assigned by the
/// callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateEvent {
    pub properties: Map<String, Value>,
    pub type_configuration: Map<String, Value>,
    pub callback_context: Option<Map<String, Value>>,
    pub logical_resource_id: Option<String>,
}

/// Input to the UPDATE callback; both states carry every identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub properties: Map<String, Value>,
    pub previous_properties: Map<String, Value>,
    pub type_configuration: Map<String, Value>,
    pub callback_context: Option<Map<String, Value>>,
    pub logical_resource_id: Option<String>,
}

/// Input to the DELETE callback.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteEvent {
    pub properties: Map<String, Value>,
    pub type_configuration: Map<String, Value>,
    pub callback_context: Option<Map<String, Value>>,
    pub logical_resource_id: Option<String>,
}

/// Input to the READ callback: only the identifier fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadEvent {
    pub identifiers: Map<String, Value>,
    pub type_configuration: Map<String, Value>,
    pub logical_resource_id: Option<String>,
}

/// Input to the LIST callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEvent {
    pub type_configuration: Map<String, Value>,
    /// Token returned by the previous page, if any.
    pub next_token: Option<String>,
}

impl CreateEvent {
    pub fn properties_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.properties)
    }

    pub fn type_configuration_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.type_configuration)
    }
}

impl UpdateEvent {
    pub fn properties_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.properties)
    }

    pub fn previous_properties_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.previous_properties)
    }

    pub fn type_configuration_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.type_configuration)
    }
}

impl DeleteEvent {
    pub fn properties_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.properties)
    }

    pub fn type_configuration_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.type_configuration)
    }
}

impl ReadEvent {
    pub fn identifiers_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.identifiers)
    }

    pub fn type_configuration_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.type_configuration)
    }
}

impl ListEvent {
    pub fn type_configuration_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.type_configuration)
    }
}

/// The normalized event for one action.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    Create(CreateEvent),
    Update(UpdateEvent),
    Delete(DeleteEvent),
    Read(ReadEvent),
    List(ListEvent),
}

impl CallbackEvent {
    pub fn action(&self) -> Action {
        match self {
            CallbackEvent::Create(_) => Action::Create,
            CallbackEvent::Update(_) => Action::Update,
            CallbackEvent::Delete(_) => Action::Delete,
            CallbackEvent::Read(_) => Action::Read,
            CallbackEvent::List(_) => Action::List,
        }
    }
}

/// What a callback returns.
///
/// Prefer the constructors on [`HandlerContext`](crate::HandlerContext),
/// which check identifier completeness up front.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
    /// Terminal success for CREATE, UPDATE or READ.
    Success { properties: Map<String, Value> },

    /// Work continues; CloudFormation re-invokes with `callback_context`.
    InProgress {
        properties: Map<String, Value>,
        callback_context: Map<String, Value>,
        callback_delay_seconds: u32,
        message: Option<String>,
        error_code: Option<HandlerErrorCode>,
    },

    /// Terminal success for DELETE.
    DeleteSuccess,

    /// A page of LIST results.
    ListSuccess {
        resource_ids: Vec<Map<String, Value>>,
        next_token: Option<String>,
    },
}

impl HandlerResult {
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerResult::Success { .. } => "Success",
            HandlerResult::InProgress { .. } => "InProgress",
            HandlerResult::DeleteSuccess => "DeleteSuccess",
            HandlerResult::ListSuccess { .. } => "ListSuccess",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Report {
        title: String,
        test_code: String,
        #[serde(default)]
        tps_code: Option<String>,
    }

    #[test]
    fn properties_deserialize_into_typed_models() {
        let event = CreateEvent {
            properties: json!({"title": "My Title", "testCode": "NOT_STARTED"})
                .as_object()
                .cloned()
                .unwrap(),
            type_configuration: Map::new(),
            callback_context: None,
            logical_resource_id: None,
        };
        let report: Report = event.properties_as().unwrap();
        assert_eq!(report.title, "My Title");
        assert_eq!(report.test_code, "NOT_STARTED");
        assert_eq!(report.tps_code, None);
        assert_eq!(CallbackEvent::Create(event).action(), Action::Create);
    }
}
