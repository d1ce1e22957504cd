//! Action dispatch.
//!
//! Each invocation takes exactly one pass through one branch:
//!
//! 1. validate properties and type configuration against the action's
//!    schema variant,
//! 2. build the [`CallbackEvent`] in callback casing,
//! 3. run the callback with the invocation's [`HandlerContext`],
//! 4. check the result against the action and convert it back to a wire
//!    [`ProgressEvent`].
//!
//! Every failure is returned to the caller; nothing here catches errors.

use std::sync::Arc;

use cfn_resource_lib::{
    Action, CompiledSchema, HandlerError, ProgressEvent, ResourceDefinition, ValidationFailure,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::context::HandlerContext;
use crate::events::{
    CallbackEvent, CreateEvent, DeleteEvent, HandlerResult, ListEvent, ReadEvent, UpdateEvent,
};
use crate::handlers::ResourceHandlers;

/// The raw, still wire-cased inputs of one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchRequest {
    pub resource_properties: Option<Value>,
    pub previous_resource_properties: Option<Value>,
    pub type_configuration: Option<Value>,
    pub callback_context: Option<Map<String, Value>>,
    pub next_token: Option<String>,
    pub logical_resource_id: Option<String>,
}

/// Parses the envelope's action, rejecting anything outside the five
/// lifecycle actions.
pub fn parse_action(raw: &str) -> Result<Action, HandlerError> {
    if raw.is_empty() {
        return Err(HandlerError::invalid_request("Was called without an action"));
    }
    raw.parse::<Action>()
        .map_err(|unknown| HandlerError::invalid_request(format!("Was called with unknown action {unknown}")))
}

#[derive(Clone)]
pub struct ActionDispatcher {
    definition: Arc<ResourceDefinition>,
    handlers: Arc<dyn ResourceHandlers>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("type_name", &self.definition.type_name())
            .finish_non_exhaustive()
    }
}

impl ActionDispatcher {
    pub fn new(definition: Arc<ResourceDefinition>, handlers: Arc<dyn ResourceHandlers>) -> Self {
        Self {
            definition,
            handlers,
        }
    }

    pub fn definition(&self) -> &Arc<ResourceDefinition> {
        &self.definition
    }

    /// Runs one invocation for `ctx.action()`.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        ctx: &HandlerContext,
    ) -> anyhow::Result<ProgressEvent> {
        let action = ctx.action();
        debug!(%action, "dispatching resource handler");

        let event = self.build_event(action, request)?;
        let result = match event {
            CallbackEvent::Create(event) => self.handlers.create(ctx, event).await?,
            CallbackEvent::Update(event) => self.handlers.update(ctx, event).await?,
            CallbackEvent::Delete(event) => self.handlers.delete(ctx, event).await?,
            CallbackEvent::Read(event) => self.handlers.read(ctx, event).await?,
            CallbackEvent::List(event) => self.handlers.list(ctx, event).await?,
        };

        Ok(self.normalize(action, result)?)
    }

    /// Validates the raw inputs and assembles the callback event.
    pub fn build_event(
        &self,
        action: Action,
        request: DispatchRequest,
    ) -> Result<CallbackEvent, ValidationFailure> {
        let definition = &self.definition;
        let type_configuration = self.callback_object(
            definition.type_configuration_schema(),
            request.type_configuration.as_ref(),
        )?;
        let logical_resource_id = request.logical_resource_id;

        let event = match action {
            Action::Create => {
                let mut properties =
                    ensure_object(definition.create_schema(), request.resource_properties.as_ref())?;
                let stripped = definition.identifiers().strip_wire(&mut properties);
                if !stripped.is_empty() {
                    debug!(identifiers = ?stripped, "ignoring identifier fields supplied to CREATE");
                }
                CallbackEvent::Create(CreateEvent {
                    properties: self.to_callback(properties),
                    type_configuration,
                    callback_context: request.callback_context,
                    logical_resource_id,
                })
            }
            Action::Update => {
                let properties = self.identified(definition.schema(), request.resource_properties.as_ref())?;
                let previous = request.previous_resource_properties.as_ref().ok_or_else(|| {
                    ValidationFailure::single(
                        "PreviousResourceProperties",
                        "previous resource properties are required for UPDATE",
                    )
                })?;
                let previous = self
                    .identified(definition.schema(), Some(previous))
                    .map_err(|failure| ValidationFailure::new("PreviousResourceProperties", failure.errors().to_vec()))?;
                CallbackEvent::Update(UpdateEvent {
                    properties: self.to_callback(properties),
                    previous_properties: self.to_callback(previous),
                    type_configuration,
                    callback_context: request.callback_context,
                    logical_resource_id,
                })
            }
            Action::Delete => {
                let properties = self.identified(definition.schema(), request.resource_properties.as_ref())?;
                CallbackEvent::Delete(DeleteEvent {
                    properties: self.to_callback(properties),
                    type_configuration,
                    callback_context: request.callback_context,
                    logical_resource_id,
                })
            }
            Action::Read => {
                let properties =
                    self.identified(definition.lookup_schema(), request.resource_properties.as_ref())?;
                let identifiers = definition.identifiers().project_wire(&properties);
                CallbackEvent::Read(ReadEvent {
                    identifiers: self.to_callback(identifiers),
                    type_configuration,
                    logical_resource_id,
                })
            }
            Action::List => CallbackEvent::List(ListEvent {
                type_configuration,
                next_token: request.next_token,
            }),
        };
        Ok(event)
    }

    /// Checks `result` against `action` and converts it to wire casing.
    pub fn normalize(&self, action: Action, result: HandlerResult) -> Result<ProgressEvent, HandlerError> {
        match (action, result) {
            (Action::Create | Action::Update | Action::Read, HandlerResult::Success { properties }) => {
                self.require_identifiers(action, &properties)?;
                Ok(ProgressEvent::success(Some(self.to_wire(properties))))
            }
            (
                Action::Create | Action::Update | Action::Delete,
                HandlerResult::InProgress {
                    properties,
                    callback_context,
                    callback_delay_seconds,
                    message,
                    error_code,
                },
            ) => Ok(ProgressEvent::in_progress(
                self.to_wire(properties),
                callback_context,
                callback_delay_seconds,
                message,
                error_code,
            )),
            (Action::Delete, HandlerResult::DeleteSuccess) => Ok(ProgressEvent::success(None)),
            (
                Action::List,
                HandlerResult::ListSuccess {
                    resource_ids,
                    next_token,
                },
            ) => {
                let models = resource_ids
                    .into_iter()
                    .map(|record| {
                        self.require_identifiers(action, &record)?;
                        Ok(self.to_wire(record))
                    })
                    .collect::<Result<Vec<_>, HandlerError>>()?;
                Ok(ProgressEvent::list_success(models, next_token))
            }
            (action, other) => Err(HandlerError::internal_failure(format!(
                "{action} handler returned {}, which is not a valid {action} result",
                other.kind()
            ))),
        }
    }

    fn require_identifiers(&self, action: Action, properties: &Map<String, Value>) -> Result<(), HandlerError> {
        let missing = self.definition.identifiers().missing_callback(properties);
        if missing.is_empty() {
            return Ok(());
        }
        Err(HandlerError::internal_failure(format!(
            "{action} result for {} is missing primary identifier(s): {}",
            self.definition.type_name(),
            missing.join(", ")
        )))
    }

    /// Validates against `schema` and requires every identifier.
    fn identified(
        &self,
        schema: &CompiledSchema,
        raw: Option<&Value>,
    ) -> Result<Map<String, Value>, ValidationFailure> {
        let properties = ensure_object(schema, raw)?;
        let missing = self.definition.identifiers().missing_wire(&properties);
        if missing.is_empty() {
            Ok(properties)
        } else {
            Err(ValidationFailure::single(
                schema.subject(),
                format!("missing required primary identifier(s): {}", missing.join(", ")),
            ))
        }
    }

    fn callback_object(
        &self,
        schema: &CompiledSchema,
        raw: Option<&Value>,
    ) -> Result<Map<String, Value>, ValidationFailure> {
        ensure_object(schema, raw).map(|map| self.to_callback(map))
    }

    fn to_callback(&self, map: Map<String, Value>) -> Map<String, Value> {
        match self.definition.casing().to_callback_case(&Value::Object(map)) {
            Value::Object(converted) => converted,
            _ => Map::new(),
        }
    }

    fn to_wire(&self, map: Map<String, Value>) -> Value {
        self.definition.casing().to_wire_case(&Value::Object(map))
    }
}

/// Validates `raw` (absent means `{}`) and requires an object.
fn ensure_object(schema: &CompiledSchema, raw: Option<&Value>) -> Result<Map<String, Value>, ValidationFailure> {
    let empty = json!({});
    let validated = schema.ensure(raw.unwrap_or(&empty))?;
    match validated {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationFailure::single(schema.subject(), "expected a JSON object")),
    }
}
