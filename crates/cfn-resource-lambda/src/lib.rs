//! AWS Lambda runtime for CloudFormation resource providers.
//!
//! This crate wires the engine pieces of `cfn-resource-lib` into a Lambda
//! function:
//!
//! - [`ResourceBuilder`] / [`Resource`]: two-phase assembly and the
//!   production and test entry points
//! - [`ResourceHandlers`]: the callback set a provider implements
//! - [`HandlerContext`]: per-invocation logger, metrics, credentials and
//!   result helpers handed to every callback
//! - [`ActionDispatcher`]: validation, casing and result normalization for
//!   the five lifecycle actions
//! - [`telemetry`]: CloudWatch metrics and provider log delivery
//! - [`init_tracing`]: JSON-formatted tracing for CloudWatch Logs
//!
//! # Example
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     ResourceBuilder::from_resource_schema(&serde_json::from_str(SCHEMA)?)?
//!         .handlers(Reports)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides a fixture resource schema and
//! in-memory telemetry sinks. Enable the `test-utils` feature to access it
//! from dependent crates.

mod context;
mod dispatch;
mod events;
mod handlers;
mod resource;
pub mod telemetry;
mod tracing_init;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use context::{HandlerContext, InProgressOptions, DEFAULT_CALLBACK_DELAY_SECONDS};
pub use dispatch::{parse_action, ActionDispatcher, DispatchRequest};
pub use events::{
    CallbackEvent, CreateEvent, DeleteEvent, HandlerResult, ListEvent, ReadEvent, UpdateEvent,
};
pub use handlers::ResourceHandlers;
pub use resource::{Resource, ResourceBuilder, MISSING_ACTION_LABEL, TEST_STACK_ID, TEST_TYPE_VERSION};
pub use tracing_init::{init_tracing, LOG_LEVEL_ENV};

pub use cfn_resource_lib::{
    Action, Credentials, HandlerError, HandlerErrorCode, OperationStatus, ProgressEvent,
    ResourceDefinition,
};
