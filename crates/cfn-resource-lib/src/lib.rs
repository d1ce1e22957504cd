//! CloudFormation resource provider engine.
//!
//! This crate holds the runtime-independent pieces of a resource provider:
//! validating inbound payloads against declared schemas, converting property
//! key casing between the wire contract and the callback-facing shape, the
//! wire request/response types, and the translation of any failure into a
//! typed `FAILED` response. The Lambda integration (`cfn-resource-lambda`)
//! composes these and should not reimplement them.
//!

pub mod case;
pub mod definition;
pub mod error;
pub mod identifiers;
pub mod request;
pub mod response;
pub mod schema;
pub mod translate;

pub use case::CaseTransformer;
pub use definition::ResourceDefinition;
pub use error::{Error, Failure, HandlerError, Result, ValidationFailure};
pub use identifiers::PrimaryKeySet;
pub use request::{
    Action, Credentials, Envelope, RequestContext, RequestData, TestRequest, TestRequestBody,
};
pub use response::{HandlerErrorCode, OperationStatus, ProgressEvent};
pub use schema::CompiledSchema;
pub use translate::failure_response;
