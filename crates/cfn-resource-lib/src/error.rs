use thiserror::Error;

use crate::response::HandlerErrorCode;

/// Convenient result alias for resource configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while assembling a resource definition.
///
/// These are detected when the provider is constructed, never during an
/// invocation.
#[derive(Debug, Error)]
pub enum Error {
    /// A schema document could not be compiled into a validator.
    #[error("invalid {subject} schema: {message}")]
    InvalidSchema { subject: String, message: String },

    /// A primary identifier does not name a declared top-level property.
    #[error("primary identifier {name} is not a declared property of {type_name}")]
    UnknownIdentifier { name: String, type_name: String },

    /// The resource declares no primary identifier at all.
    #[error("resource type {type_name} declares no primary identifier")]
    EmptyPrimaryIdentifier { type_name: String },

    /// A `primaryIdentifier` entry is not a `/properties/<Name>` pointer.
    #[error("primary identifier pointer {pointer} must have the form /properties/<Name>")]
    InvalidIdentifierPointer { pointer: String },

    /// A required field is missing from a resource schema document.
    #[error("resource schema document is missing {field}")]
    MissingSchemaField { field: &'static str },

    /// `build()` was called before any callbacks were registered.
    #[error("no resource handlers registered for {type_name}")]
    HandlersNotRegistered { type_name: String },

    /// Wrapper for JSON errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A declared domain failure raised by a resource callback.
///
/// The code is propagated verbatim to CloudFormation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    code: HandlerErrorCode,
    message: String,
}

impl HandlerError {
    pub fn new(code: HandlerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> HandlerErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Raised during CREATE when the resource is already present.
    pub fn already_exists(type_name: &str, identifier: &str) -> Self {
        Self::new(
            HandlerErrorCode::AlreadyExists,
            format!("Resource of type '{type_name}' with identifier '{identifier}' already exists."),
        )
    }

    pub fn not_found(type_name: &str, identifier: &str) -> Self {
        Self::new(
            HandlerErrorCode::NotFound,
            format!("Resource of type '{type_name}' with identifier '{identifier}' was not found."),
        )
    }

    pub fn not_updatable(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorCode::NotUpdatable, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorCode::InvalidRequest, message)
    }

    pub fn internal_failure(message: impl Into<String>) -> Self {
        Self::new(HandlerErrorCode::InternalFailure, message)
    }
}

/// Raised when a value does not conform to its declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ValidationError: {subject} does not match its schema ({} error(s))", .errors.len())]
pub struct ValidationFailure {
    subject: String,
    explanation: String,
    errors: Vec<String>,
}

impl ValidationFailure {
    pub fn new(subject: impl Into<String>, errors: Vec<String>) -> Self {
        let subject = subject.into();
        let mut explanation = format!("{subject} is invalid:");
        for error in &errors {
            explanation.push_str("\n  - ");
            explanation.push_str(error);
        }
        Self {
            subject,
            explanation,
            errors,
        }
    }

    /// Validation failure with a single message.
    pub fn single(subject: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(subject, vec![error.into()])
    }

    /// Human-readable, multi-line explanation of every violation.
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Anything raised below an entry point's catch boundary.
#[derive(Debug)]
pub enum Failure {
    /// A real error value: declared, validation, or unclassified.
    Error(anyhow::Error),
    /// A panic payload, the analogue of a thrown non-error value.
    Unhandled(String),
}

impl Failure {
    /// Builds a failure from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let text = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "null".to_string()
        };
        Failure::Unhandled(text)
    }

    /// The first [`HandlerError`] in the error chain, if any.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            Failure::Error(err) => err
                .downcast_ref::<HandlerError>()
                .or_else(|| err.chain().find_map(|e| e.downcast_ref::<HandlerError>())),
            Failure::Unhandled(_) => None,
        }
    }

    /// The first [`ValidationFailure`] in the error chain, if any.
    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            Failure::Error(err) => err
                .downcast_ref::<ValidationFailure>()
                .or_else(|| err.chain().find_map(|e| e.downcast_ref::<ValidationFailure>())),
            Failure::Unhandled(_) => None,
        }
    }

    /// Exception type label used for metrics; `None` for panics.
    pub fn exception_type(&self) -> Option<String> {
        if let Some(handler) = self.handler_error() {
            return Some(handler.code().to_string());
        }
        if self.validation_failure().is_some() {
            return Some("ValidationError".to_string());
        }
        match self {
            Failure::Error(_) => Some("Error".to_string()),
            Failure::Unhandled(_) => None,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Error(err) => write!(f, "{err:#}"),
            Failure::Unhandled(payload) => write!(f, "unhandled panic: {payload}"),
        }
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Failure::Error(err)
    }
}

impl From<HandlerError> for Failure {
    fn from(err: HandlerError) -> Self {
        Failure::Error(err.into())
    }
}

impl From<ValidationFailure> for Failure {
    fn from(err: ValidationFailure) -> Self {
        Failure::Error(err.into())
    }
}
