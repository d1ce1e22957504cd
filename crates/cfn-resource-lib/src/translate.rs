//! Translation of raised failures into `FAILED` progress events.
//!
//! Precedence, first match wins:
//!
//! 1. a [`HandlerError`](crate::HandlerError) anywhere in the error chain keeps
//!    its code and message;
//! 2. a [`ValidationFailure`](crate::ValidationFailure) becomes
//!    `InvalidRequest` with the explanation followed by the error text;
//! 3. any other error becomes `GeneralServiceException` with its full
//!    diagnostic rendering;
//! 4. a panic payload becomes `InternalFailure`.

use std::backtrace::BacktraceStatus;

use crate::error::Failure;
use crate::response::{HandlerErrorCode, ProgressEvent};

/// Maps any failure to exactly one `FAILED` response. Never fails.
pub fn failure_response(failure: &Failure) -> ProgressEvent {
    if let Some(handler) = failure.handler_error() {
        return ProgressEvent::failed(handler.code(), handler.message());
    }

    if let Some(validation) = failure.validation_failure() {
        return ProgressEvent::failed(
            HandlerErrorCode::InvalidRequest,
            format!("{}\n{}", validation.explanation(), render_error(failure)),
        );
    }

    match failure {
        Failure::Error(_) => {
            ProgressEvent::failed(HandlerErrorCode::GeneralServiceException, render_error(failure))
        }
        Failure::Unhandled(payload) => ProgressEvent::failed(
            HandlerErrorCode::InternalFailure,
            format!("Unhandled Exception: {payload}"),
        ),
    }
}

/// `<type>: <message>` followed by the cause chain and, when one was
/// captured, the backtrace.
fn render_error(failure: &Failure) -> String {
    match failure {
        Failure::Error(err) => {
            let mut rendered = format!("Error: {err}");
            for cause in err.chain().skip(1) {
                rendered.push_str("\nCaused by: ");
                rendered.push_str(&cause.to_string());
            }
            let backtrace = err.backtrace();
            if backtrace.status() == BacktraceStatus::Captured {
                rendered.push_str("\nStack:\n");
                rendered.push_str(&backtrace.to_string());
            }
            rendered
        }
        Failure::Unhandled(payload) => payload.clone(),
    }
}
