//! Tracing initialization for resource provider Lambdas.
//!
//! Configures JSON-formatted tracing output suitable for CloudWatch Logs.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable controlling log verbosity.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Initialize tracing with JSON formatting for CloudWatch Logs.
///
/// Called by [`Resource::run`](crate::Resource::run) before the runtime loop
/// starts; calling it again is a no-op.
///
/// The log level is read from `LOG_LEVEL` using `EnvFilter` directive
/// syntax. Defaults to `info` if not set or unparsable.
///
/// # Example
///
/// ```no_run
/// use cfn_resource_lambda::init_tracing;
///
/// #[tokio::main]
/// async fn main() -> Result<(), lambda_runtime::Error> {
///     init_tracing();
///     // ... rest of Lambda setup
///     Ok(())
/// }
/// ```
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .flatten_event(true);

    // A subscriber may already be installed by the host or an earlier call.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
