//! Remote log stream provisioning.

use tracing::debug;

use super::metrics::telemetry_prefix;
use super::sink::{LogSink, SinkError};

/// Stream name for a resource type, qualified by the logical resource id
/// when one is known.
pub fn log_stream_name(resource_type: &str, logical_resource_id: Option<&str>) -> String {
    let prefix = telemetry_prefix(resource_type);
    match logical_resource_id.filter(|id| !id.is_empty()) {
        Some(id) => format!("{prefix}/{id}"),
        None => prefix,
    }
}

/// Makes sure `stream` exists in `group`, creating whatever is missing.
///
/// An existing stream is reused; a missing group is created first. Losing
/// a creation race (`AlreadyExists`) counts as success.
pub async fn ensure_log_stream(sink: &dyn LogSink, group: &str, stream: &str) -> Result<(), SinkError> {
    debug!(group, stream, "checking for log stream");
    match sink.find_log_stream(group, stream).await {
        Ok(Some(_)) => {
            debug!(group, stream, "found existing log stream");
            return Ok(());
        }
        Ok(None) => {}
        Err(SinkError::NotFound(_)) => {
            debug!(group, "no log group found, creating one");
            match sink.create_log_group(group).await {
                Ok(()) | Err(SinkError::AlreadyExists(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Err(err) => return Err(err),
    }

    match sink.create_log_stream(group, stream).await {
        Ok(()) => Ok(()),
        Err(SinkError::AlreadyExists(_)) => {
            debug!(group, stream, "log stream already exists");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
