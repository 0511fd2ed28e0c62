//! JSON rendering of operation results.
//!
//! A successful result is rendered as the value itself, a failed one as the
//! `{"error": "..."}` payload, so callers never need to tell the two apart
//! by anything other than the presence of the `error` key.

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::error::ServiceError;

/// Serializes `result` as JSON, pretty-printed when `pretty` is set.
pub fn render<T: Serialize>(result: &Result<T, ServiceError>, pretty: bool) -> Result<String> {
    let value = match result {
        Ok(value) => serde_json::to_value(value)?,
        Err(e) => {
            debug!(error = %e, "Rendering error payload");
            serde_json::to_value(e.to_payload())?
        }
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok(rendered)
}
