//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one document on stdout: the
//! command's result on success, or the error object on failure.

use anyhow::{Context, Result};
use serde::Serialize;

/// Format the error object printed when a command fails.
///
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "...",
///   "stage": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str, stage: Option<&str>) -> Result<String> {
    let mut obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    if let Some(stage) = stage {
        obj["stage"] = serde_json::Value::from(stage);
    }
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Print a serializable result as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("JSON serialization failed")?
    );
    Ok(())
}
