//! Per-file progress notifications.

use serde::{Deserialize, Serialize};

/// One notification per completed conversion job.
///
/// The wire names (`progress`, `erro`) are what browser clients already
/// listen for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Human-readable outcome for the file, including its base name.
    pub message: String,
    /// Share of the batch completed so far, in `[0, 100]`.
    #[serde(rename = "progress")]
    pub percent_complete: f64,
    /// Whether this file failed.
    #[serde(rename = "erro")]
    pub is_error: bool,
}

impl ProgressEvent {
    /// Progress event for a file that converted successfully.
    pub fn converted(output_name: &str, percent_complete: f64) -> Self {
        Self {
            message: format!("Converted: {output_name}"),
            percent_complete,
            is_error: false,
        }
    }

    /// Progress event carrying a per-file failure message.
    pub fn failed(message: impl Into<String>, percent_complete: f64) -> Self {
        Self {
            message: message.into(),
            percent_complete,
            is_error: true,
        }
    }
}

/// Percentage of `completed` out of `total`, clamped to `[0, 100]`.
///
/// A zero total yields `0.0` rather than `NaN`.
pub fn percent_complete(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = completed as f64 / total as f64 * 100.0;
    pct.clamp(0.0, 100.0)
}
