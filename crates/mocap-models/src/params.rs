//! Tuning parameters submitted with a job.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Optional tuning parameters for one conversion job.
///
/// Every field is optional; unset values fall back to the service defaults
/// at the point the pipeline builds its tool invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobParams {
    /// Subject id to extract (defaults to the longest tracked subject)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u32>,

    /// Output frame rate
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 120))]
    pub fps: Option<u32>,

    /// Whether root motion is baked into the exported rig
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_root_motion: Option<bool>,

    /// Camera scale applied during export
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.01, max = 10.0))]
    pub cam_scale: Option<f64>,

    /// Temporal smoothing strength
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub smoothing_strength: Option<f64>,

    /// Smoothing window size (odd, in frames)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_window"))]
    pub smoothing_window: Option<u32>,

    /// Camera EMA smoothing coefficient
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub smoothing_ema: Option<f64>,
}

fn validate_window(window: u32) -> Result<(), ValidationError> {
    if !(3..=31).contains(&window) {
        return Err(ValidationError::new("smoothing_window_out_of_range"));
    }
    if window % 2 == 0 {
        return Err(ValidationError::new("smoothing_window_must_be_odd"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(JobParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_fps() {
        let params = JobParams {
            fps: Some(500),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_even_smoothing_window() {
        let params = JobParams {
            smoothing_window: Some(8),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = JobParams {
            smoothing_window: Some(9),
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }
}
