use crate::error::{ConfigError, RequestError};
use serde::{Deserialize, Serialize};
use shared::{DetectionSettings, Label};

/// Bounds and default for the per-request sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    pub min_threshold: f32,
    pub max_threshold: f32,
    pub default_threshold: f32,
    pub step: f32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            min_threshold: 0.1,
            max_threshold: 0.9,
            default_threshold: 0.5665,
            step: 0.05,
        }
    }
}

impl ThresholdPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Self {
            min_threshold: min,
            max_threshold: max,
            default_threshold: default,
            step,
        } = *self;
        let all_finite = [min, max, default, step].iter().all(|v| v.is_finite());
        if !all_finite || min < 0.0 || max > 1.0 || min > max {
            return Err(ConfigError::Invalid(format!(
                "threshold bounds must satisfy 0 <= min <= max <= 1, got [{}, {}]",
                min, max
            )));
        }
        if !(min..=max).contains(&default) {
            return Err(ConfigError::Invalid(format!(
                "default threshold {} is outside [{}, {}]",
                default, min, max
            )));
        }
        if step <= 0.0 {
            return Err(ConfigError::Invalid(format!("threshold step must be positive, got {}", step)));
        }
        Ok(())
    }

    /// Validates a caller-supplied sensitivity; `None` means the default.
    pub fn threshold(&self, value: Option<f32>) -> Result<Threshold, RequestError> {
        let value = value.unwrap_or(self.default_threshold);
        if !value.is_finite() || value < self.min_threshold || value > self.max_threshold {
            return Err(RequestError::ThresholdOutOfRange {
                value,
                min: self.min_threshold,
                max: self.max_threshold,
            });
        }
        Ok(Threshold(value))
    }

    pub fn settings(&self) -> DetectionSettings {
        DetectionSettings {
            min_threshold: self.min_threshold,
            max_threshold: self.max_threshold,
            default_threshold: self.default_threshold,
            step: self.step,
        }
    }
}

/// A sensitivity that passed [`ThresholdPolicy::threshold`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f32);

impl Threshold {
    pub fn value(self) -> f32 {
        self.0
    }
}

/// Fake iff the probability is strictly above the threshold.
pub fn decide(probability: f32, threshold: Threshold) -> Label {
    if probability > threshold.0 {
        Label::Fake
    } else {
        Label::Real
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionOutcome {
    pub probability: f32,
    pub label: Label,
}

impl DetectionOutcome {
    pub fn evaluate(probability: f32, threshold: Threshold) -> Self {
        Self {
            probability,
            label: decide(probability, threshold),
        }
    }
}
