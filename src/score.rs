use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// Calibration constants for turning distances into scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreConfig {
    /// Accumulated DTW cost worth one point.
    pub calibration_divisor: f64,
    /// Points lost per unit of per-frame distance on the timeline.
    pub timeline_sensitivity: f64,
    /// How strongly a motion variance mismatch reduces a group score.
    pub synchrony_weight: f64,
    /// Lower bound of the synchrony factor.
    pub synchrony_floor: f64,
    /// Divides the normalized DTW distance when cosine distance is undefined.
    pub fallback_divisor: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            calibration_divisor: 50.0,
            timeline_sensitivity: 10.0,
            synchrony_weight: 5.0,
            synchrony_floor: 0.8,
            fallback_divisor: 100.0,
        }
    }
}

/// Clamp into [0, 100]. NaN becomes the minimum score.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        MIN_SCORE
    } else {
        score.clamp(MIN_SCORE, MAX_SCORE)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

fn require(field: &'static str, expected: &'static str, value: f64, ok: bool) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidScoreConfig {
            field,
            expected,
            value,
        })
    }
}

impl ScoreConfig {
    /// Reject constants that would turn every score into NaN or make the
    /// mappings meaningless.
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v > 0.0 && v.is_finite();
        require(
            "calibration_divisor",
            "positive",
            self.calibration_divisor,
            positive(self.calibration_divisor),
        )?;
        require(
            "timeline_sensitivity",
            "positive",
            self.timeline_sensitivity,
            positive(self.timeline_sensitivity),
        )?;
        require(
            "fallback_divisor",
            "positive",
            self.fallback_divisor,
            positive(self.fallback_divisor),
        )?;
        require(
            "synchrony_weight",
            "non-negative",
            self.synchrony_weight,
            self.synchrony_weight >= 0.0 && self.synchrony_weight.is_finite(),
        )?;
        require(
            "synchrony_floor",
            "within [0, 1]",
            self.synchrony_floor,
            (0.0..=1.0).contains(&self.synchrony_floor),
        )
    }

    /// Score a whole performance from its accumulated alignment cost.
    pub fn whole_sequence_score(&self, distance: f64) -> f64 {
        round_to(
            clamp_score(MAX_SCORE - distance / self.calibration_divisor),
            2,
        )
    }

    /// Score every frame from its distance to the matching reference frame.
    pub fn timeline_scores(&self, distances: &[f64]) -> Vec<f64> {
        distances
            .iter()
            .map(|&d| clamp_score(MAX_SCORE - d * self.timeline_sensitivity))
            .collect()
    }

    /// Multiplier in `[synchrony_floor, 1]` penalizing groups whose overall
    /// movement energy differs from the reference.
    pub fn synchrony_factor(&self, var_standard: f64, var_user: f64) -> f64 {
        let factor = 1.0 - (var_standard - var_user).abs() * self.synchrony_weight;
        if factor.is_nan() {
            self.synchrony_floor
        } else {
            factor.clamp(self.synchrony_floor, 1.0)
        }
    }

    /// Score a group performance from the aggregated pose difference and each
    /// side's motion variance.
    pub fn group_score(&self, diff: f64, var_standard: f64, var_user: f64) -> f64 {
        let base = clamp_score(MAX_SCORE - diff * 100.0);
        let sync = self.synchrony_factor(var_standard, var_user);
        round_to(clamp_score(base * sync), 1)
    }
}
