//! Configuration errors and value sanitising shared by the pipelines and the solver.

use thiserror::Error;

/// A configuration the host tried to apply is invalid.
///
/// These are raised when a value is set, never in the middle of a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{effect} has no pass {index} (defined passes: 0..{passes})")]
    UnknownPass {
        effect: &'static str,
        index: u32,
        passes: u32,
    },
    #[error("joint angle bounds are inverted: min {min} > max {max}")]
    InvertedAngleBounds { min: f32, max: f32 },
    #[error("joint axis must be a finite, non-zero vector")]
    DegenerateAxis,
    #[error("solver parameter `{name}` has invalid value {value}")]
    InvalidSolverParameter { name: &'static str, value: f32 },
}

/// Clamps `value` into `[min, max]`, keeping `current` when `value` is not finite.
pub(crate) fn clamp_setting(name: &str, value: f32, min: f32, max: f32, current: f32) -> f32 {
    if !value.is_finite() {
        log::warn!("Ignoring non-finite value {value} for `{name}`, keeping {current}");
        return current;
    }
    value.clamp(min, max)
}
