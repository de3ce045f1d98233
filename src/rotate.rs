//! Steady spin about an object's local up axis.

use glam::Quat;

use crate::config::clamp_setting;

/// Fastest allowed spin, in degrees per second.
pub const MAX_SPEED: f32 = 90.0;

/// Spins an object about its local up axis at a steady rate.
///
/// Disabled rotators leave the rotation untouched.
///
/// # Example
/// ```
/// use glimmer::{Quat, Rotator};
///
/// let mut spin = Rotator::new().enabled(true).speed(90.0);
/// let rotation = spin.advance(Quat::IDENTITY, 1.0);
/// assert!(rotation.abs_diff_eq(Quat::from_rotation_y(90f32.to_radians()), 1e-6));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotator {
    enabled: bool,
    /// Degrees per second.
    speed: f32,
}

impl Default for Rotator {
    fn default() -> Self {
        Self {
            enabled: false,
            speed: 45.0,
        }
    }
}

impl Rotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the speed in degrees per second, clamped to `[0, MAX_SPEED]`.
    pub fn speed(mut self, speed: f32) -> Self {
        self.set_speed(speed);
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = clamp_setting("rotator speed", speed, 0.0, MAX_SPEED, self.speed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_speed(&self) -> f32 {
        self.speed
    }

    /// Applies `dt` seconds of spin to `rotation`, about its local +Y.
    pub fn advance(&self, rotation: Quat, dt: f32) -> Quat {
        if !self.enabled {
            return rotation;
        }
        rotation * Quat::from_rotation_y((self.speed * dt).to_radians())
    }
}
