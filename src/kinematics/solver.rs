//! Gradient-descent inverse kinematics.
//!
//! Each call to [`IkSolver::solve`] makes one sweep over the chain, tip to
//! root, nudging every joint angle against a forward-difference estimate of
//! the distance gradient. The host calls it once per simulation tick and then
//! applies the pose; a reachable target is approached over successive ticks.

use glam::{Quat, Vec3};

use super::joint::JointChain;
use crate::config::ConfigError;

/// Solver tunables.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkConfig {
    sampling_distance: f32,
    learning_rate: f32,
    distance_threshold: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            sampling_distance: 0.1,
            learning_rate: 10.0,
            distance_threshold: 0.05,
        }
    }
}

impl IkConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSolverParameter`] for a non-positive
    /// sampling distance or a negative or non-finite value.
    pub fn new(
        sampling_distance: f32,
        learning_rate: f32,
        distance_threshold: f32,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.set_sampling_distance(sampling_distance)?;
        config.set_learning_rate(learning_rate)?;
        config.set_distance_threshold(distance_threshold)?;
        Ok(config)
    }

    /// Angle step in degrees used to probe each joint's gradient.
    pub fn sampling_distance(&self) -> f32 {
        self.sampling_distance
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Distance below which the target counts as reached.
    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    pub fn set_sampling_distance(&mut self, value: f32) -> Result<(), ConfigError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid("sampling_distance", value));
        }
        self.sampling_distance = value;
        Ok(())
    }

    pub fn set_learning_rate(&mut self, value: f32) -> Result<(), ConfigError> {
        self.learning_rate = non_negative("learning_rate", value)?;
        Ok(())
    }

    pub fn set_distance_threshold(&mut self, value: f32) -> Result<(), ConfigError> {
        self.distance_threshold = non_negative("distance_threshold", value)?;
        Ok(())
    }
}

fn invalid(name: &'static str, value: f32) -> ConfigError {
    ConfigError::InvalidSolverParameter { name, value }
}

fn non_negative(name: &'static str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(name, value))
    }
}

/// Result of one [`IkSolver::solve`] call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SolveStatus {
    /// The target was already within the threshold; nothing changed.
    AlreadyConverged,
    /// The sweep reached the target after updating joint `joint`.
    Converged { joint: usize },
    /// A full sweep ran; `distance` is what remains.
    Stepped { distance: f32 },
}

impl SolveStatus {
    pub fn is_converged(self) -> bool {
        !matches!(self, SolveStatus::Stepped { .. })
    }
}

/// Finite-difference gradient-descent solver for a [`JointChain`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IkSolver {
    config: IkConfig,
}

impl IkSolver {
    pub fn new(config: IkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IkConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: IkConfig) {
        self.config = config;
    }

    /// End-effector position for the chain's current angles.
    ///
    /// Each joint's rotation applies to the offsets of the joints after it, so
    /// the last joint's angle does not move the end effector.
    pub fn forward_kinematics<B>(chain: &JointChain<B>) -> Vec3 {
        let joints = chain.joints();
        let mut position = chain.origin();
        let mut rotation = Quat::IDENTITY;
        for i in 1..joints.len() {
            rotation *= chain.local_rotation(i - 1);
            position += rotation * joints[i].rest_offset();
        }
        position
    }

    pub fn distance_from_target<B>(chain: &JointChain<B>, target: Vec3) -> f32 {
        Self::forward_kinematics(chain).distance(target)
    }

    /// Forward-difference derivative of the target distance with respect to
    /// joint `index`'s angle. The angle is restored before returning.
    pub fn partial_gradient<B>(&self, chain: &mut JointChain<B>, target: Vec3, index: usize) -> f32 {
        let Some(angle) = chain.angle(index) else {
            return 0.0;
        };
        let step = self.config.sampling_distance;
        let base = Self::distance_from_target(chain, target);

        chain.angles_mut()[index] = angle + step;
        let probed = Self::distance_from_target(chain, target);
        chain.angles_mut()[index] = angle;

        (probed - base) / step
    }

    /// Runs one descent sweep from the last joint to the first.
    ///
    /// A target that is not finite leaves the chain untouched.
    pub fn solve<B>(&self, chain: &mut JointChain<B>, target: Vec3) -> SolveStatus {
        let threshold = self.config.distance_threshold;
        let distance = Self::distance_from_target(chain, target);
        if !target.is_finite() || !distance.is_finite() {
            log::warn!("Ignoring IK target {target}: distance {distance} is not finite");
            return SolveStatus::Stepped { distance };
        }
        if distance < threshold {
            return SolveStatus::AlreadyConverged;
        }

        for i in (0..chain.len()).rev() {
            let gradient = self.partial_gradient(chain, target, i);
            if !gradient.is_finite() {
                continue;
            }
            let angle = chain.angles()[i] - self.config.learning_rate * gradient;
            chain.set_angle(i, angle);

            if Self::distance_from_target(chain, target) < threshold {
                return SolveStatus::Converged { joint: i };
            }
        }

        let distance = Self::distance_from_target(chain, target);
        log::trace!("IK sweep left {distance} to target");
        SolveStatus::Stepped { distance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::armature::Armature;
    use crate::kinematics::joint::{Axis, Joint};

    /// Three unit bones straight up: axes X, Y, Z with the origin at (0, 1, 0).
    fn arm() -> JointChain {
        let (armature, root) = Armature::linear(&[Vec3::Y, Vec3::Y, Vec3::Y]);
        JointChain::from_hierarchy(&armature, root)
    }

    fn pose_target(degrees: f32) -> Vec3 {
        let a = degrees.to_radians();
        Vec3::new(0.0, 1.0 + 2.0 * a.cos(), 2.0 * a.sin())
    }

    #[test]
    fn forward_kinematics_follows_rest_pose() {
        let chain = arm();
        assert!((IkSolver::forward_kinematics(&chain) - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn last_joint_angle_does_not_move_the_tip() {
        let mut chain = arm();
        let rest = IkSolver::forward_kinematics(&chain);
        chain.set_angle(2, 30.0);
        assert!((IkSolver::forward_kinematics(&chain) - rest).length() < 1e-6);

        chain.set_angle(0, 20.0);
        assert!((IkSolver::forward_kinematics(&chain) - pose_target(20.0)).length() < 1e-5);
    }

    #[test]
    fn empty_chain_sits_at_its_origin() {
        let mut chain = JointChain::<crate::BoneId>::from_joints(Vec::new());
        chain.set_origin(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(IkSolver::forward_kinematics(&chain), Vec3::new(1.0, 2.0, 3.0));
        let status = IkSolver::default().solve(&mut chain, Vec3::ZERO);
        assert!(matches!(status, SolveStatus::Stepped { .. }));
    }

    #[test]
    fn gradient_probe_restores_the_angle() {
        let solver = IkSolver::default();
        let mut chain = arm();
        chain.set_angle(0, 5.0);

        let gradient = solver.partial_gradient(&mut chain, pose_target(20.0), 0);

        assert!(gradient < 0.0);
        assert_eq!(chain.angles(), &[5.0, 0.0, 0.0]);
        assert_eq!(solver.partial_gradient(&mut chain, pose_target(20.0), 2), 0.0);
    }

    #[test]
    fn reachable_target_converges_monotonically() {
        let solver = IkSolver::default();
        let mut chain = arm();
        let target = pose_target(20.0);
        let mut previous = IkSolver::distance_from_target(&chain, target);

        let mut ticks = 0;
        loop {
            let status = solver.solve(&mut chain, target);
            ticks += 1;
            let distance = IkSolver::distance_from_target(&chain, target);
            assert!(distance <= previous + 1e-5, "tick {ticks}: {distance} > {previous}");
            previous = distance;
            if status.is_converged() {
                break;
            }
            assert!(ticks < 200, "no convergence after {ticks} ticks");
        }

        assert!(previous < solver.config().distance_threshold());
        assert_eq!(solver.solve(&mut chain, target), SolveStatus::AlreadyConverged);
    }

    #[test]
    fn unreachable_target_stays_within_bounds() {
        let solver = IkSolver::default();
        let mut chain = arm();
        let target = Vec3::new(0.0, 1.0, 10.0);

        for _ in 0..300 {
            let status = solver.solve(&mut chain, target);
            assert!(matches!(status, SolveStatus::Stepped { .. }));
            for (joint, angle) in chain.joints().iter().zip(chain.angles()) {
                assert!((joint.min_angle()..=joint.max_angle()).contains(angle));
            }
        }
        assert_eq!(chain.angle(0), Some(35.0));
    }

    #[test]
    fn converged_chain_is_left_alone() {
        let solver = IkSolver::default();
        let mut chain = arm();
        chain.set_angle(0, 12.0);
        chain.set_angle(1, -7.0);
        let before = chain.clone();

        let tip = IkSolver::forward_kinematics(&chain);
        let status = solver.solve(&mut chain, tip);

        assert_eq!(status, SolveStatus::AlreadyConverged);
        assert_eq!(chain, before);
    }

    #[test]
    fn non_finite_target_leaves_the_chain_usable() {
        let solver = IkSolver::default();
        let mut chain = arm();
        chain.set_angle(0, 10.0);
        let before = chain.clone();

        for target in [
            Vec3::new(f32::INFINITY, 0.0, 0.0),
            Vec3::new(0.0, f32::NAN, 0.0),
            Vec3::splat(f32::NEG_INFINITY),
        ] {
            let status = solver.solve(&mut chain, target);
            assert!(!status.is_converged());
            assert_eq!(chain, before);
        }

        let target = pose_target(20.0);
        let converged = (0..200).any(|_| solver.solve(&mut chain, target).is_converged());
        assert!(converged);
        for (joint, angle) in chain.joints().iter().zip(chain.angles()) {
            assert!((joint.min_angle()..=joint.max_angle()).contains(angle));
        }
    }

    #[test]
    fn explicit_joints_solve_too() {
        let joints = vec![
            Joint::new(Axis::Z, -90.0, 90.0, Vec3::ZERO).unwrap(),
            Joint::new(Axis::Z, -90.0, 90.0, Vec3::X).unwrap(),
        ];
        let mut chain = JointChain::<crate::BoneId>::from_joints(joints);
        let target = Vec3::new(0.0, 1.0, 0.0);
        let solver = IkSolver::new(IkConfig::new(0.1, 40.0, 0.05).unwrap());

        let converged = (0..500).any(|_| solver.solve(&mut chain, target).is_converged());

        assert!(converged);
        assert!((chain.angle(0).unwrap() - 90.0).abs() < 3.0);
    }

    #[test]
    fn config_rejects_bad_values() {
        assert_eq!(
            IkConfig::new(0.0, 10.0, 0.05),
            Err(ConfigError::InvalidSolverParameter {
                name: "sampling_distance",
                value: 0.0
            })
        );
        assert!(IkConfig::new(0.1, -1.0, 0.05).is_err());
        assert!(IkConfig::new(0.1, 10.0, f32::INFINITY).is_err());

        let mut config = IkConfig::default();
        assert!(config.set_learning_rate(f32::NAN).is_err());
        assert_eq!(config.learning_rate(), 10.0);
    }
}
