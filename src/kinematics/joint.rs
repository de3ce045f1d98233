//! Joints and the linear chains the solver poses.

use glam::{Quat, Vec3};

use super::armature::{BoneHierarchy, BoneId};
use crate::config::ConfigError;

/// Angle bound, in degrees either side of rest, for joints scanned from a hierarchy.
pub const DEFAULT_ANGLE_LIMIT: f32 = 35.0;

/// A principal rotation axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// The axis for the joint at `index` when cycling X, Y, Z, X, ...
    pub fn cycle(index: usize) -> Axis {
        match index % 3 {
            0 => Axis::X,
            1 => Axis::Y,
            _ => Axis::Z,
        }
    }

    pub fn vector(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

impl From<Axis> for Vec3 {
    fn from(axis: Axis) -> Vec3 {
        axis.vector()
    }
}

/// One rotational joint: an axis, angle bounds in degrees and a rest offset
/// from the previous joint.
#[derive(Clone, Debug, PartialEq)]
pub struct Joint<B = BoneId> {
    axis: Vec3,
    min_angle: f32,
    max_angle: f32,
    rest_offset: Vec3,
    bone: Option<B>,
}

impl<B> Joint<B> {
    /// Creates a joint rotating about `axis` (normalised here).
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvertedAngleBounds`] if `min_angle > max_angle` or either is not finite
    /// - [`ConfigError::DegenerateAxis`] if `axis` has no usable direction
    pub fn new(
        axis: impl Into<Vec3>,
        min_angle: f32,
        max_angle: f32,
        rest_offset: Vec3,
    ) -> Result<Self, ConfigError> {
        if !(min_angle.is_finite() && max_angle.is_finite()) || min_angle > max_angle {
            return Err(ConfigError::InvertedAngleBounds {
                min: min_angle,
                max: max_angle,
            });
        }
        let axis = axis.into().try_normalize().ok_or(ConfigError::DegenerateAxis)?;
        Ok(Self {
            axis,
            min_angle,
            max_angle,
            rest_offset,
            bone: None,
        })
    }

    /// Ties the joint to the bone that [`JointChain::apply_pose`] rotates.
    pub fn with_bone(mut self, bone: B) -> Self {
        self.bone = Some(bone);
        self
    }

    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    pub fn min_angle(&self) -> f32 {
        self.min_angle
    }

    pub fn max_angle(&self) -> f32 {
        self.max_angle
    }

    pub fn rest_offset(&self) -> Vec3 {
        self.rest_offset
    }

    pub fn clamp(&self, angle: f32) -> f32 {
        angle.clamp(self.min_angle, self.max_angle)
    }
}

impl<B: Copy> Joint<B> {
    pub fn bone(&self) -> Option<B> {
        self.bone
    }
}

/// An ordered chain of joints, root first, with one angle per joint.
///
/// Angles start at zero and always stay within their joint's bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct JointChain<B = BoneId> {
    joints: Vec<Joint<B>>,
    angles: Vec<f32>,
    origin: Vec3,
}

impl<B: Copy + Eq + std::fmt::Debug> JointChain<B> {
    /// Scans the linear chain below `root`, following each bone's first child
    /// until a bone has none. The root itself is not a joint.
    ///
    /// Axes cycle X, Y, Z from the first joint, bounds are
    /// `±DEFAULT_ANGLE_LIMIT` and rest offsets are the bones' current local
    /// positions. The origin is the first joint's world position.
    pub fn from_hierarchy<H>(hierarchy: &H, root: B) -> Self
    where
        H: BoneHierarchy<Bone = B>,
    {
        let mut joints = Vec::new();
        let mut bone = root;
        while let Some(child) = hierarchy.first_child(bone) {
            if hierarchy.child_count(bone) > 1 {
                log::debug!("Bone {bone:?} branches; following its first child");
            }
            joints.push(Joint {
                axis: Axis::cycle(joints.len()).vector(),
                min_angle: -DEFAULT_ANGLE_LIMIT,
                max_angle: DEFAULT_ANGLE_LIMIT,
                rest_offset: hierarchy.local_position(child),
                bone: Some(child),
            });
            bone = child;
        }

        let origin = joints
            .first()
            .and_then(|joint| joint.bone)
            .map_or_else(|| hierarchy.world_position(root), |bone| hierarchy.world_position(bone));
        log::debug!("Scanned joint chain of {} joints", joints.len());
        Self::with_origin(joints, origin)
    }

    /// Writes every joint's current rotation to its bone.
    pub fn apply_pose<H>(&self, hierarchy: &mut H)
    where
        H: BoneHierarchy<Bone = B>,
    {
        for (i, joint) in self.joints.iter().enumerate() {
            if let Some(bone) = joint.bone {
                hierarchy.set_local_rotation(bone, self.local_rotation(i));
            }
        }
    }
}

impl<B> JointChain<B> {
    /// A chain over explicit joints, with its origin at zero.
    pub fn from_joints(joints: Vec<Joint<B>>) -> Self {
        Self::with_origin(joints, Vec3::ZERO)
    }

    fn with_origin(joints: Vec<Joint<B>>, origin: Vec3) -> Self {
        Self {
            angles: vec![0.0; joints.len()],
            joints,
            origin,
        }
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joints(&self) -> &[Joint<B>] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&Joint<B>> {
        self.joints.get(index)
    }

    /// World position of the first joint.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    /// Current angle of joint `index`, in degrees.
    pub fn angle(&self, index: usize) -> Option<f32> {
        self.angles.get(index).copied()
    }

    pub fn angles(&self) -> &[f32] {
        &self.angles
    }

    /// Sets joint `index` to `degrees`, clamped to its bounds. Returns the
    /// stored angle, or `None` past the end of the chain. A non-finite
    /// `degrees` keeps the current angle.
    pub fn set_angle(&mut self, index: usize, degrees: f32) -> Option<f32> {
        let joint = self.joints.get(index)?;
        if !degrees.is_finite() {
            return self.angles.get(index).copied();
        }
        let angle = joint.clamp(degrees);
        self.angles[index] = angle;
        Some(angle)
    }

    /// Unclamped access for finite-difference probes, which restore the angle.
    pub(super) fn angles_mut(&mut self) -> &mut [f32] {
        &mut self.angles
    }

    /// Returns every joint to its rest angle of zero.
    pub fn reset(&mut self) {
        self.angles.fill(0.0);
    }

    /// Rotation of joint `index` about its axis; identity past the end.
    pub fn local_rotation(&self, index: usize) -> Quat {
        match (self.joints.get(index), self.angles.get(index)) {
            (Some(joint), Some(angle)) => Quat::from_axis_angle(joint.axis, angle.to_radians()),
            _ => Quat::IDENTITY,
        }
    }
}
