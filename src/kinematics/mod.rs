//! Joint chains and the inverse-kinematics solver that poses them.
//!
//! A [`JointChain`] is scanned once from a linear bone hierarchy. Each
//! simulation tick the host calls [`IkSolver::solve`] with the current target
//! and then [`JointChain::apply_pose`] to write the joint rotations back:
//!
//! ```
//! use glimmer::{Armature, IkSolver, JointChain, Vec3};
//!
//! let (mut armature, root) = Armature::linear(&[Vec3::Y, Vec3::Y, Vec3::Y]);
//! let mut chain = JointChain::from_hierarchy(&armature, root);
//! let solver = IkSolver::default();
//! let reach = 15f32.to_radians();
//! let target = Vec3::new(0.0, 1.0 + 2.0 * reach.cos(), 2.0 * reach.sin());
//!
//! for _ in 0..200 {
//!     if solver.solve(&mut chain, target).is_converged() {
//!         break;
//!     }
//! }
//! chain.apply_pose(&mut armature);
//! assert!(IkSolver::distance_from_target(&chain, target) < 0.05);
//! ```

mod armature;
mod joint;
mod solver;

pub use armature::{Armature, Bone, BoneHierarchy, BoneId, BoneTransform};
pub use joint::{Axis, DEFAULT_ANGLE_LIMIT, Joint, JointChain};
pub use solver::{IkConfig, IkSolver, SolveStatus};
