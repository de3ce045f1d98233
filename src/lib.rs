//! # Glimmer
//!
//! **Camera post-processing and inverse kinematics for real-time hosts.**
//!
//! Glimmer provides the per-frame effect pipelines a renderer runs after the
//! scene pass, and a small IK solver a simulation runs every tick. The host owns
//! the frame loop; glimmer only renders into the images it is handed.
//!
//! ## Post-processing
//!
//! ```no_run
//! use std::sync::Arc;
//! use glimmer::*;
//!
//! let gpu = Arc::new(GpuContext::new_headless().expect("no GPU adapter"));
//! let mut backend = GpuBackend::new(gpu);
//! let mut pool = FrameBufferPool::new();
//!
//! // The host provides the WGSL for each effect (see `EffectShader` for the layout).
//! let bloom_wgsl = std::fs::read_to_string("assets/bloom.wgsl").unwrap();
//! let dof_wgsl = std::fs::read_to_string("assets/depth_of_field.wgsl").unwrap();
//!
//! let bloom = BloomPipeline::new(bloom_wgsl)
//!     .with_config(BloomConfig::new().with_active(true).with_iterations(4));
//! let mut dof = DepthOfFieldPipeline::new(dof_wgsl);
//! dof.setup(&mut backend);
//!
//! let desc = ImageDesc::new(1280, 720, ImageFormat::Rgba16Float);
//! let scene = backend.allocate(&desc).unwrap();
//! let output = backend.allocate(&desc).unwrap();
//!
//! let mut chain = PostChain::builder().effect(bloom).effect(dof).build();
//! chain.process(&mut backend, &mut pool, &scene, &output).unwrap();
//! pool.end_frame();
//! ```
//!
//! - [`BloomPipeline`]: bright pass, blur cascade down and back up, composite
//! - [`DepthOfFieldPipeline`]: circle of confusion, bokeh, blur, composite
//! - [`FrameBufferPool`]: scratch images reused across frames
//! - [`GpuBackend`] and [`CpuBackend`]: where the passes actually run
//!
//! ## Inverse kinematics
//!
//! [`JointChain`] scans a linear bone hierarchy and [`IkSolver`] bends it
//! toward a target, one descent sweep per tick. See [`kinematics`].
//!
//! ## Logging
//!
//! Glimmer logs through the [`log`](https://docs.rs/log) facade and never
//! installs a logger itself.

mod bloom;
mod chain;
mod config;
mod depth_of_field;
pub mod effect;
mod frame;
mod gpu;
pub mod kinematics;
mod pool;
mod rotate;

pub use bloom::{BLOOM_LABEL, BloomConfig, BloomPass, BloomPipeline, MAX_ITERATIONS};
pub use chain::{PostChain, PostChainBuilder, PostEffect};
pub use config::ConfigError;
pub use depth_of_field::{DOF_LABEL, DepthOfFieldPipeline, DepthTextureHost, DofConfig, DofPass};
pub use effect::cpu::{CpuBackend, CpuImage, CpuProcessor, Invocation};
pub use effect::gpu::{GpuBackend, GpuEffectProcessor, GpuImage};
pub use effect::{
    EffectBackend, EffectProcessor, EffectShader, FrameOutcome, ParamValue, ParameterBlock,
    StageError,
};
pub use frame::{FrameImage, ImageDesc, ImageFormat};
pub use gpu::{GpuContext, GpuError};
pub use kinematics::{
    Armature, Axis, Bone, BoneHierarchy, BoneId, BoneTransform, IkConfig, IkSolver, Joint,
    JointChain, SolveStatus,
};
pub use pool::{
    AllocError, BufferId, FrameBufferPool, ImageAllocator, PoolError, PoolStats, ScratchBuffer,
    ScratchScope,
};
pub use rotate::Rotator;

// Re-export glam math types for convenience
pub use glam::{Quat, Vec3};
