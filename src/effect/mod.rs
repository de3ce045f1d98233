//! The shared effect processor and the backends that provide it.
//!
//! A post-processing pipeline is a sequence of fullscreen passes run by one
//! [`EffectProcessor`]: a compiled multi-pass shader plus a block of named
//! parameters. Each pass reads a source image (and whatever textures are bound as
//! parameters) and writes a destination image; the pass index selects which
//! sub-algorithm of the shader runs.
//!
//! ```text
//!   set_scalar("Threshold", 0.8)
//!   set_texture("SourceTexture", &scene)
//!             │
//!             ▼
//!   ┌──────────────────┐  invoke(src, dst, pass)  ┌────────┐
//!   │  EffectProcessor │ ───────────────────────▶ │  dst   │
//!   └──────────────────┘                          └────────┘
//! ```
//!
//! The parameter block is shared, mutable state: it keeps whatever was last set
//! until it is overwritten, so a pipeline sets every parameter a pass needs right
//! before invoking it.
//!
//! # Backends
//!
//! An [`EffectBackend`] allocates images, builds processors from an
//! [`EffectShader`] and performs plain blits.
//!
//! - [`gpu::GpuBackend`]: wgpu render pipelines over offscreen textures
//! - [`cpu::CpuBackend`]: headless `image` buffers with registered kernels,
//!   for tools and tests

pub mod cpu;
pub mod gpu;

use std::collections::HashMap;

use thiserror::Error;

use crate::frame::FrameImage;
use crate::pool::{ImageAllocator, PoolError};

/// Errors raised while running effect passes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("failed to create effect processor `{label}`: {reason}")]
    ProcessorCreation { label: String, reason: String },
    #[error("pass {pass} is out of range, the shader defines {passes} passes")]
    UnknownPass { pass: u32, passes: u32 },
    #[error("parameter `{0}` must be set before this pass")]
    MissingParameter(&'static str),
    #[error("pass {pass} failed: {reason}")]
    Invoke { pass: u32, reason: String },
    #[error("blit failed: {0}")]
    Blit(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A named effect parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue<I> {
    Scalar(f32),
    Texture(I),
}

/// The named parameters a processor hands to its passes.
#[derive(Clone, Debug)]
pub struct ParameterBlock<I> {
    values: HashMap<&'static str, ParamValue<I>>,
}

impl<I: Clone> ParameterBlock<I> {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn set_scalar(&mut self, name: &'static str, value: f32) {
        self.values.insert(name, ParamValue::Scalar(value));
    }

    pub fn set_texture(&mut self, name: &'static str, image: &I) {
        self.values.insert(name, ParamValue::Texture(image.clone()));
    }

    /// Unbinds `name`, returning what it held.
    pub fn remove(&mut self, name: &str) -> Option<ParamValue<I>> {
        self.values.remove(name)
    }

    /// The scalar bound to `name`, if it is a scalar.
    pub fn scalar(&self, name: &str) -> Option<f32> {
        match self.values.get(name) {
            Some(ParamValue::Scalar(value)) => Some(*value),
            _ => None,
        }
    }

    /// The texture bound to `name`, if it is a texture.
    pub fn texture(&self, name: &str) -> Option<&I> {
        match self.values.get(name) {
            Some(ParamValue::Texture(image)) => Some(image),
            _ => None,
        }
    }

    /// Like [`scalar`](Self::scalar), but a missing value is an error.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MissingParameter`] when `name` holds no scalar.
    pub fn require_scalar(&self, name: &'static str) -> Result<f32, StageError> {
        self.scalar(name).ok_or(StageError::MissingParameter(name))
    }

    /// Like [`texture`](Self::texture), but a missing value is an error.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MissingParameter`] when `name` holds no texture.
    pub fn require_texture(&self, name: &'static str) -> Result<&I, StageError> {
        self.texture(name).ok_or(StageError::MissingParameter(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<I: Clone> Default for ParameterBlock<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Description of an opaque multi-pass effect shader.
///
/// For the GPU backend `source` is WGSL with a vertex entry point `vs` and one
/// fragment entry point per pass, named `fs_pass0`, `fs_pass1`, and so on. The
/// shader declares:
///
/// ```wgsl
/// struct Params {
///     // source texel size: (1/w, 1/h, w, h)
///     texel: vec4f,
///     // scalars, in declaration order, packed four per vec4
///     values: array<vec4f, 4>,
/// }
/// @group(0) @binding(0) var<uniform> params: Params;
/// @group(0) @binding(1) var source_texture: texture_2d<f32>;
/// @group(0) @binding(2) var source_sampler: sampler;
/// // one binding per named texture, in declaration order, starting at 3
/// ```
///
/// The CPU backend looks up a kernel registered under `label` instead.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectShader {
    pub label: String,
    pub source: String,
    pub pass_count: u32,
    pub scalars: Vec<&'static str>,
    pub textures: Vec<&'static str>,
}

impl EffectShader {
    /// Most scalars a shader can declare: the uniform block holds four vec4s.
    pub const MAX_SCALARS: usize = 16;

    pub fn new(label: impl Into<String>, source: impl Into<String>, pass_count: u32) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            pass_count,
            scalars: Vec::new(),
            textures: Vec::new(),
        }
    }

    /// Declares the scalar parameters, in uniform order.
    pub fn scalars(mut self, names: &[&'static str]) -> Self {
        self.scalars = names.to_vec();
        self
    }

    /// Declares the texture parameters, in binding order.
    pub fn textures(mut self, names: &[&'static str]) -> Self {
        self.textures = names.to_vec();
        self
    }

    /// Checks `pass` against the declared pass count.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::UnknownPass`] if the shader has no such pass.
    pub fn check_pass(&self, pass: u32) -> Result<(), StageError> {
        if pass < self.pass_count {
            Ok(())
        } else {
            Err(StageError::UnknownPass {
                pass,
                passes: self.pass_count,
            })
        }
    }
}

/// A compiled effect with its parameter block.
pub trait EffectProcessor {
    type Image: FrameImage;

    /// Sets a scalar parameter for subsequent invocations.
    fn set_scalar(&mut self, name: &'static str, value: f32);

    /// Binds a texture parameter for subsequent invocations.
    fn set_texture(&mut self, name: &'static str, image: &Self::Image);

    /// Unbinds a texture parameter; later passes see it as unset.
    fn clear_texture(&mut self, name: &'static str);

    /// Runs pass `pass`, reading `src` and the current parameters, writing `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] when the pass does not exist, a parameter the pass
    /// requires is missing, or the backend fails to execute it.
    fn invoke(&mut self, src: &Self::Image, dst: &Self::Image, pass: u32) -> Result<(), StageError>;
}

/// Image allocation, processor creation and blits for one rendering API.
pub trait EffectBackend: ImageAllocator {
    type Processor: EffectProcessor<Image = Self::Image>;

    /// Builds a processor for `shader`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::ProcessorCreation`] if the shader cannot be built.
    fn create_processor(&mut self, shader: &EffectShader) -> Result<Self::Processor, StageError>;

    /// Copies `src` into `dst`, resampling when sizes differ.
    ///
    /// Images of equal size and format are copied exactly.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Blit`] if the copy cannot be performed.
    fn blit(&mut self, src: &Self::Image, dst: &Self::Image) -> Result<(), StageError>;
}

/// What a pipeline wrote to its destination this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The effect is inactive; the source was copied unchanged.
    PassThrough,
    /// A debug pass was selected; the output of that pass was blitted.
    Debug { pass: u32 },
    /// The full effect ran.
    Composited,
    /// The effect failed this frame; the source was copied unchanged.
    Degraded,
}

/// Creates the processor on first use and hands it out afterwards.
pub(crate) fn ensure_processor<'a, B: EffectBackend>(
    slot: &'a mut Option<B::Processor>,
    backend: &mut B,
    shader: &EffectShader,
) -> Result<&'a mut B::Processor, StageError> {
    if slot.is_none() {
        log::debug!("Creating effect processor `{}`", shader.label);
        *slot = Some(backend.create_processor(shader)?);
    }
    slot.as_mut().ok_or_else(|| StageError::ProcessorCreation {
        label: shader.label.clone(),
        reason: "processor missing after creation".to_string(),
    })
}

/// Falls back to a plain copy after a failed frame.
pub(crate) fn degrade<B: EffectBackend>(
    backend: &mut B,
    source: &B::Image,
    destination: &B::Image,
    effect: &str,
    error: &StageError,
) -> Result<FrameOutcome, StageError> {
    log::warn!("{effect} skipped this frame: {error}");
    backend.blit(source, destination)?;
    Ok(FrameOutcome::Degraded)
}
