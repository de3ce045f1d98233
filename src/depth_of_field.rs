//! Depth of field.
//!
//! Five passes through one effect processor:
//!
//! | pass              | reads                  | writes                     |
//! |-------------------|------------------------|----------------------------|
//! | `Focus`           | source, scene depth    | `focus` (full res, R16)    |
//! | `DepthDownsample` | source, `focus`        | `half_res`                 |
//! | `Bokeh`           | `half_res`             | `bokeh`                    |
//! | `Blur`            | `bokeh`                | `half_res`                 |
//! | `Composite`       | source, `focus`, `half_res` | destination           |
//!
//! The focus pass turns scene depth into a signed circle-of-confusion (CoC)
//! value per pixel. The depth-of-field pipeline needs the host to keep a
//! scene depth buffer around, so hosts implement [`DepthTextureHost`] and the
//! pipeline asks for it once in [`DepthOfFieldPipeline::setup`].

use crate::config::{ConfigError, clamp_setting};
use crate::effect::{
    EffectBackend, EffectProcessor, EffectShader, FrameOutcome, StageError, degrade,
    ensure_processor,
};
use crate::frame::{FrameImage, ImageFormat};
use crate::pool::{FrameBufferPool, ScratchScope};

/// Shader label, also the CPU kernel key.
pub const DOF_LABEL: &str = "depth_of_field";
pub const FOCUS_DISTANCE: &str = "FocusDistance";
/// `1 / focus_range`.
pub const INVERSE_FOCUS_RANGE: &str = "InverseFocusRange";
pub const BOKEH_RADIUS: &str = "BokehRadius";
/// Full-resolution CoC buffer.
pub const FOCUS_TEXTURE: &str = "FocusTexture";
/// Half-resolution blurred color.
pub const DOF_TEXTURE: &str = "DOFTexture";
/// Scene depth, when the host supplies one.
pub const CAMERA_DEPTH_TEXTURE: &str = "CameraDepthTexture";

/// A backend that can keep the scene depth buffer for effects to sample.
pub trait DepthTextureHost: EffectBackend {
    /// Asks the host to render and retain scene depth from now on.
    fn request_depth_texture(&mut self);

    /// The current scene depth image, if the host has one.
    fn scene_depth(&self) -> Option<Self::Image> {
        None
    }
}

/// The depth-of-field passes, in execution order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DofPass {
    Focus,
    DepthDownsample,
    Bokeh,
    Blur,
    #[default]
    Composite,
}

impl DofPass {
    pub const ALL: [DofPass; 5] = [
        DofPass::Focus,
        DofPass::DepthDownsample,
        DofPass::Bokeh,
        DofPass::Blur,
        DofPass::Composite,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for DofPass {
    type Error = ConfigError;

    fn try_from(index: u32) -> Result<Self, ConfigError> {
        DofPass::ALL
            .get(index as usize)
            .copied()
            .ok_or(ConfigError::UnknownPass {
                effect: DOF_LABEL,
                index,
                passes: DofPass::ALL.len() as u32,
            })
    }
}

/// Host-settable depth-of-field parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DofConfig {
    active: bool,
    debug_pass: DofPass,
    focus_distance: f32,
    focus_range: f32,
    bokeh_radius: f32,
}

impl Default for DofConfig {
    fn default() -> Self {
        Self {
            active: false,
            debug_pass: DofPass::Composite,
            focus_distance: 10.0,
            focus_range: 3.0,
            bokeh_radius: 4.0,
        }
    }
}

impl DofConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_debug_pass(mut self, pass: DofPass) -> Self {
        self.debug_pass = pass;
        self
    }

    pub fn with_focus_distance(mut self, distance: f32) -> Self {
        self.set_focus_distance(distance);
        self
    }

    pub fn with_focus_range(mut self, range: f32) -> Self {
        self.set_focus_range(range);
        self
    }

    pub fn with_bokeh_radius(mut self, radius: f32) -> Self {
        self.set_bokeh_radius(radius);
        self
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_debug_pass(&mut self, pass: DofPass) {
        self.debug_pass = pass;
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPass`] for indices past [`DofPass::Composite`].
    pub fn set_debug_index(&mut self, index: u32) -> Result<(), ConfigError> {
        self.debug_pass = DofPass::try_from(index)?;
        Ok(())
    }

    /// Distance to the plane in focus, clamped to `[0.1, 100]`.
    pub fn set_focus_distance(&mut self, distance: f32) {
        self.focus_distance =
            clamp_setting("focus_distance", distance, 0.1, 100.0, self.focus_distance);
    }

    /// Depth range around the focus plane that stays sharp, clamped to `[0.1, 10]`.
    pub fn set_focus_range(&mut self, range: f32) {
        self.focus_range = clamp_setting("focus_range", range, 0.1, 10.0, self.focus_range);
    }

    /// Bokeh radius in texels, clamped to `[1, 10]`.
    pub fn set_bokeh_radius(&mut self, radius: f32) {
        self.bokeh_radius = clamp_setting("bokeh_radius", radius, 1.0, 10.0, self.bokeh_radius);
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn debug_pass(&self) -> DofPass {
        self.debug_pass
    }

    pub fn focus_distance(&self) -> f32 {
        self.focus_distance
    }

    pub fn focus_range(&self) -> f32 {
        self.focus_range
    }

    pub fn bokeh_radius(&self) -> f32 {
        self.bokeh_radius
    }
}

/// The depth-of-field effect for one camera.
pub struct DepthOfFieldPipeline<B: EffectBackend> {
    config: DofConfig,
    shader: EffectShader,
    processor: Option<B::Processor>,
    prepared: bool,
    warned_unprepared: bool,
}

impl<B: DepthTextureHost> DepthOfFieldPipeline<B> {
    pub fn new(shader_source: impl Into<String>) -> Self {
        Self {
            config: DofConfig::default(),
            shader: Self::shader(shader_source),
            processor: None,
            prepared: false,
            warned_unprepared: false,
        }
    }

    /// The shader layout depth of field expects.
    pub fn shader(source: impl Into<String>) -> EffectShader {
        EffectShader::new(DOF_LABEL, source, DofPass::ALL.len() as u32)
            .scalars(&[FOCUS_DISTANCE, INVERSE_FOCUS_RANGE, BOKEH_RADIUS])
            .textures(&[FOCUS_TEXTURE, DOF_TEXTURE, CAMERA_DEPTH_TEXTURE])
    }

    pub fn with_config(mut self, config: DofConfig) -> Self {
        self.config = config;
        self
    }

    /// Asks the host for a scene depth buffer. Call once before the first frame.
    pub fn setup(&mut self, host: &mut B) {
        host.request_depth_texture();
        self.prepared = true;
        log::debug!("Depth of field requested scene depth");
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn config(&self) -> &DofConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DofConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: DofConfig) {
        self.config = config;
    }

    pub fn processor(&self) -> Option<&B::Processor> {
        self.processor.as_ref()
    }

    /// Renders one frame of depth of field from `source` into `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] only when the fallback copy after a failed frame
    /// also fails.
    pub fn process(
        &mut self,
        backend: &mut B,
        pool: &mut FrameBufferPool<B::Image>,
        source: &B::Image,
        destination: &B::Image,
    ) -> Result<FrameOutcome, StageError> {
        if !self.config.active {
            backend.blit(source, destination)?;
            return Ok(FrameOutcome::PassThrough);
        }
        if !self.prepared && !self.warned_unprepared {
            log::warn!("Depth of field running without setup; scene depth was never requested");
            self.warned_unprepared = true;
        }

        let result = {
            let mut scope = ScratchScope::new(pool);
            self.run(backend, &mut scope, source, destination)
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(error) => degrade(backend, source, destination, "Depth of field", &error),
        }
    }

    fn run(
        &mut self,
        backend: &mut B,
        scope: &mut ScratchScope<'_, B::Image>,
        source: &B::Image,
        destination: &B::Image,
    ) -> Result<FrameOutcome, StageError> {
        let config = self.config;
        let scene_depth = backend.scene_depth();
        let fx = ensure_processor(&mut self.processor, backend, &self.shader)?;
        fx.set_scalar(FOCUS_DISTANCE, config.focus_distance);
        fx.set_scalar(INVERSE_FOCUS_RANGE, 1.0 / config.focus_range);
        fx.set_scalar(BOKEH_RADIUS, config.bokeh_radius);

        let full = source.desc().depth_bits(0);
        let half = full.half();
        let focus = scope.acquire(backend, full.with_format(ImageFormat::R16Float))?;
        let bokeh = scope.acquire(backend, half)?;
        let half_res = scope.acquire(backend, half)?;

        fx.set_texture(FOCUS_TEXTURE, scope.image(focus)?);
        fx.set_texture(DOF_TEXTURE, scope.image(half_res)?);
        match &scene_depth {
            Some(depth) => fx.set_texture(CAMERA_DEPTH_TEXTURE, depth),
            None => fx.clear_texture(CAMERA_DEPTH_TEXTURE),
        }

        let steps = [
            (DofPass::Focus, source, scope.image(focus)?),
            (DofPass::DepthDownsample, source, scope.image(half_res)?),
            (DofPass::Bokeh, scope.image(half_res)?, scope.image(bokeh)?),
            (DofPass::Blur, scope.image(bokeh)?, scope.image(half_res)?),
        ];
        for (pass, src, dst) in steps {
            fx.invoke(src, dst, pass.index())?;
            if config.debug_pass == pass {
                backend.blit(dst, destination)?;
                return Ok(FrameOutcome::Debug { pass: pass.index() });
            }
        }

        fx.invoke(source, destination, DofPass::Composite.index())?;
        Ok(FrameOutcome::Composited)
    }
}
