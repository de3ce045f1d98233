//! Multi-pass bloom.
//!
//! Bloom runs four kinds of pass through one effect processor:
//!
//! ```text
//!  source ─Bright─▶ 1/2 ─FullBlur─▶ 1/4 ─FullBlur─▶ 1/8 ...    (downsample)
//!                    ▲               ▲               │
//!                    └──HalfBlur─────┴──HalfBlur─────┘          (upsample)
//!                    │
//!                    └─Composite(+ SourceTexture)─▶ destination
//! ```
//!
//! The bright pass extracts everything above `threshold` at half resolution.
//! The downsample cascade blurs into successively halved buffers until either
//! `iterations` levels exist or the buffer height reaches two pixels. The
//! upsample cascade then walks back up, blurring each level into the larger
//! buffer it came from and releasing the smaller one straight away. Finally the
//! composite pass combines the blurred highlights with the original source.
//!
//! Any pass can be selected as a debug output, in which case its result is
//! blitted to the destination and the pipeline stops there. Every exit releases
//! the scratch buffers acquired so far.

use crate::config::{ConfigError, clamp_setting};
use crate::effect::{
    EffectBackend, EffectProcessor, EffectShader, FrameOutcome, StageError, degrade,
    ensure_processor,
};
use crate::frame::{FrameImage, ImageDesc};
use crate::pool::{FrameBufferPool, ScratchScope};

/// Shader label, also the CPU kernel key.
pub const BLOOM_LABEL: &str = "bloom";
/// Luminance threshold for the bright pass.
pub const THRESHOLD: &str = "Threshold";
/// The original source image, bound for the composite pass.
pub const SOURCE_TEXTURE: &str = "SourceTexture";
/// Upper bound on cascade levels.
pub const MAX_ITERATIONS: u32 = 16;

/// The bloom passes, in execution order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BloomPass {
    Bright,
    FullBlur,
    HalfBlur,
    #[default]
    Composite,
}

impl BloomPass {
    pub const ALL: [BloomPass; 4] = [
        BloomPass::Bright,
        BloomPass::FullBlur,
        BloomPass::HalfBlur,
        BloomPass::Composite,
    ];

    /// The shader pass index.
    pub fn index(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for BloomPass {
    type Error = ConfigError;

    fn try_from(index: u32) -> Result<Self, ConfigError> {
        BloomPass::ALL
            .get(index as usize)
            .copied()
            .ok_or(ConfigError::UnknownPass {
                effect: BLOOM_LABEL,
                index,
                passes: BloomPass::ALL.len() as u32,
            })
    }
}

/// Host-settable bloom parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomConfig {
    active: bool,
    debug_pass: BloomPass,
    iterations: u32,
    threshold: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            active: false,
            debug_pass: BloomPass::Composite,
            iterations: 1,
            threshold: 1.0,
        }
    }
}

impl BloomConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.set_active(active);
        self
    }

    pub fn with_debug_pass(mut self, pass: BloomPass) -> Self {
        self.set_debug_pass(pass);
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.set_iterations(iterations);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.set_threshold(threshold);
        self
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_debug_pass(&mut self, pass: BloomPass) {
        self.debug_pass = pass;
    }

    /// Selects the debug pass by shader index.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPass`] for indices past [`BloomPass::Composite`].
    pub fn set_debug_index(&mut self, index: u32) -> Result<(), ConfigError> {
        self.debug_pass = BloomPass::try_from(index)?;
        Ok(())
    }

    /// Clamped to `[1, MAX_ITERATIONS]`.
    pub fn set_iterations(&mut self, iterations: u32) {
        self.iterations = iterations.clamp(1, MAX_ITERATIONS);
    }

    /// Clamped to `[0, 1]`.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = clamp_setting("threshold", threshold, 0.0, 1.0, self.threshold);
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn debug_pass(&self) -> BloomPass {
        self.debug_pass
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// The bloom effect for one camera.
pub struct BloomPipeline<B: EffectBackend> {
    config: BloomConfig,
    shader: EffectShader,
    processor: Option<B::Processor>,
}

impl<B: EffectBackend> BloomPipeline<B> {
    /// Creates a pipeline around the given shader source. The processor is built
    /// on the first active frame.
    pub fn new(shader_source: impl Into<String>) -> Self {
        Self {
            config: BloomConfig::default(),
            shader: Self::shader(shader_source),
            processor: None,
        }
    }

    /// The shader layout bloom expects: four passes, one scalar, one texture.
    pub fn shader(source: impl Into<String>) -> EffectShader {
        EffectShader::new(BLOOM_LABEL, source, BloomPass::ALL.len() as u32)
            .scalars(&[THRESHOLD])
            .textures(&[SOURCE_TEXTURE])
    }

    pub fn with_config(mut self, config: BloomConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &BloomConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut BloomConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: BloomConfig) {
        self.config = config;
    }

    /// The processor, once the first active frame has created it.
    pub fn processor(&self) -> Option<&B::Processor> {
        self.processor.as_ref()
    }

    /// Renders one frame of bloom from `source` into `destination`.
    ///
    /// Inactive pipelines copy the source unchanged. If scratch allocation or a
    /// pass fails the frame degrades to a plain copy and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] only when even the fallback copy fails.
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

        let result = {
            let mut scope = ScratchScope::new(pool);
            self.run(backend, &mut scope, source, destination)
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(error) => degrade(backend, source, destination, "Bloom", &error),
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
        let fx = ensure_processor(&mut self.processor, backend, &self.shader)?;
        fx.set_scalar(THRESHOLD, config.threshold);

        let mut level = source.desc().half().depth_bits(0);
        let bright = scope.acquire(backend, level)?;
        fx.invoke(source, scope.image(bright)?, BloomPass::Bright.index())?;

        if config.debug_pass == BloomPass::Bright {
            backend.blit(scope.image(bright)?, destination)?;
            return Ok(FrameOutcome::Debug {
                pass: BloomPass::Bright.index(),
            });
        }

        let mut cascade = vec![bright];
        let mut current = bright;
        for _ in 1..config.iterations {
            if level.height <= 2 {
                break;
            }
            level = ImageDesc {
                width: (level.width / 2).max(1),
                height: level.height / 2,
                ..level
            };
            let next = scope.acquire(backend, level)?;
            fx.invoke(scope.image(current)?, scope.image(next)?, BloomPass::FullBlur.index())?;
            cascade.push(next);
            current = next;
        }
        log::trace!("Bloom cascade: {} of {} levels", cascade.len(), config.iterations);

        if config.debug_pass == BloomPass::FullBlur {
            backend.blit(scope.image(current)?, destination)?;
            return Ok(FrameOutcome::Debug {
                pass: BloomPass::FullBlur.index(),
            });
        }

        // `current` is the top of the cascade; blur back up into each larger level.
        cascade.pop();
        while let Some(next) = cascade.pop() {
            fx.invoke(scope.image(current)?, scope.image(next)?, BloomPass::HalfBlur.index())?;
            scope.release(current)?;
            current = next;
        }

        if config.debug_pass == BloomPass::HalfBlur {
            backend.blit(scope.image(current)?, destination)?;
            return Ok(FrameOutcome::Debug {
                pass: BloomPass::HalfBlur.index(),
            });
        }

        fx.set_texture(SOURCE_TEXTURE, source);
        fx.invoke(scope.image(current)?, destination, BloomPass::Composite.index())?;
        scope.release(current)?;
        Ok(FrameOutcome::Composited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::cpu::{CpuBackend, CpuImage};
    use crate::frame::ImageFormat;
    use image::{Rgba, Rgba32FImage};

    fn resample(src: &Rgba32FImage, out: &mut Rgba32FImage, f: impl Fn(Rgba<f32>) -> Rgba<f32>) {
        let (sw, sh) = src.dimensions();
        let (ow, oh) = out.dimensions();
        for (x, y, px) in out.enumerate_pixels_mut() {
            let sx = (x * sw / ow).min(sw - 1);
            let sy = (y * sh / oh).min(sh - 1);
            *px = f(*src.get_pixel(sx, sy));
        }
    }

    fn backend() -> CpuBackend {
        CpuBackend::new().kernel(BLOOM_LABEL, |pass, params, src, out| {
            match pass {
                0 => {
                    let t = params.require_scalar(THRESHOLD)?;
                    resample(src, out, |p| {
                        Rgba([(p[0] - t).max(0.0), (p[1] - t).max(0.0), (p[2] - t).max(0.0), 1.0])
                    });
                }
                1 | 2 => resample(src, out, |p| p),
                _ => {
                    let scene = params.require_texture(SOURCE_TEXTURE)?.pixels();
                    resample(src, out, |p| p);
                    for (o, s) in out.pixels_mut().zip(scene.pixels()) {
                        for c in 0..3 {
                            o[c] += s[c];
                        }
                    }
                }
            }
            Ok(())
        })
    }

    fn scene(w: u32, h: u32) -> CpuImage {
        let pixels = Rgba32FImage::from_fn(w, h, |x, y| {
            Rgba([x as f32 / w as f32, y as f32 / h as f32, 0.9, 1.0])
        });
        CpuImage::from_pixels(pixels, ImageFormat::Rgba32Float)
    }

    fn target(w: u32, h: u32) -> CpuImage {
        CpuImage::new(ImageDesc::new(w, h, ImageFormat::Rgba32Float))
    }

    fn active(iterations: u32) -> BloomConfig {
        BloomConfig::new()
            .with_active(true)
            .with_iterations(iterations)
            .with_threshold(0.5)
    }

    #[test]
    fn inactive_bloom_copies_source_exactly() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let mut bloom = BloomPipeline::new("");
        let (src, dst) = (scene(33, 17), target(33, 17));

        let outcome = bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();

        assert_eq!(outcome, FrameOutcome::PassThrough);
        assert_eq!(*dst.pixels(), *src.pixels());
        assert!(bloom.processor().is_none());
        assert_eq!(pool.stats().allocated, 0);
    }

    #[test]
    fn single_iteration_composites_the_bright_buffer() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let mut bloom = BloomPipeline::new("").with_config(active(1));
        let (src, dst) = (scene(64, 32), target(64, 32));

        let outcome = bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();

        assert_eq!(outcome, FrameOutcome::Composited);
        let fx = bloom.processor().unwrap();
        assert_eq!(fx.passes(), vec![0, 3]);
        let inv = fx.invocations();
        assert_eq!((inv[0].dst.width, inv[0].dst.height), (32, 16));
        assert_eq!(inv[1].src_id, inv[0].dst_id);
        assert_eq!(inv[1].dst_id, dst.id());
        assert_eq!(inv[0].params.scalar(THRESHOLD), Some(0.5));
        assert_eq!(pool.stats().in_flight, 0);
    }

    #[test]
    fn cascade_goes_down_then_back_up() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let mut bloom = BloomPipeline::new("").with_config(active(4));
        let (src, dst) = (scene(64, 64), target(64, 64));

        bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();

        let fx = bloom.processor().unwrap();
        assert_eq!(fx.passes(), vec![0, 1, 1, 1, 2, 2, 2, 3]);
        let heights: Vec<u32> = fx.invocations().iter().map(|inv| inv.dst.height).collect();
        assert_eq!(heights, vec![32, 16, 8, 4, 8, 16, 32, 64]);

        // Upsampling writes back into the buffers the downsample produced.
        let inv = fx.invocations();
        assert_eq!(inv[4].dst_id, inv[2].dst_id);
        assert_eq!(inv[6].dst_id, inv[0].dst_id);
        assert_eq!(inv[7].src_id, inv[0].dst_id);
        assert_eq!(pool.stats().in_flight, 0);
        assert_eq!(pool.stats().allocated, 4);
    }

    #[test]
    fn cascade_stops_at_two_pixels() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let mut bloom = BloomPipeline::new("").with_config(active(MAX_ITERATIONS));
        let (src, dst) = (scene(16, 16), target(16, 16));

        bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();

        let fx = bloom.processor().unwrap();
        assert_eq!(fx.passes(), vec![0, 1, 1, 2, 2, 3]);
        assert_eq!(fx.invocations()[2].dst.height, 2);
    }

    /// Every pass writes `[pass, passes so far, 0, 1]`, so the output names the
    /// buffer it came from.
    fn tagging_backend() -> CpuBackend {
        CpuBackend::new().kernel(BLOOM_LABEL, |pass, _, src, out| {
            let depth = src.get_pixel(0, 0)[1] + 1.0;
            for px in out.pixels_mut() {
                *px = Rgba([pass as f32, depth, 0.0, 1.0]);
            }
            Ok(())
        })
    }

    #[test]
    fn every_debug_exit_releases_its_buffers() {
        // 128x64 with five iterations: four full blurs down to 4x2, four half blurs back up.
        let expected_tags = [(0.0, 1.0), (1.0, 5.0), (2.0, 9.0), (3.0, 10.0)];
        for (pass, (tag, depth)) in BloomPass::ALL.into_iter().zip(expected_tags) {
            let mut backend = tagging_backend();
            let mut pool = FrameBufferPool::new();
            let config = active(5).with_debug_pass(pass);
            let mut bloom = BloomPipeline::new("").with_config(config);
            let src = CpuImage::filled(ImageDesc::new(128, 64, ImageFormat::Rgba32Float), [0.0, 0.0, 0.0, 1.0]);
            let dst = target(128, 64);

            let outcome = bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();

            let expected = match pass {
                BloomPass::Composite => FrameOutcome::Composited,
                _ => FrameOutcome::Debug { pass: pass.index() },
            };
            assert_eq!(outcome, expected);
            assert_eq!(pool.stats().in_flight, 0, "{pass:?} leaked buffers");
            assert_eq!(dst.pixels().dimensions(), (128, 64));
            assert!(
                dst.pixels().pixels().all(|p| (p[0] - tag).abs() < 1e-4 && (p[1] - depth).abs() < 1e-4),
                "{pass:?} wrote {:?}",
                dst.pixels().get_pixel(0, 0)
            );
        }
    }

    #[test]
    fn bright_debug_output_ignores_iterations() {
        let render = |iterations| {
            let mut backend = backend();
            let mut pool = FrameBufferPool::new();
            let config = active(iterations).with_debug_pass(BloomPass::Bright);
            let mut bloom = BloomPipeline::new("").with_config(config);
            let (src, dst) = (scene(40, 40), target(40, 40));
            bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();
            dst.to_pixels()
        };
        assert_eq!(render(1), render(8));
    }

    #[test]
    fn allocation_failure_degrades_to_pass_through() {
        let bright_bytes = ImageDesc::new(32, 32, ImageFormat::Rgba32Float).byte_size();
        for budget in [0, bright_bytes] {
            let mut backend = backend().with_budget(budget);
            let mut pool = FrameBufferPool::new();
            let mut bloom = BloomPipeline::new("").with_config(active(3));
            let (src, dst) = (scene(64, 64), target(64, 64));

            let outcome = bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();

            assert_eq!(outcome, FrameOutcome::Degraded);
            assert_eq!(*dst.pixels(), *src.pixels());
            assert_eq!(pool.stats().in_flight, 0);
        }
    }

    #[test]
    fn later_frames_reuse_pooled_buffers() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let mut bloom = BloomPipeline::new("").with_config(active(3));
        let (src, dst) = (scene(64, 64), target(64, 64));

        bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();
        pool.end_frame();
        let allocations = backend.allocations();
        bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();

        assert_eq!(backend.allocations(), allocations);
        assert_eq!(bloom.processor().unwrap().invocations().len(), 2 * 6);
    }

    #[test]
    fn missing_kernel_degrades_instead_of_failing() {
        let mut backend = CpuBackend::new();
        let mut pool = FrameBufferPool::new();
        let mut bloom = BloomPipeline::new("").with_config(active(2));
        let (src, dst) = (scene(8, 8), target(8, 8));

        let outcome = bloom.process(&mut backend, &mut pool, &src, &dst).unwrap();
        assert_eq!(outcome, FrameOutcome::Degraded);
        assert!(bloom.processor().is_none());
    }

    #[test]
    fn config_clamps_and_validates() {
        let mut config = BloomConfig::new().with_iterations(0).with_threshold(3.0);
        assert_eq!(config.iterations(), 1);
        assert_eq!(config.threshold(), 1.0);

        config.set_iterations(99);
        assert_eq!(config.iterations(), MAX_ITERATIONS);

        assert!(config.set_debug_index(2).is_ok());
        assert_eq!(config.debug_pass(), BloomPass::HalfBlur);
        assert!(config.set_debug_index(4).is_err());
        assert_eq!(config.debug_pass(), BloomPass::HalfBlur);
        assert_eq!(BloomConfig::default().debug_pass(), BloomPass::Composite);
    }
}
