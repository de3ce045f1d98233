//! Ordered post-processing chains.
//!
//! A [`PostChain`] runs a camera's effects one after another, the way a linear
//! render graph does. Only active effects take part:
//!
//! ```text
//! one active effect:     source → destination
//! several:               source → A → B → A → ... → destination
//! ```
//!
//! `A` and `B` are ping-pong scratch buffers at the destination size, taken
//! from the frame pool for the duration of the frame.

use crate::bloom::BloomPipeline;
use crate::depth_of_field::{DepthOfFieldPipeline, DepthTextureHost};
use crate::effect::{EffectBackend, FrameOutcome, StageError};
use crate::frame::{FrameImage, ImageDesc};
use crate::pool::{FrameBufferPool, PoolError, ScratchBuffer};

/// A post-processing effect that can take part in a [`PostChain`].
pub trait PostEffect<B: EffectBackend> {
    /// Name used in logs.
    fn label(&self) -> &str;

    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    /// Renders one frame from `source` into `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] when the effect could not write the destination at all.
    fn process(
        &mut self,
        backend: &mut B,
        pool: &mut FrameBufferPool<B::Image>,
        source: &B::Image,
        destination: &B::Image,
    ) -> Result<FrameOutcome, StageError>;
}

impl<B: EffectBackend> PostEffect<B> for BloomPipeline<B> {
    fn label(&self) -> &str {
        "bloom"
    }

    fn is_active(&self) -> bool {
        self.config().active()
    }

    fn set_active(&mut self, active: bool) {
        self.config_mut().set_active(active);
    }

    fn process(
        &mut self,
        backend: &mut B,
        pool: &mut FrameBufferPool<B::Image>,
        source: &B::Image,
        destination: &B::Image,
    ) -> Result<FrameOutcome, StageError> {
        BloomPipeline::process(self, backend, pool, source, destination)
    }
}

impl<B: DepthTextureHost> PostEffect<B> for DepthOfFieldPipeline<B> {
    fn label(&self) -> &str {
        "depth of field"
    }

    fn is_active(&self) -> bool {
        self.config().active()
    }

    fn set_active(&mut self, active: bool) {
        self.config_mut().set_active(active);
    }

    fn process(
        &mut self,
        backend: &mut B,
        pool: &mut FrameBufferPool<B::Image>,
        source: &B::Image,
        destination: &B::Image,
    ) -> Result<FrameOutcome, StageError> {
        DepthOfFieldPipeline::process(self, backend, pool, source, destination)
    }
}

/// Builder for [`PostChain`]. Effects run in the order they are added.
pub struct PostChainBuilder<B: EffectBackend> {
    effects: Vec<Box<dyn PostEffect<B>>>,
}

impl<B: EffectBackend> PostChainBuilder<B> {
    pub fn new() -> Self {
        Self {
            effects: Vec::new(),
        }
    }

    pub fn effect<E: PostEffect<B> + 'static>(mut self, effect: E) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn build(self) -> PostChain<B> {
        PostChain {
            effects: self.effects,
        }
    }
}

impl<B: EffectBackend> Default for PostChainBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// A camera's post-processing effects, run in order each frame.
pub struct PostChain<B: EffectBackend> {
    effects: Vec<Box<dyn PostEffect<B>>>,
}

impl<B: EffectBackend> PostChain<B> {
    pub fn builder() -> PostChainBuilder<B> {
        PostChainBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effect_mut(&mut self, index: usize) -> Option<&mut dyn PostEffect<B>> {
        self.effects.get_mut(index).map(|effect| effect.as_mut() as &mut dyn PostEffect<B>)
    }

    /// Runs every active effect, returning one outcome per active effect.
    ///
    /// With no active effects the source is copied and the list is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] when an effect, or the chain's own fallback copy,
    /// could not write its output.
    pub fn process(
        &mut self,
        backend: &mut B,
        pool: &mut FrameBufferPool<B::Image>,
        source: &B::Image,
        destination: &B::Image,
    ) -> Result<Vec<FrameOutcome>, StageError> {
        let active: Vec<usize> = (0..self.effects.len())
            .filter(|&i| self.effects[i].is_active())
            .collect();

        match active.as_slice() {
            [] => {
                backend.blit(source, destination)?;
                return Ok(Vec::new());
            }
            &[only] => {
                let outcome = self.effects[only].process(backend, pool, source, destination)?;
                return Ok(vec![outcome]);
            }
            _ => {}
        }

        let buffers = match acquire_ping_pong(backend, pool, destination.desc()) {
            Ok(buffers) => buffers,
            Err(error) => {
                log::warn!("Post chain skipped this frame: {error}");
                backend.blit(source, destination)?;
                return Ok(vec![FrameOutcome::Degraded; active.len()]);
            }
        };

        let result = self.run_ping_pong(backend, pool, &active, buffers, source, destination);
        let released = release_all(pool, buffers);
        let outcomes = result?;
        released?;
        Ok(outcomes)
    }

    fn run_ping_pong(
        &mut self,
        backend: &mut B,
        pool: &mut FrameBufferPool<B::Image>,
        active: &[usize],
        buffers: [ScratchBuffer; 2],
        source: &B::Image,
        destination: &B::Image,
    ) -> Result<Vec<FrameOutcome>, StageError> {
        // Effects take the pool mutably, so hold the ping-pong images by handle.
        let mut targets = Vec::with_capacity(2);
        for buffer in buffers {
            let image = pool.image(buffer).ok_or(PoolError::UnknownBuffer(buffer.id()))?;
            targets.push(image.clone());
        }

        let mut outcomes = Vec::with_capacity(active.len());
        let mut input = source.clone();
        for (step, &index) in active.iter().enumerate() {
            let output = if step + 1 == active.len() {
                destination.clone()
            } else {
                targets[step % 2].clone()
            };
            let effect = &mut self.effects[index];
            log::trace!("Post chain step {step}: {}", effect.label());
            outcomes.push(effect.process(backend, pool, &input, &output)?);
            input = output;
        }
        Ok(outcomes)
    }
}

/// Releases every buffer, reporting the first failure.
fn release_all<I>(pool: &mut FrameBufferPool<I>, buffers: [ScratchBuffer; 2]) -> Result<(), PoolError> {
    let mut first_error = None;
    for buffer in buffers {
        if let Err(error) = pool.release(buffer) {
            first_error.get_or_insert(error);
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn acquire_ping_pong<B: EffectBackend>(
    backend: &mut B,
    pool: &mut FrameBufferPool<B::Image>,
    desc: ImageDesc,
) -> Result<[ScratchBuffer; 2], PoolError> {
    let first = pool.acquire(backend, desc)?;
    match pool.acquire(backend, desc) {
        Ok(second) => Ok([first, second]),
        Err(error) => {
            pool.release(first)?;
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::{BLOOM_LABEL, BloomConfig};
    use crate::depth_of_field::{DOF_LABEL, DofConfig};
    use crate::effect::cpu::{CpuBackend, CpuImage};
    use crate::frame::ImageFormat;
    use image::{Rgba, Rgba32FImage};

    fn copy(src: &Rgba32FImage, out: &mut Rgba32FImage) {
        let (sw, sh) = src.dimensions();
        let (ow, oh) = out.dimensions();
        for (x, y, px) in out.enumerate_pixels_mut() {
            *px = *src.get_pixel((x * sw / ow).min(sw - 1), (y * sh / oh).min(sh - 1));
        }
    }

    fn backend() -> CpuBackend {
        CpuBackend::new()
            .kernel(BLOOM_LABEL, |_, _, src, out| {
                copy(src, out);
                Ok(())
            })
            .kernel(DOF_LABEL, |_, _, src, out| {
                copy(src, out);
                Ok(())
            })
    }

    fn chain(bloom: bool, dof: bool) -> PostChain<CpuBackend> {
        PostChain::builder()
            .effect(BloomPipeline::new("").with_config(BloomConfig::new().with_active(bloom)))
            .effect(DepthOfFieldPipeline::new("").with_config(DofConfig::new().with_active(dof)))
            .build()
    }

    fn images() -> (CpuImage, CpuImage) {
        let desc = ImageDesc::new(16, 16, ImageFormat::Rgba16Float);
        let pixels = Rgba32FImage::from_fn(16, 16, |x, y| Rgba([x as f32, y as f32, 1.0, 1.0]));
        (CpuImage::from_pixels(pixels, ImageFormat::Rgba16Float), CpuImage::new(desc))
    }

    #[test]
    fn no_active_effects_copies_source() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let mut chain = chain(false, false);
        let (src, dst) = images();

        let outcomes = chain.process(&mut backend, &mut pool, &src, &dst).unwrap();

        assert!(outcomes.is_empty());
        assert_eq!(*dst.pixels(), *src.pixels());
        assert_eq!(pool.stats().allocated, 0);
    }

    #[test]
    fn single_effect_writes_destination_directly() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let mut chain = chain(false, true);
        let (src, dst) = images();

        let outcomes = chain.process(&mut backend, &mut pool, &src, &dst).unwrap();

        assert_eq!(outcomes, vec![FrameOutcome::Composited]);
        // Only the effect's own three scratch buffers.
        assert_eq!(pool.stats().allocated, 3);
    }

    #[test]
    fn several_effects_ping_pong_into_destination() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let mut chain = chain(true, true);
        let (src, dst) = images();

        let outcomes = chain.process(&mut backend, &mut pool, &src, &dst).unwrap();

        assert_eq!(outcomes, vec![FrameOutcome::Composited; 2]);
        assert_eq!(pool.stats().in_flight, 0);
        assert_eq!(dst.pixels().dimensions(), (16, 16));
    }

    #[test]
    fn effects_can_be_toggled_through_the_chain() {
        let mut chain = chain(false, false);
        let bloom = chain.effect_mut(0).unwrap();
        assert_eq!(bloom.label(), "bloom");
        bloom.set_active(true);
        assert!(chain.effect_mut(0).unwrap().is_active());
        assert!(chain.effect_mut(2).is_none());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn missing_ping_pong_buffers_degrade_the_chain() {
        let mut backend = backend().with_budget(0);
        let mut pool = FrameBufferPool::new();
        let mut chain = chain(true, true);
        let (src, dst) = images();

        let outcomes = chain.process(&mut backend, &mut pool, &src, &dst).unwrap();

        assert_eq!(outcomes, vec![FrameOutcome::Degraded; 2]);
        assert_eq!(*dst.pixels(), *src.pixels());
    }

    #[test]
    fn ping_pong_release_frees_both_even_when_one_fails() {
        let mut backend = backend();
        let mut pool = FrameBufferPool::new();
        let desc = ImageDesc::new(8, 8, ImageFormat::Rgba16Float);
        let [a, b] = acquire_ping_pong(&mut backend, &mut pool, desc).unwrap();
        pool.release(a).unwrap();

        let result = release_all(&mut pool, [a, b]);

        assert!(matches!(result, Err(PoolError::InvalidRelease(_))));
        assert!(!pool.is_in_flight(b));
        assert_eq!(pool.stats().in_flight, 0);
        assert_eq!(pool.stats().free, 2);
    }
}
