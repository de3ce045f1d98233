//! Headless effect backend over `image` buffers.
//!
//! Images are shared `Rgba32FImage` buffers; single-channel formats use the red
//! channel. Effect passes are plain Rust closures registered per shader label,
//! which makes the backend useful for offline tools and for checking pipeline
//! orchestration without a GPU. Every invocation is recorded so callers can
//! inspect the exact pass sequence a pipeline ran.
//!
//! ```
//! use glimmer::{CpuBackend, CpuImage, EffectBackend, EffectProcessor, EffectShader};
//! use glimmer::{ImageDesc, ImageFormat};
//!
//! let mut backend = CpuBackend::new().kernel("invert", |_pass, _params, src, out| {
//!     for (dst, px) in out.pixels_mut().zip(src.pixels()) {
//!         *dst = image::Rgba([1.0 - px[0], 1.0 - px[1], 1.0 - px[2], px[3]]);
//!     }
//!     Ok(())
//! });
//! let desc = ImageDesc::new(4, 4, ImageFormat::Rgba32Float);
//! let src = CpuImage::filled(desc, [0.25, 0.5, 1.0, 1.0]);
//! let dst = CpuImage::new(desc);
//!
//! let mut fx = backend.create_processor(&EffectShader::new("invert", "", 1)).unwrap();
//! fx.invoke(&src, &dst, 0).unwrap();
//! assert_eq!(dst.pixels().get_pixel(0, 0).0, [0.75, 0.5, 0.0, 1.0]);
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops::{self, FilterType};
use image::{Rgba, Rgba32FImage};

use crate::depth_of_field::DepthTextureHost;
use crate::effect::{EffectBackend, EffectProcessor, EffectShader, ParameterBlock, StageError};
use crate::frame::{FrameImage, ImageDesc, ImageFormat};
use crate::pool::{AllocError, ImageAllocator};

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A CPU effect pass: `(pass, parameters, source, output)`.
///
/// `output` is a fresh buffer at the destination size; it replaces the
/// destination contents once the kernel returns `Ok`.
pub type Kernel =
    dyn Fn(u32, &ParameterBlock<CpuImage>, &Rgba32FImage, &mut Rgba32FImage) -> Result<(), StageError>;

/// Shared handle to a CPU frame image.
#[derive(Clone)]
pub struct CpuImage {
    id: u64,
    pixels: Rc<RefCell<Rgba32FImage>>,
    format: ImageFormat,
    depth_bits: u32,
}

impl CpuImage {
    /// A zero-filled image.
    pub fn new(desc: ImageDesc) -> Self {
        Self::from_pixels(Rgba32FImage::new(desc.width, desc.height), desc.format)
            .with_depth_bits(desc.depth_bits)
    }

    /// An image filled with one color.
    pub fn filled(desc: ImageDesc, color: [f32; 4]) -> Self {
        let pixels = Rgba32FImage::from_pixel(desc.width, desc.height, Rgba(color));
        Self::from_pixels(pixels, desc.format).with_depth_bits(desc.depth_bits)
    }

    /// Wraps existing pixels.
    pub fn from_pixels(pixels: Rgba32FImage, format: ImageFormat) -> Self {
        Self {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            pixels: Rc::new(RefCell::new(pixels)),
            format,
            depth_bits: 0,
        }
    }

    fn with_depth_bits(mut self, bits: u32) -> Self {
        self.depth_bits = bits;
        self
    }

    /// Identity of the underlying storage; clones share it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pixels(&self) -> Ref<'_, Rgba32FImage> {
        self.pixels.borrow()
    }

    pub fn pixels_mut(&self) -> RefMut<'_, Rgba32FImage> {
        self.pixels.borrow_mut()
    }

    /// A detached copy of the pixels.
    pub fn to_pixels(&self) -> Rgba32FImage {
        self.pixels.borrow().clone()
    }
}

impl FrameImage for CpuImage {
    fn desc(&self) -> ImageDesc {
        let pixels = self.pixels.borrow();
        ImageDesc::new(pixels.width(), pixels.height(), self.format).depth_bits(self.depth_bits)
    }
}

impl fmt::Debug for CpuImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuImage")
            .field("id", &self.id)
            .field("desc", &self.desc())
            .finish()
    }
}

impl PartialEq for CpuImage {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.pixels, &other.pixels)
    }
}

/// One recorded pass invocation.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub pass: u32,
    pub src: ImageDesc,
    pub dst: ImageDesc,
    pub src_id: u64,
    pub dst_id: u64,
    /// The parameter block as it was when the pass ran.
    pub params: ParameterBlock<CpuImage>,
}

/// CPU effect processor running a registered kernel.
pub struct CpuProcessor {
    label: String,
    pass_count: u32,
    kernel: Rc<Kernel>,
    params: ParameterBlock<CpuImage>,
    invocations: Vec<Invocation>,
}

impl CpuProcessor {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn params(&self) -> &ParameterBlock<CpuImage> {
        &self.params
    }

    /// Every invocation since creation (or the last [`clear_invocations`](Self::clear_invocations)).
    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Just the pass indices, in order.
    pub fn passes(&self) -> Vec<u32> {
        self.invocations.iter().map(|inv| inv.pass).collect()
    }

    pub fn clear_invocations(&mut self) {
        self.invocations.clear();
    }
}

impl EffectProcessor for CpuProcessor {
    type Image = CpuImage;

    fn set_scalar(&mut self, name: &'static str, value: f32) {
        self.params.set_scalar(name, value);
    }

    fn set_texture(&mut self, name: &'static str, image: &CpuImage) {
        self.params.set_texture(name, image);
    }

    fn clear_texture(&mut self, name: &'static str) {
        self.params.remove(name);
    }

    fn invoke(&mut self, src: &CpuImage, dst: &CpuImage, pass: u32) -> Result<(), StageError> {
        if pass >= self.pass_count {
            return Err(StageError::UnknownPass {
                pass,
                passes: self.pass_count,
            });
        }
        let src_desc = src.desc();
        let dst_desc = dst.desc();
        log::trace!("{} pass {pass}: {src_desc} -> {dst_desc}", self.label);

        let mut out = Rgba32FImage::new(dst_desc.width, dst_desc.height);
        {
            let source = src.pixels();
            (self.kernel)(pass, &self.params, &source, &mut out)?;
        }
        *dst.pixels_mut() = out;

        self.invocations.push(Invocation {
            pass,
            src: src_desc,
            dst: dst_desc,
            src_id: src.id(),
            dst_id: dst.id(),
            params: self.params.clone(),
        });
        Ok(())
    }
}

/// Headless backend with per-label kernels and an optional memory budget.
#[derive(Default)]
pub struct CpuBackend {
    kernels: HashMap<String, Rc<Kernel>>,
    budget: Option<usize>,
    allocated_bytes: usize,
    allocations: usize,
    depth_texture_requested: bool,
    scene_depth: Option<CpuImage>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the kernel used by processors built for shader `label`.
    pub fn kernel<F>(mut self, label: impl Into<String>, kernel: F) -> Self
    where
        F: Fn(u32, &ParameterBlock<CpuImage>, &Rgba32FImage, &mut Rgba32FImage) -> Result<(), StageError>
            + 'static,
    {
        self.kernels.insert(label.into(), Rc::new(kernel));
        self
    }

    /// Caps the total bytes this backend will ever allocate.
    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.budget = Some(bytes);
        self
    }

    /// Supplies a scene depth image to depth-of-field pipelines.
    pub fn with_scene_depth(mut self, depth: CpuImage) -> Self {
        self.scene_depth = Some(depth);
        self
    }

    /// Replaces or removes the scene depth handed to depth-of-field frames.
    pub fn set_scene_depth(&mut self, depth: Option<CpuImage>) {
        self.scene_depth = depth;
    }

    /// Number of images allocated so far.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Whether a depth-of-field pipeline asked for a scene depth buffer.
    pub fn depth_texture_requested(&self) -> bool {
        self.depth_texture_requested
    }
}

impl ImageAllocator for CpuBackend {
    type Image = CpuImage;

    fn allocate(&mut self, desc: &ImageDesc) -> Result<CpuImage, AllocError> {
        let bytes = desc.byte_size();
        if let Some(budget) = self.budget {
            if self.allocated_bytes + bytes > budget {
                return Err(AllocError(format!(
                    "{desc} needs {bytes} bytes, {} of {budget} already used",
                    self.allocated_bytes
                )));
            }
        }
        self.allocated_bytes += bytes;
        self.allocations += 1;
        Ok(CpuImage::new(*desc))
    }
}

impl EffectBackend for CpuBackend {
    type Processor = CpuProcessor;

    fn create_processor(&mut self, shader: &EffectShader) -> Result<CpuProcessor, StageError> {
        let kernel = self
            .kernels
            .get(&shader.label)
            .cloned()
            .ok_or_else(|| StageError::ProcessorCreation {
                label: shader.label.clone(),
                reason: "no CPU kernel registered for this label".to_string(),
            })?;
        Ok(CpuProcessor {
            label: shader.label.clone(),
            pass_count: shader.pass_count,
            kernel,
            params: ParameterBlock::new(),
            invocations: Vec::new(),
        })
    }

    fn blit(&mut self, src: &CpuImage, dst: &CpuImage) -> Result<(), StageError> {
        if src == dst {
            return Ok(());
        }
        let target = dst.desc();
        let copied = {
            let source = src.pixels();
            if source.dimensions() == (target.width, target.height) {
                source.clone()
            } else {
                imageops::resize(&*source, target.width, target.height, FilterType::Triangle)
            }
        };
        *dst.pixels_mut() = copied;
        Ok(())
    }
}

impl DepthTextureHost for CpuBackend {
    fn request_depth_texture(&mut self) {
        self.depth_texture_requested = true;
    }

    fn scene_depth(&self) -> Option<CpuImage> {
        self.scene_depth.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(w: u32, h: u32) -> ImageDesc {
        ImageDesc::new(w, h, ImageFormat::Rgba32Float)
    }

    fn gradient(w: u32, h: u32) -> CpuImage {
        let pixels = Rgba32FImage::from_fn(w, h, |x, y| {
            Rgba([x as f32 / w as f32, y as f32 / h as f32, 0.5, 1.0])
        });
        CpuImage::from_pixels(pixels, ImageFormat::Rgba32Float)
    }

    #[test]
    fn blit_at_equal_size_is_exact() {
        let mut backend = CpuBackend::new();
        let src = gradient(7, 5);
        let dst = CpuImage::new(desc(7, 5));

        backend.blit(&src, &dst).unwrap();
        assert_eq!(*dst.pixels(), *src.pixels());
    }

    #[test]
    fn blit_resamples_to_destination_size() {
        let mut backend = CpuBackend::new();
        let src = CpuImage::filled(desc(4, 4), [1.0, 0.0, 0.0, 1.0]);
        let dst = CpuImage::new(desc(8, 2));

        backend.blit(&src, &dst).unwrap();
        assert_eq!(dst.pixels().dimensions(), (8, 2));
        let px = dst.pixels().get_pixel(3, 1).0;
        assert!((px[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn budget_makes_allocation_fail() {
        let mut backend = CpuBackend::new().with_budget(desc(4, 4).byte_size());
        assert!(backend.allocate(&desc(4, 4)).is_ok());
        assert!(backend.allocate(&desc(1, 1)).is_err());
        assert_eq!(backend.allocations(), 1);
    }

    #[test]
    fn processor_needs_a_registered_kernel() {
        let mut backend = CpuBackend::new();
        let err = backend
            .create_processor(&EffectShader::new("missing", "", 1))
            .err()
            .unwrap();
        assert!(matches!(err, StageError::ProcessorCreation { .. }));
    }

    #[test]
    fn invocations_are_recorded_with_parameters() {
        let mut backend = CpuBackend::new().kernel("copy", |_, params, src, out| {
            let gain = params.require_scalar("Gain")?;
            for (o, px) in out.pixels_mut().zip(src.pixels()) {
                *o = Rgba([px[0] * gain, px[1] * gain, px[2] * gain, px[3]]);
            }
            Ok(())
        });
        let mut fx = backend
            .create_processor(&EffectShader::new("copy", "", 2))
            .unwrap();
        let src = CpuImage::filled(desc(2, 2), [0.5, 0.5, 0.5, 1.0]);
        let dst = CpuImage::new(desc(2, 2));

        assert_eq!(
            fx.invoke(&src, &dst, 0),
            Err(StageError::MissingParameter("Gain"))
        );
        fx.set_scalar("Gain", 2.0);
        fx.invoke(&src, &dst, 1).unwrap();

        assert_eq!(fx.passes(), vec![1]);
        let inv = &fx.invocations()[0];
        assert_eq!((inv.src_id, inv.dst_id), (src.id(), dst.id()));
        assert_eq!(inv.params.scalar("Gain"), Some(2.0));
        assert_eq!(dst.pixels().get_pixel(1, 1).0, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn invoke_rejects_unknown_pass() {
        let mut backend = CpuBackend::new().kernel("noop", |_, _, _, _| Ok(()));
        let mut fx = backend
            .create_processor(&EffectShader::new("noop", "", 1))
            .unwrap();
        let img = CpuImage::new(desc(1, 1));
        assert!(matches!(
            fx.invoke(&img, &img, 1),
            Err(StageError::UnknownPass { pass: 1, passes: 1 })
        ));
    }

    #[test]
    fn in_place_invocation_reads_the_old_contents() {
        let mut backend = CpuBackend::new().kernel("double", |_, _, src, out| {
            for (o, px) in out.pixels_mut().zip(src.pixels()) {
                *o = Rgba([px[0] * 2.0, 0.0, 0.0, 1.0]);
            }
            Ok(())
        });
        let mut fx = backend
            .create_processor(&EffectShader::new("double", "", 1))
            .unwrap();
        let img = CpuImage::filled(desc(2, 1), [0.25, 0.0, 0.0, 1.0]);

        fx.invoke(&img, &img, 0).unwrap();
        assert_eq!(img.pixels().get_pixel(0, 0).0[0], 0.5);
    }
}
