//! Frame image descriptions shared by the buffer pool and the effect backends.
//!
//! An [`ImageDesc`] is the key the [`FrameBufferPool`](crate::FrameBufferPool)
//! matches pooled images against, so two descs are interchangeable exactly when
//! they compare equal.

use std::fmt;

/// Pixel format of a frame image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 8-bit RGBA, linear.
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB encoded.
    Rgba8UnormSrgb,
    /// 8-bit BGRA, sRGB encoded. The usual swapchain format.
    Bgra8UnormSrgb,
    /// Half-float RGBA, for HDR intermediates.
    Rgba16Float,
    /// Full-float RGBA.
    Rgba32Float,
    /// Single-channel half float, linear. Used for focus/weight buffers.
    R16Float,
}

impl ImageFormat {
    /// Bytes per pixel of the color planes.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Rgba8Unorm | ImageFormat::Rgba8UnormSrgb | ImageFormat::Bgra8UnormSrgb => 4,
            ImageFormat::Rgba16Float => 8,
            ImageFormat::Rgba32Float => 16,
            ImageFormat::R16Float => 2,
        }
    }

    /// Number of color channels.
    pub fn channels(self) -> u32 {
        match self {
            ImageFormat::R16Float => 1,
            _ => 4,
        }
    }

    pub(crate) fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            ImageFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            ImageFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ImageFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            ImageFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            ImageFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            ImageFormat::R16Float => wgpu::TextureFormat::R16Float,
        }
    }

    /// Maps a wgpu format back, if it is one the pipelines can render to.
    pub fn from_wgpu(format: wgpu::TextureFormat) -> Option<Self> {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => Some(ImageFormat::Rgba8Unorm),
            wgpu::TextureFormat::Rgba8UnormSrgb => Some(ImageFormat::Rgba8UnormSrgb),
            wgpu::TextureFormat::Bgra8UnormSrgb => Some(ImageFormat::Bgra8UnormSrgb),
            wgpu::TextureFormat::Rgba16Float => Some(ImageFormat::Rgba16Float),
            wgpu::TextureFormat::Rgba32Float => Some(ImageFormat::Rgba32Float),
            wgpu::TextureFormat::R16Float => Some(ImageFormat::R16Float),
            _ => None,
        }
    }
}

/// Size and format of a frame image.
///
/// `depth_bits` requests an attached depth buffer of that precision; `0` means
/// color only, which is what every post-processing intermediate uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub depth_bits: u32,
    pub format: ImageFormat,
}

impl ImageDesc {
    /// A color-only description.
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            depth_bits: 0,
            format,
        }
    }

    /// Sets the depth buffer precision.
    pub fn depth_bits(mut self, bits: u32) -> Self {
        self.depth_bits = bits;
        self
    }

    /// Same size, different format.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Half the resolution (integer division), never below one pixel.
    pub fn half(self) -> Self {
        Self {
            width: (self.width / 2).max(1),
            height: (self.height / 2).max(1),
            ..self
        }
    }

    /// Size of the color planes in bytes.
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Whether both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for ImageDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {:?}", self.width, self.height, self.format)?;
        if self.depth_bits > 0 {
            write!(f, " +d{}", self.depth_bits)?;
        }
        Ok(())
    }
}

/// A backend image handle.
///
/// Handles are cheap to clone and refer to the same underlying storage, the way
/// GPU texture handles do.
pub trait FrameImage: Clone {
    /// Describes this image.
    fn desc(&self) -> ImageDesc;
}
