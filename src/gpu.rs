//! Core GPU context for the wgpu effect backend.
//!
//! [`GpuContext`] holds the device and queue every GPU pass needs. Post-processing
//! does not present anything itself, so the context carries no surface: a host
//! that already owns a device wraps it with [`GpuContext::from_parts`], and tools
//! or tests without a window create one with [`GpuContext::new_headless`].
//!
//! # Example
//!
//! ```no_run
//! use glimmer::GpuContext;
//!
//! let gpu = GpuContext::new_headless().expect("no GPU adapter");
//! let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
//!     label: Some("My Buffer"),
//!     size: 1024,
//!     usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
//!     mapped_at_creation: false,
//! });
//! gpu.queue.write_buffer(&buffer, 0, &[0u8; 1024]);
//! ```

use thiserror::Error;

/// Errors creating a headless GPU context.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

/// Device and queue shared by all GPU effect resources.
///
/// Both fields are public to allow direct access to wgpu APIs when needed.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Wraps a device and queue owned by the render host.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Creates a context without a window.
    ///
    /// This performs the usual wgpu initialization, blocking on the async steps:
    /// 1. Creates a wgpu instance with primary backends (Vulkan, Metal, DX12)
    /// 2. Requests an adapter with no surface requirement
    /// 3. Creates the logical device and command queue
    ///
    /// # Errors
    ///
    /// Returns [`GpuError`] if no adapter is available or device creation fails.
    pub fn new_headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Glimmer Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;

        log::debug!("Created headless GPU context on {:?}", adapter.get_info().name);

        Ok(Self { device, queue })
    }
}
