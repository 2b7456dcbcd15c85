// SPDX-License-Identifier: GPL-3.0-only

//! GPU device ownership and frame readback
//!
//! There is no process-wide GPU handle. The process owner creates one
//! [`GpuContext`] at startup and passes it (as `Arc<GpuContext>`) to every
//! component that renders or reads back frames.
//!
//! Readback is split in two so the presented texture is only touched while
//! the presentation callback runs:
//!
//! 1. [`GpuContext::snapshot`] records and submits a texture to staging
//!    buffer copy. This happens synchronously inside the callback.
//! 2. [`GpuReadback::read_into`] maps the staging buffer and copies it out.
//!    This happens later, on the recording session's serial queue.

use crate::media::destination::PixelFormat;
use crate::media::frame_converter::{FrameTexture, copy_rows};
use std::sync::Arc;
use tracing::{debug, info};

pub use wgpu_compute as wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
}

/// Device and queue shared by the renderer and frame readback
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
}

impl GpuContext {
    /// Create a device and queue
    pub async fn new(label: &str) -> Result<Self, String> {
        info!(label = label, "Creating GPU device");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| format!("Failed to find suitable GPU adapter: {}", e))?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "GPU adapter selected"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| format!("Failed to create GPU device: {}", e))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info: GpuDeviceInfo {
                adapter_name: adapter_info.name.clone(),
                backend: adapter_info.backend,
            },
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    /// Create a BGRA render target that can be presented and read back
    pub fn create_frame_texture(&self, width: u32, height: u32) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("presented_frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Bgra8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Upload tightly packed 4-byte pixels into `texture`
    pub fn upload(&self, texture: &wgpu::Texture, pixels: &[u8]) {
        let size = texture.size();
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            size,
        );
    }

    /// Stage a copy of `texture` for later readback
    ///
    /// Only records and submits the copy; the texture may be reused by the
    /// renderer as soon as this returns.
    pub fn snapshot(&self, texture: &wgpu::Texture) -> Result<GpuReadback, String> {
        let format = pixel_format_for(texture.format())?;
        let size = texture.size();
        let (width, height) = (size.width, size.height);

        // Row pitch must be aligned to 256 bytes for buffer copies
        let padded_bytes_per_row = (width * 4).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_readback_staging"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_readback_encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(GpuReadback {
            device: self.device.clone(),
            staging,
            width,
            height,
            padded_bytes_per_row: padded_bytes_per_row as usize,
            format,
        })
    }
}

fn pixel_format_for(format: wgpu::TextureFormat) -> Result<PixelFormat, String> {
    match format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            Ok(PixelFormat::Bgra8)
        }
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
            Ok(PixelFormat::Rgba8)
        }
        other => Err(format!("Unsupported texture format for readback: {:?}", other)),
    }
}

/// A texture copy waiting in a staging buffer
pub struct GpuReadback {
    device: Arc<wgpu::Device>,
    staging: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: usize,
    format: PixelFormat,
}

impl FrameTexture for GpuReadback {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn read_into(&self, dst: &mut [u8], bytes_per_row: usize) -> Result<(), String> {
        let slice = self.staging.slice(..);

        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        rx.recv()
            .map_err(|e| format!("Failed to map readback buffer: {}", e))?
            .map_err(|e| format!("Readback buffer map error: {:?}", e))?;

        let data = slice.get_mapped_range();
        let result = copy_rows(
            &data,
            self.padded_bytes_per_row,
            dst,
            bytes_per_row,
            self.width,
            self.height,
        );
        drop(data);
        self.staging.unmap();

        debug!(width = self.width, height = self.height, "Frame read back from GPU");
        result
    }
}
