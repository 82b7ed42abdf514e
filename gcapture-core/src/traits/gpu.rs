use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;

use super::device_system::{GpuBinding, TextureResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelStage {
    /// Full-screen pass through a pixel shader.
    Pixel,
    /// One invocation per output pixel in a compute dispatch.
    Compute,
}

/// Shader source handed to the GPU backend's compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSource {
    pub name: &'static str,
    pub stage: KernelStage,
    /// Texture format the kernel samples.
    pub input: PixelFormat,
    pub entry_point: &'static str,
    pub source: &'static str,
}

/// Handle to a compiled kernel, valid for the device that compiled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub u32);

/// Plane sink used by [`GpuDevice::read_planes`]: `(y, y_stride, uv, uv_stride)`.
pub type PlaneSink<'a> = dyn FnMut(&[u8], usize, &[u8], usize) + 'a;

/// Creates GPU devices on a chosen adapter.
pub trait GpuFactory: Send + Sync {
    fn create_device(&self, adapter_index: Option<u32>) -> Result<Box<dyn GpuDevice>, CaptureError>;
}

/// GPU rendering backend: kernels, one RGBA render target, staging readback.
pub trait GpuDevice: Send {
    fn adapter_name(&self) -> String;

    /// Handle a source reader binds to so it can deliver textures.
    fn binding(&self) -> GpuBinding;

    fn supports_compute(&self) -> bool;

    fn compile(&mut self, kernel: &KernelSource) -> Result<KernelId, CaptureError>;

    /// (Re)create the RGBA render target and its staging copy.
    fn create_target(&mut self, width: u32, height: u32) -> Result<(), CaptureError>;

    /// Run `kernel` over `texture`, writing the render target.
    fn convert(&mut self, kernel: KernelId, texture: &dyn TextureResource) -> Result<(), CaptureError>;

    /// Draw a text banner onto the render target.
    fn draw_text(&mut self, text: &str) -> Result<(), CaptureError>;

    /// Copy the render target to CPU-visible memory and hand it to `sink` as `(bytes, row_pitch)`.
    fn read_target(&mut self, sink: &mut dyn FnMut(&[u8], usize)) -> Result<(), CaptureError>;

    /// Copy the luma and chroma planes of a planar texture to CPU memory.
    fn read_planes(&mut self, texture: &dyn TextureResource, sink: &mut PlaneSink<'_>) -> Result<(), CaptureError>;
}
