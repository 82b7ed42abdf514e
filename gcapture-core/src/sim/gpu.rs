//! Software GPU that runs the colour kernels on the CPU.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;
use crate::processing::frame_converter::BYTES_PER_PIXEL;
use crate::processing::shaders::{shade10, shade8};
use crate::sim::video::SimTexture;
use crate::traits::device_system::{GpuBinding, TextureResource};
use crate::traits::gpu::{GpuDevice, GpuFactory, KernelId, KernelSource, KernelStage, PlaneSink};

/// Staging rows are padded to this many bytes.
const ROW_PITCH_ALIGN: usize = 256;

/// Device manager handle a [`SimGpuDevice`] hands to readers.
#[derive(Debug)]
pub struct SimGpuBinding {
    pub adapter: String,
}

#[derive(Default)]
struct GpuState {
    overlays: Mutex<Vec<String>>,
    live: AtomicUsize,
}

/// Factory for simulated GPU devices. Clones share recorded state.
#[derive(Clone)]
pub struct SimGpuFactory {
    adapter: String,
    compute: bool,
    compute_compiles: bool,
    creatable: bool,
    state: Arc<GpuState>,
}

impl SimGpuFactory {
    pub fn new(adapter: &str) -> Self {
        Self {
            adapter: adapter.to_string(),
            compute: true,
            compute_compiles: true,
            creatable: true,
            state: Arc::new(GpuState::default()),
        }
    }

    pub fn without_compute(mut self) -> Self {
        self.compute = false;
        self
    }

    pub fn failing_compute_compile(mut self) -> Self {
        self.compute_compiles = false;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.creatable = false;
        self
    }

    /// Banners drawn by every device from this factory, in order.
    pub fn overlay_texts(&self) -> Vec<String> {
        self.state.overlays.lock().clone()
    }

    /// Devices created and not yet dropped.
    pub fn live_devices(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }
}

impl GpuFactory for SimGpuFactory {
    fn create_device(&self, adapter_index: Option<u32>) -> Result<Box<dyn GpuDevice>, CaptureError> {
        if !self.creatable {
            return Err(CaptureError::NotSupported("no GPU adapter".into()));
        }
        if adapter_index.is_some_and(|i| i > 0) {
            return Err(CaptureError::NoDevice(format!("GPU adapter {adapter_index:?}")));
        }
        self.state.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimGpuDevice {
            binding: Arc::new(SimGpuBinding {
                adapter: self.adapter.clone(),
            }),
            compute: self.compute,
            compute_compiles: self.compute_compiles,
            kernels: Vec::new(),
            target: None,
            state: Arc::clone(&self.state),
        }))
    }
}

struct RenderTarget {
    width: u32,
    height: u32,
    pitch: usize,
    pixels: Vec<u8>,
}

pub struct SimGpuDevice {
    binding: Arc<SimGpuBinding>,
    compute: bool,
    compute_compiles: bool,
    kernels: Vec<KernelSource>,
    target: Option<RenderTarget>,
    state: Arc<GpuState>,
}

impl SimGpuDevice {
    fn texture<'a>(&self, texture: &'a dyn TextureResource) -> Result<&'a SimTexture, CaptureError> {
        texture
            .as_any()
            .downcast_ref::<SimTexture>()
            .ok_or_else(|| CaptureError::InvalidArgument("texture belongs to another device".into()))
    }
}

impl GpuDevice for SimGpuDevice {
    fn adapter_name(&self) -> String {
        self.binding.adapter.clone()
    }

    fn binding(&self) -> GpuBinding {
        self.binding.clone()
    }

    fn supports_compute(&self) -> bool {
        self.compute
    }

    fn compile(&mut self, kernel: &KernelSource) -> Result<KernelId, CaptureError> {
        if kernel.stage == KernelStage::Compute && !(self.compute && self.compute_compiles) {
            return Err(CaptureError::NotSupported(format!("compute kernel {}", kernel.name)));
        }
        if kernel.source.is_empty() || kernel.entry_point.is_empty() {
            return Err(CaptureError::InvalidArgument(format!("empty kernel {}", kernel.name)));
        }
        self.kernels.push(*kernel);
        Ok(KernelId(self.kernels.len() as u32 - 1))
    }

    fn create_target(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidArgument(format!("render target {width}x{height}")));
        }
        let pitch = (width as usize * BYTES_PER_PIXEL).div_ceil(ROW_PITCH_ALIGN) * ROW_PITCH_ALIGN;
        self.target = Some(RenderTarget {
            width,
            height,
            pitch,
            pixels: vec![0; pitch * height as usize],
        });
        Ok(())
    }

    fn convert(&mut self, kernel: KernelId, texture: &dyn TextureResource) -> Result<(), CaptureError> {
        let source = *self
            .kernels
            .get(kernel.0 as usize)
            .ok_or_else(|| CaptureError::InvalidArgument(format!("unknown kernel {}", kernel.0)))?;
        let texture = self.texture(texture)?;
        if source.input != texture.format {
            return Err(CaptureError::InvalidArgument(format!(
                "kernel {} samples {}, texture is {}",
                source.name,
                source.input.name(),
                texture.format.name()
            )));
        }
        let target = self
            .target
            .as_mut()
            .ok_or_else(|| CaptureError::InvalidState("no render target".into()))?;
        if (target.width, target.height) != (texture.width, texture.height) {
            return Err(CaptureError::InvalidState("render target size mismatch".into()));
        }

        let ten_bit = texture.format == PixelFormat::P010;
        for row in 0..texture.height {
            for x in 0..texture.width {
                let (y, u, v) = texture.sample(x, row);
                let px = if ten_bit {
                    shade10(y, u, v)
                } else {
                    shade8(y as u8, u as u8, v as u8)
                };
                let at = row as usize * target.pitch + x as usize * BYTES_PER_PIXEL;
                target.pixels[at..at + BYTES_PER_PIXEL].copy_from_slice(&px);
            }
        }
        Ok(())
    }

    fn draw_text(&mut self, text: &str) -> Result<(), CaptureError> {
        if self.target.is_none() {
            return Err(CaptureError::InvalidState("no render target".into()));
        }
        self.state.overlays.lock().push(text.to_string());
        Ok(())
    }

    fn read_target(&mut self, sink: &mut dyn FnMut(&[u8], usize)) -> Result<(), CaptureError> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidState("no render target".into()))?;
        sink(&target.pixels, target.pitch);
        Ok(())
    }

    fn read_planes(&mut self, texture: &dyn TextureResource, sink: &mut PlaneSink<'_>) -> Result<(), CaptureError> {
        let texture = self.texture(texture)?;
        sink(&texture.y, texture.y_stride, &texture.uv, texture.uv_stride);
        Ok(())
    }
}

impl Drop for SimGpuDevice {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}
