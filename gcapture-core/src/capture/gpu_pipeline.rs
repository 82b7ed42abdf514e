//! GPU conversion stage: YUV texture to BGRA render target, optional text
//! banner, staging readback into a tightly packed buffer.

use crate::models::config::GpuConfig;
use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;
use crate::processing::frame_converter::BYTES_PER_PIXEL;
use crate::processing::shaders;
use crate::traits::device_system::{GpuBinding, TextureResource};
use crate::traits::gpu::{GpuDevice, KernelId, PlaneSink};

pub struct GpuPipeline {
    device: Box<dyn GpuDevice>,
    nv12: KernelId,
    p010: KernelId,
    uses_compute: bool,
    target: Option<(u32, u32)>,
    overlay: bool,
    output: Vec<u8>,
}

impl GpuPipeline {
    /// Compile the colour kernels. The compute kernel is used for NV12 when
    /// preferred and available; a failed compile falls back to the pixel
    /// kernel.
    pub fn new(mut device: Box<dyn GpuDevice>, config: &GpuConfig) -> Result<Self, CaptureError> {
        let nv12_pixel = device.compile(&shaders::NV12_PIXEL)?;
        let p010 = device.compile(&shaders::P010_PIXEL)?;

        let mut nv12 = nv12_pixel;
        let mut uses_compute = false;
        if config.prefer_compute && device.supports_compute() {
            match device.compile(&shaders::NV12_COMPUTE) {
                Ok(id) => {
                    nv12 = id;
                    uses_compute = true;
                }
                Err(e) => log::warn!("Compute kernel unavailable, using pixel kernel: {}", e),
            }
        }

        log::debug!(
            "GPU pipeline ready on {} ({} NV12 kernel)",
            device.adapter_name(),
            if uses_compute { "compute" } else { "pixel" }
        );

        Ok(Self {
            device,
            nv12,
            p010,
            uses_compute,
            target: None,
            overlay: config.overlay,
            output: Vec::new(),
        })
    }

    pub fn adapter_name(&self) -> String {
        self.device.adapter_name()
    }

    pub fn binding(&self) -> GpuBinding {
        self.device.binding()
    }

    pub fn uses_compute(&self) -> bool {
        self.uses_compute
    }

    pub fn overlay(&self) -> bool {
        self.overlay
    }

    pub fn set_overlay(&mut self, enabled: bool) {
        self.overlay = enabled;
    }

    /// Convert `texture` and return tightly packed BGRA rows
    /// (`width * 4` bytes each). `banner` is drawn when overlay is on.
    pub fn render(&mut self, texture: &dyn TextureResource, banner: Option<&str>) -> Result<&[u8], CaptureError> {
        let kernel = match texture.format() {
            PixelFormat::Nv12 => self.nv12,
            PixelFormat::P010 => self.p010,
            other => {
                return Err(CaptureError::NotSupported(format!("GPU conversion from {}", other.name())));
            }
        };

        let size = (texture.width(), texture.height());
        if self.target != Some(size) {
            self.device.create_target(size.0, size.1)?;
            self.target = Some(size);
        }

        self.device.convert(kernel, texture)?;
        if self.overlay {
            if let Some(text) = banner {
                self.device.draw_text(text)?;
            }
        }

        let row = size.0 as usize * BYTES_PER_PIXEL;
        let rows = size.1 as usize;
        let output = &mut self.output;
        output.clear();
        let mut copy_err = None;
        self.device.read_target(&mut |bytes: &[u8], pitch: usize| {
            if pitch < row || bytes.len() < rows.saturating_sub(1) * pitch + row {
                copy_err = Some(CaptureError::Io(format!("staging readback too small ({} bytes, pitch {})", bytes.len(), pitch)));
                return;
            }
            for r in 0..rows {
                output.extend_from_slice(&bytes[r * pitch..r * pitch + row]);
            }
        })?;
        if let Some(e) = copy_err {
            return Err(e);
        }
        Ok(&self.output)
    }

    /// Hand the planes of `texture` to `sink` for recording.
    pub fn read_planes(&mut self, texture: &dyn TextureResource, sink: &mut PlaneSink<'_>) -> Result<(), CaptureError> {
        self.device.read_planes(texture, sink)
    }
}

/// Banner drawn on GPU frames.
pub fn overlay_text(device: &str, width: u32, height: u32, fps: f64, format: PixelFormat, frame_id: u64) -> String {
    format!(
        "{} | {}x{} @ {:.2} fps | {} {}-bit | #{}",
        device,
        width,
        height,
        fps,
        format.name(),
        format.bit_depth(),
        frame_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::shaders::shade8;
    use crate::sim::gpu::SimGpuFactory;
    use crate::sim::video::SimTexture;
    use crate::traits::gpu::GpuFactory;

    fn pipeline(factory: &SimGpuFactory, config: &GpuConfig) -> GpuPipeline {
        let device = factory.create_device(None).unwrap();
        GpuPipeline::new(device, config).unwrap()
    }

    #[test]
    fn banner_format() {
        assert_eq!(
            overlay_text("Cam Link 4K", 1920, 1080, 59.94, PixelFormat::P010, 42),
            "Cam Link 4K | 1920x1080 @ 59.94 fps | P010 10-bit | #42"
        );
    }

    #[test]
    fn prefers_compute_kernel_when_supported() {
        let factory = SimGpuFactory::new("Sim Adapter");
        assert!(pipeline(&factory, &GpuConfig::default()).uses_compute());

        let no_compute = GpuConfig {
            prefer_compute: false,
            ..Default::default()
        };
        assert!(!pipeline(&factory, &no_compute).uses_compute());

        let factory = SimGpuFactory::new("Sim Adapter").without_compute();
        assert!(!pipeline(&factory, &GpuConfig::default()).uses_compute());
    }

    #[test]
    fn compute_compile_failure_falls_back_to_pixel() {
        let factory = SimGpuFactory::new("Sim Adapter").failing_compute_compile();
        let p = pipeline(&factory, &GpuConfig::default());
        assert!(!p.uses_compute());
    }

    #[test]
    fn renders_tight_rows_matching_kernel_math() {
        let factory = SimGpuFactory::new("Sim Adapter");
        let mut p = pipeline(&factory, &GpuConfig::default());
        let texture = SimTexture::nv12_solid(6, 4, 180, 100, 160);

        let out = p.render(&texture, Some("banner")).unwrap().to_vec();
        assert_eq!(out.len(), 6 * 4 * 4);
        let expected = shade8(180, 100, 160);
        assert!(out.chunks_exact(4).all(|px| px == expected));
        assert_eq!(factory.overlay_texts(), vec!["banner".to_string()]);
    }

    #[test]
    fn overlay_can_be_disabled() {
        let factory = SimGpuFactory::new("Sim Adapter");
        let mut p = pipeline(&factory, &GpuConfig::default());
        p.set_overlay(false);
        let texture = SimTexture::nv12_solid(2, 2, 16, 128, 128);
        p.render(&texture, Some("banner")).unwrap();
        assert!(factory.overlay_texts().is_empty());
    }

    #[test]
    fn rejects_packed_textures() {
        let factory = SimGpuFactory::new("Sim Adapter");
        let mut p = pipeline(&factory, &GpuConfig::default());
        let mut texture = SimTexture::nv12_solid(2, 2, 16, 128, 128);
        texture.format = PixelFormat::Yuy2;
        assert!(matches!(p.render(&texture, None), Err(CaptureError::NotSupported(_))));
    }
}
