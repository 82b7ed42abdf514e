//! Format negotiation cascade.
//!
//! Each [`NegotiationStrategy`] tries to bring one device up on a given
//! pipeline tier. Strategies run in order; a failing strategy releases
//! everything it acquired before the next one starts. The device is
//! authoritative: the result always carries the format read back from the
//! source, not the one requested.

use crate::capture::gpu_pipeline::GpuPipeline;
use crate::models::config::GpuConfig;
use crate::models::device::{CaptureProfile, MediaFormat};
use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;
use crate::models::state::NegotiationPath;
use crate::processing::frame_converter::FrameConverter;
use crate::traits::device_system::{DeviceSystem, FormatRequest, ReaderOptions, SourceReader};
use crate::traits::gpu::GpuFactory;

/// Inputs shared by every strategy for one `open`.
pub struct NegotiationContext<'a> {
    pub system: &'a dyn DeviceSystem,
    pub index: usize,
    pub gpu: Option<&'a dyn GpuFactory>,
    pub gpu_config: &'a GpuConfig,
    /// Custom profile that must be honoured exactly.
    pub profile: Option<&'a CaptureProfile>,
}

/// A device brought up by a strategy.
pub struct Negotiated {
    pub path: NegotiationPath,
    pub reader: Box<dyn SourceReader>,
    pub format: MediaFormat,
    pub pipeline: Option<GpuPipeline>,
}

impl std::fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiated")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("gpu", &self.pipeline.is_some())
            .finish()
    }
}

pub trait NegotiationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(&self, ctx: &NegotiationContext<'_>) -> Result<Negotiated, CaptureError>;
}

/// Score used to rank native formats: resolution first, then frame rate,
/// then pixel format preference.
pub fn score(format: &MediaFormat) -> i64 {
    let area = format.width as i64 * format.height as i64;
    let fps = if format.fps_den == 0 {
        0
    } else {
        format.fps_num as i64 * 100 / format.fps_den as i64
    };
    let pref = format.format.preference().unwrap_or(-1);
    area * 100_000 + fps + pref
}

/// Highest-scoring native format.
pub fn pick_best_native(formats: &[MediaFormat]) -> Option<MediaFormat> {
    formats.iter().copied().max_by_key(score)
}

/// Run `strategies` in order and return the first success.
///
/// When all fail, a rejected custom profile is reported as
/// `InvalidArgument`; anything else as `Io`.
pub fn negotiate(strategies: &[Box<dyn NegotiationStrategy>], ctx: &NegotiationContext<'_>) -> Result<Negotiated, CaptureError> {
    let mut last_error = None;
    for strategy in strategies {
        match strategy.attempt(ctx) {
            Ok(negotiated) => {
                log::info!(
                    "Negotiated {} path for device {}: {} {}x{} @ {:.2} fps (stride {})",
                    negotiated.path.name(),
                    ctx.index,
                    negotiated.format.format.name(),
                    negotiated.format.width,
                    negotiated.format.height,
                    negotiated.format.fps(),
                    negotiated.format.stride
                );
                return Ok(negotiated);
            }
            Err(e) => {
                log::debug!("{} path failed for device {}: {}", strategy.name(), ctx.index, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(CaptureError::InvalidArgument(msg)) => Err(CaptureError::InvalidArgument(msg)),
        Some(e) => Err(CaptureError::Io(format!("no negotiation path succeeded: {e}"))),
        None => Err(CaptureError::NotSupported("no negotiation strategies configured".into())),
    }
}

/// Apply a custom profile exactly, failing closed.
pub(crate) fn apply_custom(reader: &mut dyn SourceReader, profile: &CaptureProfile, format: PixelFormat) -> Result<MediaFormat, CaptureError> {
    let wanted = MediaFormat {
        format,
        ..profile.as_request()
    };
    reader
        .set_format(&FormatRequest::exact(&wanted))
        .map_err(|e| CaptureError::InvalidArgument(format!("profile rejected: {e}")))?;
    let current = reader.current_format()?;
    if !current.matches(&wanted) {
        return Err(CaptureError::InvalidArgument(format!(
            "profile rejected: device negotiated {} {}x{} @ {}/{}",
            current.format.name(),
            current.width,
            current.height,
            current.fps_num,
            current.fps_den
        )));
    }
    Ok(current)
}

/// Run `body` on a fresh reader, shutting the reader down if it fails.
fn with_reader<T>(
    mut reader: Box<dyn SourceReader>,
    body: impl FnOnce(&mut dyn SourceReader) -> Result<T, CaptureError>,
) -> Result<(Box<dyn SourceReader>, T), CaptureError> {
    match body(reader.as_mut()) {
        Ok(value) => Ok((reader, value)),
        Err(e) => {
            reader.shutdown();
            Err(e)
        }
    }
}

/// GPU-resident tier: hardware transforms with the GPU bound to the source.
pub struct GpuStrategy;

impl NegotiationStrategy for GpuStrategy {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn attempt(&self, ctx: &NegotiationContext<'_>) -> Result<Negotiated, CaptureError> {
        let factory = ctx
            .gpu
            .ok_or_else(|| CaptureError::NotSupported("no GPU backend".into()))?;
        let device = factory.create_device(ctx.gpu_config.adapter_index)?;
        let pipeline = GpuPipeline::new(device, ctx.gpu_config)?;
        let reader = ctx.system.activate(ctx.index, &ReaderOptions::gpu(pipeline.binding()))?;

        // Dropping `pipeline` on failure releases the GPU device.
        let (reader, (path, format)) = with_reader(reader, |reader| {
            let requested = match ctx.profile {
                Some(profile) => {
                    let format = if profile.format.is_planar_yuv() {
                        profile.format
                    } else {
                        PixelFormat::Argb
                    };
                    apply_custom(reader, profile, format)?;
                    format
                }
                None => {
                    let natives = reader.native_formats()?;
                    let best = pick_best_native(&natives)
                        .ok_or_else(|| CaptureError::NotSupported("device reports no native formats".into()))?;
                    if best.format.is_planar_yuv() {
                        reader.set_format(&FormatRequest::exact(&best))?;
                    } else {
                        log::info!("Best native format {} is packed, requesting converted ARGB32", best.format.name());
                        reader.set_format(&FormatRequest::converted(&best, PixelFormat::Argb))?;
                    }
                    best.format
                }
            };

            let current = reader.current_format()?;
            let path = if current.format.is_planar_yuv() {
                NegotiationPath::Gpu
            } else if current.format == PixelFormat::Argb {
                NegotiationPath::GpuDegraded
            } else {
                return Err(CaptureError::NotSupported(format!(
                    "requested {} but source delivers {}",
                    requested.name(),
                    current.format.name()
                )));
            };
            Ok((path, current))
        })?;

        Ok(Negotiated {
            path,
            reader,
            format,
            pipeline: Some(pipeline),
        })
    }
}

/// Software tier: reader-side conversion, CPU colour kernels.
pub struct CpuStrategy;

impl NegotiationStrategy for CpuStrategy {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn attempt(&self, ctx: &NegotiationContext<'_>) -> Result<Negotiated, CaptureError> {
        let reader = ctx.system.activate(ctx.index, &ReaderOptions::software())?;
        let (reader, format) = with_reader(reader, |reader| {
            if let Some(profile) = ctx.profile {
                return apply_custom(reader, profile, profile.format);
            }
            for candidate in [PixelFormat::Nv12, PixelFormat::Argb] {
                match reader.set_format(&FormatRequest::subtype(candidate)) {
                    Ok(()) => break,
                    Err(e) => log::debug!("CPU path: {} not accepted: {}", candidate.name(), e),
                }
            }
            convertible(reader.current_format()?)
        })?;

        Ok(Negotiated {
            path: NegotiationPath::Cpu,
            reader,
            format,
            pipeline: None,
        })
    }
}

/// Last resort: a bare reader in whatever format the device starts in.
pub struct MinimalStrategy;

impl NegotiationStrategy for MinimalStrategy {
    fn name(&self) -> &'static str {
        "minimal"
    }

    fn attempt(&self, ctx: &NegotiationContext<'_>) -> Result<Negotiated, CaptureError> {
        let reader = ctx.system.activate(ctx.index, &ReaderOptions::bare())?;
        let (reader, format) = with_reader(reader, |reader| match ctx.profile {
            Some(profile) => apply_custom(reader, profile, profile.format).and_then(convertible),
            None => convertible(reader.current_format()?),
        })?;

        Ok(Negotiated {
            path: NegotiationPath::Minimal,
            reader,
            format,
            pipeline: None,
        })
    }
}

fn convertible(format: MediaFormat) -> Result<MediaFormat, CaptureError> {
    if FrameConverter::supports(format.format) {
        Ok(format)
    } else {
        Err(CaptureError::NotSupported(format!("no CPU conversion from {}", format.format.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::ProfileMode;
    use crate::sim::gpu::SimGpuFactory;
    use crate::sim::video::{SimDevice, SimDeviceSystem};

    fn cascade() -> Vec<Box<dyn NegotiationStrategy>> {
        vec![Box::new(GpuStrategy), Box::new(CpuStrategy), Box::new(MinimalStrategy)]
    }

    fn ctx<'a>(system: &'a SimDeviceSystem, gpu: Option<&'a SimGpuFactory>, config: &'a GpuConfig) -> NegotiationContext<'a> {
        NegotiationContext {
            system,
            index: 0,
            gpu: gpu.map(|g| g as &dyn GpuFactory),
            gpu_config: config,
            profile: None,
        }
    }

    #[test]
    fn score_prefers_area_then_rate_then_format() {
        let small_fast = MediaFormat::new(PixelFormat::P010, 1280, 720, 120, 1);
        let big_slow = MediaFormat::new(PixelFormat::Mjpg, 1920, 1080, 30, 1);
        assert!(score(&big_slow) > score(&small_fast));

        let nv12_60 = MediaFormat::new(PixelFormat::Nv12, 1920, 1080, 60, 1);
        let yuy2_30 = MediaFormat::new(PixelFormat::Yuy2, 1920, 1080, 30, 1);
        assert!(score(&nv12_60) > score(&yuy2_30));

        let p010 = MediaFormat::new(PixelFormat::P010, 1920, 1080, 60, 1);
        assert_eq!(score(&p010) - score(&nv12_60), 1);
        assert_eq!(pick_best_native(&[yuy2_30, p010, nv12_60]), Some(p010));
        assert_eq!(pick_best_native(&[]), None);
    }

    #[test]
    fn gpu_path_preferred_when_available() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Cam").with_native(PixelFormat::Nv12, 1920, 1080, 60, 1)]);
        let gpu = SimGpuFactory::new("Sim Adapter");
        let config = GpuConfig::default();

        let negotiated = negotiate(&cascade(), &ctx(&system, Some(&gpu), &config)).unwrap();
        assert_eq!(negotiated.path, NegotiationPath::Gpu);
        assert!(negotiated.pipeline.is_some());
        assert_eq!(negotiated.format.format, PixelFormat::Nv12);
        assert_eq!(negotiated.format.width, 1920);
    }

    #[test]
    fn gpu_picks_best_native_format() {
        let device = SimDevice::new("Cam")
            .with_native(PixelFormat::Yuy2, 1920, 1080, 60, 1)
            .with_native(PixelFormat::P010, 1920, 1080, 60, 1)
            .with_native(PixelFormat::Nv12, 1280, 720, 60, 1);
        let system = SimDeviceSystem::new(vec![device]);
        let gpu = SimGpuFactory::new("Sim Adapter");
        let config = GpuConfig::default();

        let negotiated = negotiate(&cascade(), &ctx(&system, Some(&gpu), &config)).unwrap();
        assert_eq!(negotiated.path, NegotiationPath::Gpu);
        assert_eq!(negotiated.format.format, PixelFormat::P010);
    }

    #[test]
    fn packed_best_format_degrades_to_converted_rgb() {
        let device = SimDevice::new("Cam").with_native(PixelFormat::Yuy2, 1920, 1080, 30, 1);
        let system = SimDeviceSystem::new(vec![device]);
        let gpu = SimGpuFactory::new("Sim Adapter");
        let config = GpuConfig::default();

        let negotiated = negotiate(&cascade(), &ctx(&system, Some(&gpu), &config)).unwrap();
        assert_eq!(negotiated.path, NegotiationPath::GpuDegraded);
        assert_eq!(negotiated.format.format, PixelFormat::Argb);
        assert_eq!(negotiated.format.stride, 1920 * 4);
    }

    #[test]
    fn falls_back_to_cpu_without_gpu() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Cam").with_native(PixelFormat::Nv12, 1920, 1080, 60, 1)]);
        let config = GpuConfig::default();

        let negotiated = negotiate(&cascade(), &ctx(&system, None, &config)).unwrap();
        assert_eq!(negotiated.path, NegotiationPath::Cpu);
        assert!(negotiated.pipeline.is_none());
        assert_eq!(negotiated.format.format, PixelFormat::Nv12);
    }

    #[test]
    fn gpu_failure_releases_resources_before_cpu() {
        let device = SimDevice::new("Cam").with_native(PixelFormat::Nv12, 1280, 720, 30, 1).cpu_only();
        let system = SimDeviceSystem::new(vec![device]);
        let gpu = SimGpuFactory::new("Sim Adapter");
        let config = GpuConfig::default();

        let negotiated = negotiate(&cascade(), &ctx(&system, Some(&gpu), &config)).unwrap();
        assert_eq!(negotiated.path, NegotiationPath::Cpu);
        assert_eq!(gpu.live_devices(), 0);
        assert_eq!(system.live_readers(), 1);
    }

    #[test]
    fn minimal_path_when_reader_cannot_convert() {
        let device = SimDevice::new("Cam")
            .with_native(PixelFormat::Yuy2, 640, 480, 30, 1)
            .without_processing();
        let system = SimDeviceSystem::new(vec![device]);
        let gpu = SimGpuFactory::new("Sim Adapter");
        let config = GpuConfig::default();

        let negotiated = negotiate(&cascade(), &ctx(&system, Some(&gpu), &config)).unwrap();
        assert_eq!(negotiated.path, NegotiationPath::Minimal);
        assert_eq!(negotiated.format.format, PixelFormat::Yuy2);
        assert_eq!(system.live_readers(), 1);
    }

    #[test]
    fn all_paths_failing_is_io() {
        let device = SimDevice::new("Cam").with_native(PixelFormat::Nv12, 640, 480, 30, 1).failing_activation();
        let system = SimDeviceSystem::new(vec![device]);
        let config = GpuConfig::default();

        let err = negotiate(&cascade(), &ctx(&system, None, &config)).unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
        assert_eq!(system.live_readers(), 0);
    }

    #[test]
    fn custom_profile_is_enforced() {
        let device = SimDevice::new("Cam")
            .with_native(PixelFormat::Nv12, 1920, 1080, 60, 1)
            .with_native(PixelFormat::Nv12, 1280, 720, 30, 1);
        let system = SimDeviceSystem::new(vec![device]);
        let config = GpuConfig::default();

        let profile = CaptureProfile {
            width: 1280,
            height: 720,
            fps_num: 30,
            fps_den: 1,
            format: PixelFormat::Nv12,
            mode: ProfileMode::Custom,
        };
        let mut context = ctx(&system, None, &config);
        context.profile = Some(&profile);
        let negotiated = negotiate(&cascade(), &context).unwrap();
        assert_eq!(negotiated.format.width, 1280);
        assert_eq!(negotiated.format.fps_num, 30);

        let impossible = CaptureProfile {
            width: 3840,
            height: 2160,
            ..profile
        };
        context.profile = Some(&impossible);
        let err = negotiate(&cascade(), &context).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidArgument(_)));
    }

    #[test]
    fn empty_cascade_is_not_supported() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Cam")]);
        let config = GpuConfig::default();
        assert!(matches!(
            negotiate(&[], &ctx(&system, None, &config)),
            Err(CaptureError::NotSupported(_))
        ));
    }
}
