use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::models::device::{DeviceDescriptor, MediaFormat};
use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;

/// Opaque GPU device manager handed to a source so hardware can produce textures.
pub type GpuBinding = Arc<dyn Any + Send + Sync>;

/// Attributes a source reader is created with.
#[derive(Clone, Default)]
pub struct ReaderOptions {
    /// Allow hardware decoders/processors in the pipeline.
    pub hardware_transforms: bool,
    /// Allow the reader to convert formats (decode MJPG, colour convert).
    pub video_processing: bool,
    /// Deliver samples as textures on this GPU device.
    pub gpu: Option<GpuBinding>,
}

impl ReaderOptions {
    pub fn gpu(binding: GpuBinding) -> Self {
        Self {
            hardware_transforms: true,
            video_processing: true,
            gpu: Some(binding),
        }
    }

    pub fn software() -> Self {
        Self {
            hardware_transforms: false,
            video_processing: true,
            gpu: None,
        }
    }

    pub fn bare() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("hardware_transforms", &self.hardware_transforms)
            .field("video_processing", &self.video_processing)
            .field("gpu", &self.gpu.is_some())
            .finish()
    }
}

/// A media type request. Unset fields leave the choice to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRequest {
    pub format: PixelFormat,
    pub size: Option<(u32, u32)>,
    pub rate: Option<(u32, u32)>,
}

impl FormatRequest {
    pub fn subtype(format: PixelFormat) -> Self {
        Self {
            format,
            size: None,
            rate: None,
        }
    }

    pub fn exact(media: &MediaFormat) -> Self {
        Self {
            format: media.format,
            size: Some((media.width, media.height)),
            rate: Some((media.fps_num, media.fps_den)),
        }
    }

    /// Same size and rate as `media`, different pixel format.
    pub fn converted(media: &MediaFormat, format: PixelFormat) -> Self {
        Self {
            format,
            ..Self::exact(media)
        }
    }
}

/// A GPU-resident frame produced by a GPU-bound source.
pub trait TextureResource: Send {
    fn format(&self) -> PixelFormat;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn as_any(&self) -> &dyn Any;
}

pub enum SamplePayload {
    /// Contiguous frame bytes laid out per the negotiated format and stride.
    Memory(Vec<u8>),
    Texture(Box<dyn TextureResource>),
}

/// One frame pulled from a source reader.
pub struct CapturedSample {
    /// Presentation time in 100 ns ticks.
    pub timestamp: i64,
    pub payload: SamplePayload,
}

/// Hardware transform pipeline bound to one activated device.
///
/// The source may substitute a compatible format for the one requested;
/// callers always re-read [`SourceReader::current_format`].
pub trait SourceReader: Send {
    /// Formats the device exposes natively.
    fn native_formats(&mut self) -> Result<Vec<MediaFormat>, CaptureError>;

    fn set_format(&mut self, request: &FormatRequest) -> Result<(), CaptureError>;

    /// The format the source actually negotiated.
    fn current_format(&mut self) -> Result<MediaFormat, CaptureError>;

    /// Pull one frame, waiting at most `timeout`. `Ok(None)` means no frame yet.
    fn read_sample(&mut self, timeout: Duration) -> Result<Option<CapturedSample>, CaptureError>;

    /// Release the underlying device. Further calls fail.
    fn shutdown(&mut self);
}

/// Device enumeration and activation service.
pub trait DeviceSystem: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;

    /// Activate device `index` and build a reader with `options`.
    fn activate(&self, index: usize, options: &ReaderOptions) -> Result<Box<dyn SourceReader>, CaptureError>;
}
