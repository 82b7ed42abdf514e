use std::path::Path;

use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;
use crate::models::recording_result::{AudioCodec, VideoCodec};

/// Index of a stream added to a muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamIndex(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStreamConfig {
    pub codec: VideoCodec,
    /// Raw layout fed to the encoder.
    pub input: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub bitrate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamConfig {
    pub codec: AudioCodec,
    /// PCM layout fed to the encoder.
    pub input: AudioFormat,
    pub bitrate: u32,
}

/// One raw sample with explicit timing in 100 ns ticks.
#[derive(Debug, Clone, Copy)]
pub struct MediaSample<'a> {
    pub ts: i64,
    pub duration: i64,
    pub data: &'a [u8],
}

/// What a muxer reports once finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxSummary {
    pub bytes_written: u64,
    pub checksum: Option<String>,
}

/// Container muxer/encoder. Not safe for concurrent writes; callers serialize.
pub trait Muxer: Send {
    fn add_video_stream(&mut self, config: &VideoStreamConfig) -> Result<StreamIndex, CaptureError>;

    fn add_audio_stream(&mut self, config: &AudioStreamConfig) -> Result<StreamIndex, CaptureError>;

    /// Called once after all streams are added.
    fn begin(&mut self) -> Result<(), CaptureError>;

    /// Timestamps per stream must be monotonic.
    fn write_sample(&mut self, stream: StreamIndex, sample: &MediaSample<'_>) -> Result<(), CaptureError>;

    /// Flush trailing data and close the output.
    fn finalize(&mut self) -> Result<MuxSummary, CaptureError>;
}

pub trait MuxerFactory: Send + Sync {
    fn create(&self, path: &Path) -> Result<Box<dyn Muxer>, CaptureError>;
}
