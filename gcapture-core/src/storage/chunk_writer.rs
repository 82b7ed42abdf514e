use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::storage::container::{self, ContainerHeader};
use crate::traits::muxer::{
    AudioStreamConfig, MediaSample, MuxSummary, Muxer, MuxerFactory, StreamIndex, VideoStreamConfig,
};

/// Streaming writer for the GCAP container.
///
/// Stores raw samples for one video and at most one audio stream. Encoding is
/// left to external muxers plugged in through [`MuxerFactory`].
///
/// ## File Format
///
/// ```text
/// [64-byte GCAP header]
/// [record: stream | ts | duration | len | payload]
/// [record: ...]
/// ```
pub struct ChunkFileMuxer {
    file_path: PathBuf,
    video: Option<VideoStreamConfig>,
    audio: Option<AudioStreamConfig>,
    file: Option<BufWriter<File>>,
    total_bytes_written: u64,
    sample_count: u64,
    finalized: bool,
}

impl ChunkFileMuxer {
    pub const VIDEO_STREAM: StreamIndex = StreamIndex(0);
    pub const AUDIO_STREAM: StreamIndex = StreamIndex(1);

    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            video: None,
            audio: None,
            file: None,
            total_bytes_written: 0,
            sample_count: 0,
            finalized: false,
        }
    }

    /// Total bytes written so far (including the header).
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn header(&self) -> Result<ContainerHeader, CaptureError> {
        let video = self
            .video
            .ok_or_else(|| CaptureError::InvalidState("no video stream configured".into()))?;
        Ok(ContainerHeader {
            video_codec: video.codec,
            bit_depth: video.input.bit_depth() as u16,
            width: video.width,
            height: video.height,
            fps_num: video.fps_num,
            fps_den: video.fps_den,
            audio: self.audio.map(|a| a.input),
            data_size: 0,
            sample_count: 0,
        })
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::InvalidState("container is not open".into()))?;
        file.write_all(data)
            .map_err(|e| CaptureError::Io(format!("write failed: {e}")))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}

impl Muxer for ChunkFileMuxer {
    fn add_video_stream(&mut self, config: &VideoStreamConfig) -> Result<StreamIndex, CaptureError> {
        if self.file.is_some() || self.video.is_some() {
            return Err(CaptureError::InvalidState("video stream already configured".into()));
        }
        if config.width == 0 || config.height == 0 || config.fps_num == 0 || config.fps_den == 0 {
            return Err(CaptureError::InvalidArgument(format!(
                "invalid video stream {}x{} @ {}/{}",
                config.width, config.height, config.fps_num, config.fps_den
            )));
        }
        self.video = Some(*config);
        Ok(Self::VIDEO_STREAM)
    }

    fn add_audio_stream(&mut self, config: &AudioStreamConfig) -> Result<StreamIndex, CaptureError> {
        if self.file.is_some() || self.audio.is_some() {
            return Err(CaptureError::InvalidState("audio stream already configured".into()));
        }
        if config.input.sample_rate == 0 || config.input.channels == 0 {
            return Err(CaptureError::InvalidArgument("invalid audio stream format".into()));
        }
        self.audio = Some(*config);
        Ok(Self::AUDIO_STREAM)
    }

    fn begin(&mut self) -> Result<(), CaptureError> {
        if self.file.is_some() {
            return Ok(());
        }
        let header = self.header()?;

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| CaptureError::Io(format!("failed to create directory: {e}")))?;
            }
        }
        let file = File::create(&self.file_path)
            .map_err(|e| CaptureError::Io(format!("failed to create file: {e}")))?;
        self.file = Some(BufWriter::new(file));

        self.write_raw(&container::generate_header(&header))
    }

    fn write_sample(&mut self, stream: StreamIndex, sample: &MediaSample<'_>) -> Result<(), CaptureError> {
        let known = match stream {
            Self::VIDEO_STREAM => self.video.is_some(),
            Self::AUDIO_STREAM => self.audio.is_some(),
            _ => false,
        };
        if !known {
            return Err(CaptureError::InvalidArgument(format!("unknown stream {}", stream.0)));
        }

        let record = container::encode_record_header(stream.0, sample.ts, sample.duration, sample.data.len());
        self.write_raw(&record)?;
        self.write_raw(sample.data)?;
        self.sample_count += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<MuxSummary, CaptureError> {
        if self.finalized {
            return Err(CaptureError::InvalidState("container already finalized".into()));
        }
        let writer = self
            .file
            .take()
            .ok_or_else(|| CaptureError::InvalidState("container is not open".into()))?;
        let mut file = writer
            .into_inner()
            .map_err(|e| CaptureError::Io(format!("flush failed: {}", e.error())))?;

        let mut header = container::generate_header(&self.header()?);
        let data_size = self.total_bytes_written - container::HEADER_SIZE as u64;
        container::patch_data(&mut header, data_size, self.sample_count);
        container::patch_file_size(&mut header, self.total_bytes_written);

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        file.flush()?;
        drop(file);
        self.finalized = true;

        let checksum = sha256_file(&self.file_path)?;
        Ok(MuxSummary {
            bytes_written: self.total_bytes_written,
            checksum: Some(checksum),
        })
    }
}

/// Creates a [`ChunkFileMuxer`] per recording.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkFileMuxerFactory;

impl MuxerFactory for ChunkFileMuxerFactory {
    fn create(&self, path: &Path) -> Result<Box<dyn Muxer>, CaptureError> {
        Ok(Box::new(ChunkFileMuxer::new(path.to_path_buf())))
    }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path).map_err(|e| CaptureError::Io(format!("failed to read file for checksum: {e}")))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
