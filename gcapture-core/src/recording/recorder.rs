//! Live A/V recorder.
//!
//! Video frames are pushed by the capture thread through
//! [`Recorder::write_frame`]. Audio comes from an [`AudioCapture`] owned by
//! the session and is drained into the muxer by a dedicated thread. Both
//! writers share one muxer lock, held per sample.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio::capture::AudioCapture;
use crate::models::audio_models::{AudioFormat, TICKS_PER_SECOND};
use crate::models::config::CaptureConfig;
use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;
use crate::models::recording_result::{AudioCodec, RecordingMetadata, RecordingResult, RecordingStats, VideoCodec};
use crate::processing::chunk_queue::ChunkQueue;
use crate::recording::timeline::{AudioTimeline, Placement, MAX_CHUNKS_PER_PASS};
use crate::storage::metadata;
use crate::traits::audio_endpoint::AudioEndpointService;
use crate::traits::muxer::{AudioStreamConfig, MediaSample, Muxer, MuxerFactory, StreamIndex, VideoStreamConfig};

type SharedMuxer = Arc<Mutex<Box<dyn Muxer>>>;

/// Drain wait per pass.
const DRAIN_WAIT: Duration = Duration::from_millis(50);

/// Video parameters of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingTarget {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// 10-bit (P010) input; otherwise 8-bit NV12.
    pub ten_bit: bool,
}

impl RecordingTarget {
    pub fn codec(&self) -> VideoCodec {
        if self.ten_bit {
            VideoCodec::Hevc
        } else {
            VideoCodec::H264
        }
    }

    pub fn input_format(&self) -> PixelFormat {
        if self.ten_bit {
            PixelFormat::P010
        } else {
            PixelFormat::Nv12
        }
    }

    /// Duration of one frame in 100 ns ticks.
    pub fn frame_duration(&self) -> i64 {
        TICKS_PER_SECOND * self.fps_den as i64 / self.fps_num as i64
    }

    fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 || self.fps_num == 0 || self.fps_den == 0 {
            return Err(CaptureError::InvalidArgument(format!(
                "invalid recording target {}x{} @ {}/{}",
                self.width, self.height, self.fps_num, self.fps_den
            )));
        }
        Ok(())
    }
}

/// Audio side of a session.
struct AudioTrack {
    capture: AudioCapture,
    format: AudioFormat,
    running: Arc<AtomicBool>,
    drain_handle: Option<thread::JoinHandle<AudioTimeline>>,
}

struct RecorderSession {
    path: PathBuf,
    target: RecordingTarget,
    writer: SharedMuxer,
    video_stream: StreamIndex,
    audio: Option<AudioTrack>,
    first_ts: Option<i64>,
    last_video_ts: i64,
    video_frames: u64,
    packed: Vec<u8>,
}

/// Muxer and started audio of a session that is not recording yet.
pub struct PreparedSession {
    path: PathBuf,
    target: RecordingTarget,
    muxer: Box<dyn Muxer>,
    video_stream: StreamIndex,
    audio: Option<(AudioCapture, AudioFormat, StreamIndex)>,
}

/// Creates sessions without touching a live [`Recorder`]. Starting audio
/// can block for the endpoint's init timeout.
#[derive(Clone)]
pub struct SessionBuilder {
    muxers: Arc<dyn MuxerFactory>,
    audio_service: Arc<dyn AudioEndpointService>,
    config: CaptureConfig,
}

impl SessionBuilder {
    /// Configure the muxer and start audio. Audio failures downgrade to a
    /// video-only session.
    pub fn prepare(&self, path: &Path, target: RecordingTarget, audio_endpoint: Option<&str>) -> Result<PreparedSession, CaptureError> {
        target.validate()?;
        if path.as_os_str().is_empty() {
            return Err(CaptureError::InvalidArgument("empty recording path".into()));
        }

        let mut muxer = self.muxers.create(path)?;
        let video_config = VideoStreamConfig {
            codec: target.codec(),
            input: target.input_format(),
            width: target.width,
            height: target.height,
            fps_num: target.fps_num,
            fps_den: target.fps_den,
            bitrate: self.config.video_bitrate,
        };
        let video_stream = muxer.add_video_stream(&video_config)?;

        let audio = self.open_audio(muxer.as_mut(), audio_endpoint);
        if let Err(e) = muxer.begin() {
            if let Some((mut capture, _, _)) = audio {
                capture.stop();
            }
            return Err(CaptureError::Io(format!("failed to begin writing: {e}")));
        }

        log::info!(
            "Recording to {}: {:?} from {} {}x{} @ {}/{} fps, {} bps, audio {}",
            path.display(),
            video_config.codec,
            video_config.input.name(),
            video_config.width,
            video_config.height,
            video_config.fps_num,
            video_config.fps_den,
            video_config.bitrate,
            match &audio {
                Some((_, format, _)) => format!("AAC {} Hz {} ch {} bps", format.sample_rate, format.channels, self.config.audio_bitrate),
                None => "none".to_string(),
            }
        );

        Ok(PreparedSession {
            path: path.to_path_buf(),
            target,
            muxer,
            video_stream,
            audio,
        })
    }

    fn open_audio(&self, muxer: &mut dyn Muxer, endpoint: Option<&str>) -> Option<(AudioCapture, AudioFormat, StreamIndex)> {
        let audio_config = &self.config.audio;
        let requested = AudioFormat {
            sample_rate: audio_config.sample_rate,
            channels: audio_config.channels,
            bits: audio_config.bits,
        };
        let mut capture = AudioCapture::new(Arc::clone(&self.audio_service), audio_config.clone());
        let format = match capture.start(requested, endpoint) {
            Ok(format) => format,
            Err(e) => {
                log::warn!("Audio unavailable, recording video only: {}", e);
                return None;
            }
        };

        let stream_config = AudioStreamConfig {
            codec: AudioCodec::Aac,
            input: format,
            bitrate: self.config.audio_bitrate,
        };
        match muxer.add_audio_stream(&stream_config) {
            Ok(stream) => Some((capture, format, stream)),
            Err(e) => {
                log::warn!("Audio stream rejected, recording video only: {}", e);
                capture.stop();
                None
            }
        }
    }
}

/// Muxes live NV12/P010 frames with captured audio.
pub struct Recorder {
    builder: SessionBuilder,
    session: Option<RecorderSession>,
}

impl Recorder {
    pub fn new(muxers: Arc<dyn MuxerFactory>, audio_service: Arc<dyn AudioEndpointService>, config: CaptureConfig) -> Self {
        Self {
            builder: SessionBuilder {
                muxers,
                audio_service,
                config,
            },
            session: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.audio.is_some())
    }

    pub fn target(&self) -> Option<RecordingTarget> {
        self.session.as_ref().map(|s| s.target)
    }

    pub fn builder(&self) -> SessionBuilder {
        self.builder.clone()
    }

    /// Prepare and install a session. An existing session is closed first.
    pub fn open(&mut self, path: &Path, target: RecordingTarget, audio_endpoint: Option<&str>) -> Result<(), CaptureError> {
        self.close_previous();
        let prepared = self.builder.prepare(path, target, audio_endpoint)?;
        self.install(prepared);
        Ok(())
    }

    /// Start recording into a prepared session, replacing any open one.
    pub fn install(&mut self, prepared: PreparedSession) {
        self.close_previous();
        let PreparedSession {
            path,
            target,
            muxer,
            video_stream,
            audio,
        } = prepared;

        let writer: SharedMuxer = Arc::new(Mutex::new(muxer));
        let audio = audio.map(|(capture, format, stream)| {
            let running = Arc::new(AtomicBool::new(true));
            let drain_handle = spawn_drain(capture.queue(), Arc::clone(&writer), stream, format, Arc::clone(&running));
            AudioTrack {
                capture,
                format,
                running,
                drain_handle,
            }
        });

        let bpp = if target.ten_bit { 2 } else { 1 };
        let frame_bytes = packed_frame_size(target.width, target.height, bpp);
        self.session = Some(RecorderSession {
            path,
            target,
            writer,
            video_stream,
            audio,
            first_ts: None,
            last_video_ts: 0,
            video_frames: 0,
            packed: Vec::with_capacity(frame_bytes),
        });
    }

    fn close_previous(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Closing previous recording failed: {}", e);
        }
    }

    /// Write one planar frame. `ts` is the source timestamp in 100 ns ticks;
    /// the first frame of a session anchors time zero.
    pub fn write_frame(&mut self, y: &[u8], y_stride: usize, uv: &[u8], uv_stride: usize, ts: i64) -> Result<(), CaptureError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CaptureError::InvalidState("recorder is not open".into()))?;
        let target = session.target;
        let bpp = if target.ten_bit { 2 } else { 1 };

        pack_planes(&mut session.packed, y, y_stride, uv, uv_stride, target.width, target.height, bpp)?;

        let anchor = *session.first_ts.get_or_insert(ts);
        let mut rel = ts - anchor;
        if session.video_frames > 0 && rel <= session.last_video_ts {
            log::debug!("Non-increasing video timestamp {} after {}", rel, session.last_video_ts);
            rel = session.last_video_ts + 1;
        }

        let sample = MediaSample {
            ts: rel,
            duration: target.frame_duration(),
            data: &session.packed,
        };
        session
            .writer
            .lock()
            .write_sample(session.video_stream, &sample)
            .map_err(|e| CaptureError::Io(format!("video write failed: {e}")))?;

        session.last_video_ts = rel;
        session.video_frames += 1;
        Ok(())
    }

    /// Stop audio, finalize the file and reset for reuse. Returns `None` when
    /// nothing was being recorded.
    pub fn close(&mut self) -> Result<Option<RecordingResult>, CaptureError> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };

        let mut stats = RecordingStats {
            video_frames: session.video_frames,
            last_video_ts: session.last_video_ts,
            ..Default::default()
        };

        let audio_format = match session.audio {
            Some(mut track) => {
                track.running.store(false, Ordering::SeqCst);
                track.capture.queue().notify();
                if let Some(handle) = track.drain_handle.take() {
                    match handle.join() {
                        Ok(timeline) => {
                            stats.audio_chunks = timeline.chunks();
                            stats.skipped_chunks = timeline.skipped();
                            stats.silence_pieces = timeline.silence_pieces();
                            stats.audio_cursor = timeline.cursor();
                        }
                        Err(_) => log::error!("Audio drain thread panicked"),
                    }
                }
                track.capture.stop();
                Some(track.format)
            }
            None => None,
        };

        let summary = session
            .writer
            .lock()
            .finalize()
            .map_err(|e| CaptureError::Io(format!("failed to finalize recording: {e}")))?;

        let video_end = if session.video_frames > 0 {
            session.last_video_ts + session.target.frame_duration()
        } else {
            0
        };
        let duration_secs = video_end.max(stats.audio_cursor) as f64 / TICKS_PER_SECOND as f64;

        let target = session.target;
        let metadata = RecordingMetadata::new(
            &session.path.to_string_lossy(),
            duration_secs,
            target.width,
            target.height,
            target.fps_num,
            target.fps_den,
            target.codec(),
            audio_format,
            summary.checksum,
        );
        if let Err(e) = metadata::write_metadata(&metadata, &session.path) {
            log::warn!("Failed to write recording metadata: {}", e);
        }

        log::info!(
            "Recording finalized: {} ({} frames, {} audio chunks, {:.2}s)",
            session.path.display(),
            stats.video_frames,
            stats.audio_chunks,
            duration_secs
        );

        Ok(Some(RecordingResult {
            file_path: session.path,
            duration_secs,
            has_audio: audio_format.is_some(),
            stats,
            metadata,
        }))
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Recorder close on drop failed: {}", e);
        }
    }
}

fn packed_frame_size(width: u32, height: u32, bpp: usize) -> usize {
    let luma = width as usize * bpp * height as usize;
    let chroma = (width as usize).div_ceil(2) * 2 * bpp * (height as usize).div_ceil(2);
    luma + chroma
}

/// Copy planes into `out` with rows packed tightly.
#[allow(clippy::too_many_arguments)]
fn pack_planes(
    out: &mut Vec<u8>,
    y: &[u8],
    y_stride: usize,
    uv: &[u8],
    uv_stride: usize,
    width: u32,
    height: u32,
    bpp: usize,
) -> Result<(), CaptureError> {
    let y_row = width as usize * bpp;
    let uv_row = (width as usize).div_ceil(2) * 2 * bpp;
    let y_rows = height as usize;
    let uv_rows = (height as usize).div_ceil(2);

    let fits = |len: usize, stride: usize, row: usize, rows: usize| stride >= row && len >= (rows - 1) * stride + row;
    if !fits(y.len(), y_stride, y_row, y_rows) || !fits(uv.len(), uv_stride, uv_row, uv_rows) {
        return Err(CaptureError::InvalidArgument(format!(
            "frame planes too small for {}x{} (y {} / {}, uv {} / {})",
            width,
            height,
            y.len(),
            y_stride,
            uv.len(),
            uv_stride
        )));
    }

    out.clear();
    for row in 0..y_rows {
        out.extend_from_slice(&y[row * y_stride..row * y_stride + y_row]);
    }
    for row in 0..uv_rows {
        out.extend_from_slice(&uv[row * uv_stride..row * uv_stride + uv_row]);
    }
    Ok(())
}

fn spawn_drain(
    queue: Arc<ChunkQueue>,
    writer: SharedMuxer,
    stream: StreamIndex,
    format: AudioFormat,
    running: Arc<AtomicBool>,
) -> Option<thread::JoinHandle<AudioTimeline>> {
    let spawned = thread::Builder::new()
        .name("gcapture-audio-drain".into())
        .spawn(move || {
            let mut timeline = AudioTimeline::new(format);
            while running.load(Ordering::SeqCst) {
                queue.wait_for_data(DRAIN_WAIT);
                if let Err(e) = drain_once(&queue, &writer, stream, &mut timeline) {
                    log::error!("Audio drain stopped: {}", e);
                    return timeline;
                }
            }
            if let Err(e) = drain_once(&queue, &writer, stream, &mut timeline) {
                log::error!("Final audio drain failed: {}", e);
            }
            timeline
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("Failed to spawn audio drain thread: {}", e);
            None
        }
    }
}

/// Place up to [`MAX_CHUNKS_PER_PASS`] queued chunks on the timeline and
/// write them.
fn drain_once(queue: &ChunkQueue, writer: &SharedMuxer, stream: StreamIndex, timeline: &mut AudioTimeline) -> Result<(), CaptureError> {
    let block = timeline.format().block_align();
    let mut silence = Vec::new();

    for _ in 0..MAX_CHUNKS_PER_PASS {
        let Some(chunk) = queue.pop() else {
            break;
        };
        for placement in timeline.place(&chunk) {
            let sample = match placement {
                Placement::Silence { ts, duration, frames } => {
                    silence.clear();
                    silence.resize(frames as usize * block, 0);
                    MediaSample {
                        ts,
                        duration,
                        data: &silence,
                    }
                }
                Placement::Audio { ts, duration, offset } => MediaSample {
                    ts,
                    duration,
                    data: &chunk.pcm[offset..],
                },
            };
            writer.lock().write_sample(stream, &sample)?;
        }
    }
    Ok(())
}
