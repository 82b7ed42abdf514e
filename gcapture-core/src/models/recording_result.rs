use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::AudioFormat;

/// Video codec profile requested from the muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
}

/// Audio codec profile requested from the muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
}

/// Counters accumulated by the recorder during one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStats {
    pub video_frames: u64,
    pub audio_chunks: u64,
    pub skipped_chunks: u64,
    pub silence_pieces: u64,
    /// Audio PTS cursor at close, in 100 ns ticks.
    pub audio_cursor: i64,
    /// Relative timestamp of the last video frame, in 100 ns ticks.
    pub last_video_ts: i64,
}

/// Result returned when a recording session is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub has_audio: bool,
    pub stats: RecordingStats,
    pub metadata: RecordingMetadata,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub file_path: String,
    pub created_at: String,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub video_codec: VideoCodec,
    pub audio_codec: Option<AudioCodec>,
    pub audio_format: Option<AudioFormat>,
    pub checksum: Option<String>,
}

impl RecordingMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_path: &str,
        duration_secs: f64,
        width: u32,
        height: u32,
        fps_num: u32,
        fps_den: u32,
        video_codec: VideoCodec,
        audio_format: Option<AudioFormat>,
        checksum: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            duration_secs,
            width,
            height,
            fps_num,
            fps_den,
            video_codec,
            audio_codec: audio_format.map(|_| AudioCodec::Aac),
            audio_format,
            checksum,
        }
    }
}
