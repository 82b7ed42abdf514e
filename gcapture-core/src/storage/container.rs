//! GCAP container layout.
//!
//! A RIFF-style file holding raw timestamped samples for one video stream and
//! an optional audio stream. Sizes are written as placeholders and patched
//! when the recording is finalized.
//!
//! Header layout:
//! ```text
//! [0-3]    "RIFF"
//! [4-7]    file size - 8
//! [8-11]   "GCAP"
//! [12-15]  "vfmt"
//! [16-17]  video codec (0 = H.264, 1 = HEVC)
//! [18-19]  bit depth
//! [20-23]  width
//! [24-27]  height
//! [28-31]  fps numerator
//! [32-35]  fps denominator
//! [36-39]  "afmt"
//! [40-43]  audio sample rate (0 = no audio stream)
//! [44-45]  channels
//! [46-47]  bits per sample
//! [48-51]  "data"
//! [52-55]  data size
//! [56-59]  sample count
//! [60-63]  reserved
//! ```
//!
//! Each sample record is `[stream u32][ts i64][duration i64][len u32]`
//! followed by `len` payload bytes, all little-endian.

use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;
use crate::models::recording_result::VideoCodec;

pub const HEADER_SIZE: usize = 64;
pub const RECORD_HEADER_SIZE: usize = 24;

/// Stream parameters stored in the container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub video_codec: VideoCodec,
    pub bit_depth: u16,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub audio: Option<AudioFormat>,
    pub data_size: u32,
    pub sample_count: u32,
}

fn codec_tag(codec: VideoCodec) -> u16 {
    match codec {
        VideoCodec::H264 => 0,
        VideoCodec::Hevc => 1,
    }
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn i64_at(bytes: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_le_bytes(raw)
}

/// Generate the fixed-size container header.
pub fn generate_header(header: &ContainerHeader) -> [u8; HEADER_SIZE] {
    let audio = header.audio.unwrap_or(AudioFormat {
        sample_rate: 0,
        channels: 0,
        bits: 0,
    });
    let riff_size = (HEADER_SIZE as u32 - 8) + header.data_size;

    let mut out = [0u8; HEADER_SIZE];
    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());
    out[8..12].copy_from_slice(b"GCAP");

    out[12..16].copy_from_slice(b"vfmt");
    out[16..18].copy_from_slice(&codec_tag(header.video_codec).to_le_bytes());
    out[18..20].copy_from_slice(&header.bit_depth.to_le_bytes());
    out[20..24].copy_from_slice(&header.width.to_le_bytes());
    out[24..28].copy_from_slice(&header.height.to_le_bytes());
    out[28..32].copy_from_slice(&header.fps_num.to_le_bytes());
    out[32..36].copy_from_slice(&header.fps_den.to_le_bytes());

    out[36..40].copy_from_slice(b"afmt");
    out[40..44].copy_from_slice(&audio.sample_rate.to_le_bytes());
    out[44..46].copy_from_slice(&audio.channels.to_le_bytes());
    out[46..48].copy_from_slice(&audio.bits.to_le_bytes());

    out[48..52].copy_from_slice(b"data");
    out[52..56].copy_from_slice(&header.data_size.to_le_bytes());
    out[56..60].copy_from_slice(&header.sample_count.to_le_bytes());
    out
}

/// Parse a container header.
pub fn parse_header(bytes: &[u8]) -> Result<ContainerHeader, CaptureError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CaptureError::Io("container header truncated".into()));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"GCAP" || &bytes[48..52] != b"data" {
        return Err(CaptureError::Io("not a GCAP container".into()));
    }
    let video_codec = match u16_at(bytes, 16) {
        0 => VideoCodec::H264,
        1 => VideoCodec::Hevc,
        other => return Err(CaptureError::Io(format!("unknown video codec tag {other}"))),
    };
    let sample_rate = u32_at(bytes, 40);
    let audio = (sample_rate > 0).then(|| AudioFormat {
        sample_rate,
        channels: u16_at(bytes, 44),
        bits: u16_at(bytes, 46),
    });

    Ok(ContainerHeader {
        video_codec,
        bit_depth: u16_at(bytes, 18),
        width: u32_at(bytes, 20),
        height: u32_at(bytes, 24),
        fps_num: u32_at(bytes, 28),
        fps_den: u32_at(bytes, 32),
        audio,
        data_size: u32_at(bytes, 52),
        sample_count: u32_at(bytes, 56),
    })
}

/// Patch the RIFF size field at offset 4.
pub fn patch_file_size(header: &mut [u8], total_file_size: u64) {
    let riff_size = total_file_size.saturating_sub(8) as u32;
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
}

/// Patch the data size (offset 52) and sample count (offset 56).
pub fn patch_data(header: &mut [u8], data_size: u64, sample_count: u64) {
    header[52..56].copy_from_slice(&(data_size as u32).to_le_bytes());
    header[56..60].copy_from_slice(&(sample_count as u32).to_le_bytes());
}

/// Encode the fixed part of one sample record.
pub fn encode_record_header(stream: u32, ts: i64, duration: i64, len: usize) -> [u8; RECORD_HEADER_SIZE] {
    let mut out = [0u8; RECORD_HEADER_SIZE];
    out[0..4].copy_from_slice(&stream.to_le_bytes());
    out[4..12].copy_from_slice(&ts.to_le_bytes());
    out[12..20].copy_from_slice(&duration.to_le_bytes());
    out[20..24].copy_from_slice(&(len as u32).to_le_bytes());
    out
}

/// One sample record read back from a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub stream: u32,
    pub ts: i64,
    pub duration: i64,
    pub data: Vec<u8>,
}

/// Parse all sample records following the header.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<SampleRecord>, CaptureError> {
    let mut records = Vec::new();
    let mut at = HEADER_SIZE;
    while at < bytes.len() {
        if bytes.len() - at < RECORD_HEADER_SIZE {
            return Err(CaptureError::Io(format!("truncated record at offset {at}")));
        }
        let len = u32_at(bytes, at + 20) as usize;
        let start = at + RECORD_HEADER_SIZE;
        if bytes.len() - start < len {
            return Err(CaptureError::Io(format!("truncated payload at offset {start}")));
        }
        records.push(SampleRecord {
            stream: u32_at(bytes, at),
            ts: i64_at(bytes, at + 4),
            duration: i64_at(bytes, at + 12),
            data: bytes[start..start + len].to_vec(),
        });
        at = start + len;
    }
    Ok(records)
}
