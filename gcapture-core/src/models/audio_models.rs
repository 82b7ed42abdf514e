use serde::{Deserialize, Serialize};

/// 100-nanosecond ticks per second, the time base of chunks and muxer samples.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Requested PCM format for an audio capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
}

impl AudioFormat {
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits: 16,
        }
    }

    pub fn block_align(&self) -> usize {
        self.channels as usize * (self.bits as usize / 8)
    }

    /// Duration of `frames` sample frames in 100 ns ticks.
    pub fn frames_to_ticks(&self, frames: u64) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (frames as i128 * TICKS_PER_SECOND as i128 / self.sample_rate as i128) as i64
    }

    /// Number of whole sample frames covering `ticks`.
    pub fn ticks_to_frames(&self, ticks: i64) -> u64 {
        if ticks <= 0 {
            return 0;
        }
        (ticks as i128 * self.sample_rate as i128 / TICKS_PER_SECOND as i128) as u64
    }
}

/// Format the audio engine actually delivers packets in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
    pub is_float: bool,
    pub block_align: u16,
}

impl EngineFormat {
    pub fn from_request(format: &AudioFormat) -> Self {
        Self {
            sample_rate: format.sample_rate,
            channels: format.channels,
            bits: format.bits,
            is_float: false,
            block_align: format.block_align() as u16,
        }
    }

    /// The PCM16 format chunks are normalized to.
    pub fn output_format(&self) -> AudioFormat {
        AudioFormat::pcm16(self.sample_rate, self.channels)
    }
}

/// One capture endpoint reported by the audio endpoint service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEndpointInfo {
    pub id: String,
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub is_float: bool,
    pub is_default: bool,
}

/// A timestamped block of interleaved PCM16 audio.
///
/// Moved from the capture thread to exactly one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Start relative to the first chunk of the capture, in 100 ns ticks.
    pub ts: i64,
    /// Duration in 100 ns ticks.
    pub duration: i64,
    pub pcm: Vec<u8>,
}

impl AudioChunk {
    pub fn end(&self) -> i64 {
        self.ts + self.duration
    }
}
