use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which provider backend a `CaptureManager` builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Hardware-transform backend, GPU path attempted first.
    HardwareGpu,
    /// Hardware-transform backend, GPU path skipped.
    HardwareCpu,
    /// Lower-level backend with software conversion only.
    LowLevel,
}

/// GPU preferences for the hardware-transform backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Adapter to create the GPU device on, or `None` for the system default.
    pub adapter_index: Option<u32>,

    /// Use the compute kernel for 8-bit planar input when the device has one.
    pub prefer_compute: bool,

    /// Draw the device/format text overlay on GPU frames.
    pub overlay: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            adapter_index: None,
            prefer_compute: true,
            overlay: true,
        }
    }
}

/// Audio capture settings used while recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Requested sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Requested channel count (default: 2).
    pub channels: u16,

    /// Requested bit depth (default: 16). Output is always PCM16.
    pub bits: u16,

    /// Maximum queued chunks before the oldest is dropped (~2 s of 10 ms packets).
    pub queue_depth: usize,

    /// How long `AudioCapture::start` waits for the capture thread to initialize.
    pub init_timeout_ms: u64,

    /// Upper bound on one wait for the endpoint's data-ready signal.
    pub poll_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bits: 16,
            queue_depth: 200,
            init_timeout_ms: 800,
            poll_interval_ms: 20,
        }
    }
}

impl AudioConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Configuration handed to the provider factory at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub backend: BackendKind,

    pub gpu: GpuConfig,

    pub audio: AudioConfig,

    /// Bounded wait for one frame in the capture loop.
    pub frame_timeout_ms: u64,

    /// Target video bitrate for recordings (bits/s).
    pub video_bitrate: u32,

    /// Target audio bitrate for recordings (bits/s).
    pub audio_bitrate: u32,
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.audio.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.audio.channels) {
            return Err(format!("unsupported channel count: {}", self.audio.channels));
        }
        if ![16, 24, 32].contains(&self.audio.bits) {
            return Err(format!("unsupported bit depth: {}", self.audio.bits));
        }
        if self.audio.queue_depth == 0 {
            return Err("audio queue depth must be positive".into());
        }
        if self.frame_timeout_ms == 0 {
            return Err("frame timeout must be positive".into());
        }
        if self.video_bitrate == 0 || self.audio_bitrate == 0 {
            return Err("bitrates must be positive".into());
        }
        Ok(())
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Whether this backend attempts the GPU-resident path.
    pub fn wants_gpu(&self) -> bool {
        self.backend == BackendKind::HardwareGpu
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::HardwareGpu,
            gpu: GpuConfig::default(),
            audio: AudioConfig::default(),
            frame_timeout_ms: 500,
            video_bitrate: 8_000_000,
            audio_bitrate: 128_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.wants_gpu());
        assert_eq!(config.audio.init_timeout(), Duration::from_millis(800));
    }

    #[test]
    fn rejects_bad_audio_settings() {
        let mut config = CaptureConfig::default();
        config.audio.channels = 6;
        assert!(config.validate().is_err());

        let mut config = CaptureConfig::default();
        config.audio.bits = 8;
        assert!(config.validate().is_err());

        let mut config = CaptureConfig::default();
        config.audio.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn backend_round_trips_through_json() {
        let config = CaptureConfig {
            backend: BackendKind::LowLevel,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"low_level\""));
        let back: CaptureConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert!(!back.wants_gpu());
    }
}
