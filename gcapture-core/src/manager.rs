//! Capture manager: the single entry point that picks a provider backend and
//! forwards the control surface to it.

use std::path::Path;
use std::sync::Arc;

use crate::capture::backends;
use crate::capture::provider::DeviceProvider;
use crate::models::audio_models::AudioEndpointInfo;
use crate::models::config::CaptureConfig;
use crate::models::device::{CaptureProfile, DeviceDescriptor, MediaFormat};
use crate::models::diagnostics::{DeviceProps, ProcessingOptions, SignalStatus};
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::ProviderState;
use crate::traits::audio_endpoint::AudioEndpointService;
use crate::traits::callbacks::{ErrorCallback, FrameCallback};
use crate::traits::device_system::DeviceSystem;
use crate::traits::gpu::GpuFactory;
use crate::traits::muxer::MuxerFactory;

/// Platform collaborators a manager is built on.
#[derive(Clone)]
pub struct Platform {
    /// Device system with hardware transforms (used by the hardware backends).
    pub hardware: Arc<dyn DeviceSystem>,
    /// Device system used by the low-level backend.
    pub low_level: Arc<dyn DeviceSystem>,
    pub gpu: Option<Arc<dyn GpuFactory>>,
    pub audio: Arc<dyn AudioEndpointService>,
    pub muxers: Arc<dyn MuxerFactory>,
}

/// Owns one provider for the lifetime of a capture client.
pub struct CaptureManager {
    config: CaptureConfig,
    provider: Box<dyn DeviceProvider>,
    audio: Arc<dyn AudioEndpointService>,
}

impl CaptureManager {
    pub fn new(config: CaptureConfig, platform: Platform) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::InvalidArgument)?;
        let provider = backends::create_provider(&config, &platform);
        log::info!("Capture manager ready ({:?} backend)", config.backend);
        Ok(Self {
            config,
            provider,
            audio: platform.audio,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        self.provider.enumerate()
    }

    /// Audio capture endpoints usable for recording.
    pub fn audio_devices(&self) -> Result<Vec<AudioEndpointInfo>, CaptureError> {
        self.audio.list_endpoints()
    }

    pub fn open(&mut self, index: usize) -> Result<(), CaptureError> {
        self.provider.open(index)
    }

    pub fn set_profile(&mut self, profile: CaptureProfile) -> Result<(), CaptureError> {
        self.provider.set_profile(profile)
    }

    pub fn set_buffers(&mut self, count: u32, bytes_hint: usize) -> Result<(), CaptureError> {
        self.provider.set_buffers(count, bytes_hint)
    }

    pub fn set_callbacks(&mut self, frame: Option<FrameCallback>, error: Option<ErrorCallback>) {
        self.provider.set_callbacks(frame, error);
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.provider.start()
    }

    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.provider.stop()
    }

    pub fn close(&mut self) {
        self.provider.close();
    }

    pub fn start_recording(&mut self, path: &Path) -> Result<(), CaptureError> {
        self.provider.start_recording(path)
    }

    pub fn stop_recording(&mut self) -> Result<Option<RecordingResult>, CaptureError> {
        self.provider.stop_recording()
    }

    pub fn set_recording_audio_device(&mut self, endpoint_id: Option<&str>) {
        self.provider.set_recording_audio_device(endpoint_id);
    }

    pub fn device_props(&self) -> Result<DeviceProps, CaptureError> {
        self.provider.device_props()
    }

    pub fn signal_status(&self) -> Result<SignalStatus, CaptureError> {
        self.provider.signal_status()
    }

    pub fn set_processing(&mut self, options: ProcessingOptions) -> Result<(), CaptureError> {
        self.provider.set_processing(options)
    }

    pub fn state(&self) -> ProviderState {
        self.provider.state()
    }

    pub fn negotiated_format(&self) -> Option<MediaFormat> {
        self.provider.negotiated_format()
    }

    pub fn is_cpu_path(&self) -> bool {
        self.provider.is_cpu_path()
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.provider.close();
    }
}
