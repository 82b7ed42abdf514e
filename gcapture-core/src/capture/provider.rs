//! Device provider: one capture device driven through
//! `Closed -> Negotiating -> Opened -> Streaming`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capture::backends::Backend;
use crate::capture::negotiation::{self, NegotiationContext};
use crate::capture::notifier::Notifier;
use crate::capture::worker::{CaptureWorker, ContextSlot, StreamContext, WorkerShared};
use crate::models::config::CaptureConfig;
use crate::models::device::{CaptureProfile, DeviceDescriptor, MediaFormat};
use crate::models::diagnostics::{DeviceProps, ProcessingOptions, SignalStatus};
use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;
use crate::models::recording_result::RecordingResult;
use crate::models::state::{NegotiationPath, ProviderState};
use crate::processing::frame_converter::{FrameConverter, BYTES_PER_PIXEL};
use crate::recording::recorder::{Recorder, RecordingTarget};
use crate::traits::audio_endpoint::AudioEndpointService;
use crate::traits::callbacks::{ErrorCallback, FrameCallback};
use crate::traits::device_system::FormatRequest;
use crate::traits::muxer::MuxerFactory;

/// Control surface of one capture device.
///
/// Frame and error callbacks may fire on the streaming thread; they must not
/// call back into the provider.
pub trait DeviceProvider: Send {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;

    /// Negotiate a pipeline for device `index`. Only valid while closed.
    fn open(&mut self, index: usize) -> Result<(), CaptureError>;

    fn set_profile(&mut self, profile: CaptureProfile) -> Result<(), CaptureError>;

    /// Buffer hint: `count` buffers of about `bytes_hint` bytes each.
    fn set_buffers(&mut self, count: u32, bytes_hint: usize) -> Result<(), CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop streaming. No-op unless streaming.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Release the device. Safe in any state.
    fn close(&mut self);

    fn set_callbacks(&mut self, frame: Option<FrameCallback>, error: Option<ErrorCallback>);

    fn start_recording(&mut self, path: &Path) -> Result<(), CaptureError>;

    /// Finalize the current recording; `None` if nothing was recording.
    fn stop_recording(&mut self) -> Result<Option<RecordingResult>, CaptureError>;

    /// Audio endpoint for subsequent recordings; `None` selects the default.
    fn set_recording_audio_device(&mut self, endpoint_id: Option<&str>);

    fn device_props(&self) -> Result<DeviceProps, CaptureError>;

    fn signal_status(&self) -> Result<SignalStatus, CaptureError>;

    fn set_processing(&mut self, options: ProcessingOptions) -> Result<(), CaptureError>;

    fn state(&self) -> ProviderState;

    fn negotiated_format(&self) -> Option<MediaFormat>;

    /// True when frames are converted on the CPU.
    fn is_cpu_path(&self) -> bool;
}

struct OpenDevice {
    descriptor: DeviceDescriptor,
    format: MediaFormat,
    path: NegotiationPath,
    gpu_adapter: Option<String>,
}

/// Provider shared by all backends; the backend decides the cascade and
/// which optional operations are available.
pub struct Provider {
    backend: Backend,
    config: CaptureConfig,
    state: ProviderState,
    profile: CaptureProfile,
    scratch_hint: usize,
    device: Option<OpenDevice>,
    slot: ContextSlot,
    notifier: Arc<Notifier>,
    shared: Arc<WorkerShared>,
    worker: Option<CaptureWorker>,
    audio_endpoint: Option<String>,
}

impl Provider {
    pub fn new(
        backend: Backend,
        config: CaptureConfig,
        audio: Arc<dyn AudioEndpointService>,
        muxers: Arc<dyn MuxerFactory>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new());
        let recorder = Arc::new(Mutex::new(Recorder::new(muxers, audio, config.clone())));
        let shared = Arc::new(WorkerShared::new(Arc::clone(&notifier), recorder, config.gpu.overlay));
        Self {
            backend,
            config,
            state: ProviderState::Closed,
            profile: CaptureProfile::default(),
            scratch_hint: 0,
            device: None,
            slot: Arc::new(Mutex::new(None)),
            notifier,
            shared,
            worker: None,
            audio_endpoint: None,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name
    }

    fn require_open(&self) -> Result<&OpenDevice, CaptureError> {
        match (&self.device, self.state.is_open()) {
            (Some(device), true) => Ok(device),
            _ => Err(CaptureError::InvalidState(format!("device is {:?}", self.state))),
        }
    }

    fn require_diagnostics(&self, operation: &str) -> Result<(), CaptureError> {
        if self.backend.diagnostics {
            Ok(())
        } else {
            Err(CaptureError::NotSupported(format!("{} on the {} backend", operation, self.backend.name)))
        }
    }

    /// Apply a custom profile to the opened reader, restoring the previous
    /// format if the device cannot honour it.
    fn apply_profile(&mut self, profile: &CaptureProfile) -> Result<MediaFormat, CaptureError> {
        let mut slot = self.slot.lock();
        let ctx = slot
            .as_mut()
            .ok_or_else(|| CaptureError::InvalidState("no negotiated device".into()))?;

        let usable = match ctx.path {
            NegotiationPath::Gpu => profile.format.is_planar_yuv(),
            _ => FrameConverter::supports(profile.format),
        };
        if !usable {
            return Err(CaptureError::InvalidArgument(format!(
                "{} cannot be delivered on the {} path",
                profile.format.name(),
                ctx.path.name()
            )));
        }

        match negotiation::apply_custom(ctx.reader.as_mut(), profile, profile.format) {
            Ok(format) => {
                ctx.format = format;
                ctx.converter.reserve(frame_bytes(&format).max(self.scratch_hint));
                Ok(format)
            }
            Err(e) => {
                if let Err(restore) = ctx.reader.set_format(&FormatRequest::exact(&ctx.format)) {
                    log::warn!("Failed to restore previous format: {}", restore);
                }
                Err(e)
            }
        }
    }
}

fn frame_bytes(format: &MediaFormat) -> usize {
    format.width as usize * format.height as usize * BYTES_PER_PIXEL
}

impl DeviceProvider for Provider {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        self.backend.system.enumerate()
    }

    fn open(&mut self, index: usize) -> Result<(), CaptureError> {
        if !self.state.is_closed() {
            return Err(CaptureError::InvalidState("device already open".into()));
        }

        let descriptor = self
            .backend
            .system
            .enumerate()?
            .into_iter()
            .find(|d| d.index == index)
            .ok_or_else(|| CaptureError::NoDevice(format!("no capture device at index {index}")))?;

        self.state = ProviderState::Negotiating;
        log::info!("Opening {} ({}) on the {} backend", descriptor.name, descriptor.symbolic_link, self.backend.name);

        let ctx = NegotiationContext {
            system: self.backend.system.as_ref(),
            index,
            gpu: self.backend.gpu.as_deref(),
            gpu_config: &self.config.gpu,
            profile: self.profile.is_custom().then_some(&self.profile),
        };
        let negotiated = match negotiation::negotiate(&self.backend.strategies, &ctx) {
            Ok(negotiated) => negotiated,
            Err(e) => {
                self.state = ProviderState::Closed;
                self.notifier.error(&e);
                return Err(e);
            }
        };

        let format = negotiated.format;
        let gpu_adapter = negotiated.pipeline.as_ref().map(|p| p.adapter_name());
        let mut converter = FrameConverter::new();
        converter.reserve(frame_bytes(&format).max(self.scratch_hint));

        *self.slot.lock() = Some(StreamContext {
            reader: negotiated.reader,
            format,
            path: negotiated.path,
            pipeline: negotiated.pipeline,
            converter,
            device_name: descriptor.name.clone(),
        });

        self.notifier.info(format!(
            "Opened {}: {} {}x{} @ {:.2} fps via {} path",
            descriptor.name,
            format.format.name(),
            format.width,
            format.height,
            format.fps(),
            negotiated.path.name()
        ));

        self.device = Some(OpenDevice {
            descriptor,
            format,
            path: negotiated.path,
            gpu_adapter,
        });
        self.state = ProviderState::Opened;
        Ok(())
    }

    fn set_profile(&mut self, profile: CaptureProfile) -> Result<(), CaptureError> {
        profile.validate().map_err(CaptureError::InvalidArgument)?;

        match self.state {
            ProviderState::Streaming | ProviderState::Negotiating => {
                Err(CaptureError::InvalidState("cannot change profile while streaming".into()))
            }
            ProviderState::Closed => {
                self.profile = profile;
                Ok(())
            }
            ProviderState::Opened => {
                if profile.is_custom() {
                    let format = self.apply_profile(&profile)?;
                    if let Some(device) = self.device.as_mut() {
                        device.format = format;
                    }
                    log::info!(
                        "Profile applied: {} {}x{} @ {}/{}",
                        format.format.name(),
                        format.width,
                        format.height,
                        format.fps_num,
                        format.fps_den
                    );
                }
                self.profile = profile;
                Ok(())
            }
        }
    }

    fn set_buffers(&mut self, count: u32, bytes_hint: usize) -> Result<(), CaptureError> {
        if count == 0 {
            return Err(CaptureError::InvalidArgument("buffer count must be positive".into()));
        }
        self.scratch_hint = bytes_hint;
        if let Some(ctx) = self.slot.lock().as_mut() {
            ctx.converter.reserve(bytes_hint);
        }
        log::debug!("Buffer hint: {} x {} bytes", count, bytes_hint);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        match self.state {
            ProviderState::Streaming => return Ok(()),
            ProviderState::Opened => {}
            other => return Err(CaptureError::InvalidState(format!("cannot start while {other:?}"))),
        }

        let worker = CaptureWorker::spawn(Arc::clone(&self.slot), Arc::clone(&self.shared), self.config.frame_timeout())?;
        self.worker = Some(worker);
        self.state = ProviderState::Streaming;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.state.is_streaming() {
            return Ok(());
        }

        if let Err(e) = self.shared.recorder.lock().close() {
            log::warn!("Closing recording on stop failed: {}", e);
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }

        if self.slot.lock().is_some() {
            self.state = ProviderState::Opened;
            Ok(())
        } else {
            // The streaming thread died without handing the reader back.
            self.device = None;
            self.state = ProviderState::Closed;
            Err(CaptureError::Io("capture thread lost the device".into()))
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("{}", e);
        }
        if let Some(mut ctx) = self.slot.lock().take() {
            ctx.reader.shutdown();
            log::info!("Closed {}", ctx.device_name);
        }
        self.device = None;
        self.state = ProviderState::Closed;
    }

    fn set_callbacks(&mut self, frame: Option<FrameCallback>, error: Option<ErrorCallback>) {
        *self.shared.frame_callback.lock() = frame;
        self.notifier.set_callback(error);
    }

    fn start_recording(&mut self, path: &Path) -> Result<(), CaptureError> {
        if !self.state.is_streaming() {
            return Err(CaptureError::InvalidState("recording requires an active stream".into()));
        }
        let format = self.require_open()?.format;
        if !format.format.is_planar_yuv() {
            return Err(CaptureError::NotSupported(format!("recording from {}", format.format.name())));
        }

        let target = RecordingTarget {
            width: format.width,
            height: format.height,
            fps_num: format.fps_num,
            fps_den: format.fps_den,
            ten_bit: format.format == PixelFormat::P010,
        };
        // Audio start can block for its init timeout; the capture thread needs the recorder lock per frame.
        let builder = {
            let mut recorder = self.shared.recorder.lock();
            if let Err(e) = recorder.close() {
                log::warn!("Closing previous recording failed: {}", e);
            }
            recorder.builder()
        };
        let prepared = builder
            .prepare(path, target, self.audio_endpoint.as_deref())
            .map_err(|e| match e {
                CaptureError::InvalidArgument(msg) => CaptureError::InvalidArgument(msg),
                other => {
                    let e = CaptureError::Io(format!("failed to start recording: {other}"));
                    self.notifier.error(&e);
                    e
                }
            })?;
        self.shared.recorder.lock().install(prepared);
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<Option<RecordingResult>, CaptureError> {
        self.shared.recorder.lock().close()
    }

    fn set_recording_audio_device(&mut self, endpoint_id: Option<&str>) {
        self.audio_endpoint = endpoint_id.filter(|id| !id.is_empty()).map(str::to_string);
    }

    fn device_props(&self) -> Result<DeviceProps, CaptureError> {
        self.require_diagnostics("device properties")?;
        let device = self.require_open()?;
        Ok(DeviceProps {
            name: device.descriptor.name.clone(),
            symbolic_link: device.descriptor.symbolic_link.clone(),
            width: device.format.width,
            height: device.format.height,
            fps_num: device.format.fps_num,
            fps_den: device.format.fps_den,
            format: device.format.format,
            path: device.path,
            gpu_adapter: device.gpu_adapter.clone(),
        })
    }

    fn signal_status(&self) -> Result<SignalStatus, CaptureError> {
        self.require_diagnostics("signal status")?;
        let device = self.require_open()?;
        let stats = self.shared.stats();
        Ok(SignalStatus {
            locked: self.state.is_streaming() && stats.alive && stats.frames > 0,
            width: device.format.width,
            height: device.format.height,
            measured_fps: stats.measured_fps,
        })
    }

    fn set_processing(&mut self, options: ProcessingOptions) -> Result<(), CaptureError> {
        self.require_diagnostics("processing options")?;
        self.shared.overlay.store(options.overlay, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    fn state(&self) -> ProviderState {
        self.state
    }

    fn negotiated_format(&self) -> Option<MediaFormat> {
        self.device.as_ref().map(|d| d.format)
    }

    fn is_cpu_path(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.path.is_cpu())
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::models::device::ProfileMode;
    use crate::models::diagnostics::Diagnostic;
    use crate::models::error::Status;
    use crate::models::frame::Frame;
    use crate::sim::audio::{SimAudioEndpoint, SimAudioService};
    use crate::sim::gpu::SimGpuFactory;
    use crate::sim::muxer::MemoryMuxerFactory;
    use crate::sim::video::{SimDevice, SimDeviceSystem};
    use crate::storage::metadata;
    use crate::traits::gpu::GpuFactory;

    #[derive(Debug, Clone, Copy)]
    struct Seen {
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: usize,
        stride: usize,
        frame_id: u64,
    }

    fn frame_log() -> (Arc<Mutex<Vec<Seen>>>, FrameCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: FrameCallback = Box::new(move |frame: &Frame<'_>| {
            sink.lock().push(Seen {
                width: frame.width,
                height: frame.height,
                format: frame.format,
                planes: frame.plane_count(),
                stride: frame.stride(0),
                frame_id: frame.frame_id,
            });
        });
        (seen, cb)
    }

    fn error_log() -> (Arc<Mutex<Vec<Diagnostic>>>, ErrorCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Box::new(move |d: &Diagnostic| sink.lock().push(d.clone())))
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn provider(system: SimDeviceSystem, gpu: Option<SimGpuFactory>) -> (Provider, Arc<MemoryMuxerFactory>) {
        let muxers = Arc::new(MemoryMuxerFactory::default());
        let backend = Backend::transform(Arc::new(system), gpu.map(|g| Arc::new(g) as Arc<dyn GpuFactory>));
        let provider = Provider::new(
            backend,
            CaptureConfig::default(),
            Arc::new(SimAudioService::new(Vec::new())),
            muxers.clone(),
        );
        (provider, muxers)
    }

    fn camera(format: PixelFormat, width: u32, height: u32, fps: u32) -> SimDeviceSystem {
        SimDeviceSystem::new(vec![SimDevice::new("Sim Camera").with_native(format, width, height, fps, 1)])
    }

    #[test]
    fn cpu_path_delivers_packed_rgb() {
        let (mut provider, _) = provider(camera(PixelFormat::Nv12, 1920, 1080, 60), None);
        let (frames, cb) = frame_log();
        provider.set_callbacks(Some(cb), None);

        provider.open(0).unwrap();
        assert!(provider.is_cpu_path());
        let format = provider.negotiated_format().unwrap();
        assert_eq!((format.width, format.height), (1920, 1080));

        provider.start().unwrap();
        assert!(wait_until(|| frames.lock().len() >= 3));
        provider.stop().unwrap();
        assert_eq!(provider.state(), ProviderState::Opened);

        let frames = frames.lock();
        for seen in frames.iter() {
            assert_eq!(seen.width, 1920);
            assert_eq!(seen.height, 1080);
            assert_eq!(seen.format, PixelFormat::Argb);
            assert_eq!(seen.planes, 1);
            assert_eq!(seen.stride, 7680);
        }
        assert!(frames.windows(2).all(|w| w[1].frame_id > w[0].frame_id));
    }

    #[test]
    fn gpu_path_renders_with_overlay() {
        let gpu = SimGpuFactory::new("Sim Adapter");
        let overlays = gpu.clone();
        let (mut provider, _) = provider(camera(PixelFormat::Nv12, 64, 32, 60), Some(gpu));
        let (frames, cb) = frame_log();
        provider.set_callbacks(Some(cb), None);

        provider.open(0).unwrap();
        assert!(!provider.is_cpu_path());
        assert_eq!(provider.device_props().unwrap().gpu_adapter.as_deref(), Some("Sim Adapter"));

        provider.start().unwrap();
        assert!(wait_until(|| frames.lock().len() >= 2));
        provider.stop().unwrap();

        assert_eq!(frames.lock()[0].stride, 64 * 4);
        let texts = overlays.overlay_texts();
        assert!(!texts.is_empty());
        assert!(texts[0].starts_with("Sim Camera | 64x32 @ "));
        assert!(texts[0].contains("NV12 8-bit"));
    }

    #[test]
    fn overlay_toggle_reaches_streaming_thread() {
        let gpu = SimGpuFactory::new("Sim Adapter");
        let overlays = gpu.clone();
        let (mut provider, _) = provider(camera(PixelFormat::Nv12, 16, 16, 60), Some(gpu));
        let (frames, cb) = frame_log();
        provider.set_callbacks(Some(cb), None);
        provider.open(0).unwrap();
        provider.set_processing(ProcessingOptions { overlay: false }).unwrap();
        provider.start().unwrap();
        assert!(wait_until(|| frames.lock().len() >= 2));
        provider.stop().unwrap();
        assert!(overlays.overlay_texts().is_empty());
    }

    #[test]
    fn lifecycle_errors() {
        let (mut provider, _) = provider(camera(PixelFormat::Nv12, 640, 480, 30), None);
        assert!(matches!(provider.start(), Err(CaptureError::InvalidState(_))));
        assert!(matches!(provider.open(3), Err(CaptureError::NoDevice(_))));
        assert_eq!(provider.state(), ProviderState::Closed);
        assert!(matches!(provider.device_props(), Err(CaptureError::InvalidState(_))));

        provider.open(0).unwrap();
        assert!(matches!(provider.open(0), Err(CaptureError::InvalidState(_))));
        provider.start().unwrap();
        provider.start().unwrap();
        provider.stop().unwrap();
        provider.stop().unwrap();
        provider.close();
        provider.close();
        assert_eq!(provider.state(), ProviderState::Closed);
        assert!(provider.negotiated_format().is_none());

        // Reopen after close negotiates again.
        provider.open(0).unwrap();
        assert_eq!(provider.state(), ProviderState::Opened);
    }

    #[test]
    fn failed_open_reports_and_stays_closed() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Broken")
            .with_native(PixelFormat::Nv12, 640, 480, 30, 1)
            .failing_activation()]);
        let (mut provider, _) = provider(system, None);
        let (errors, cb) = error_log();
        provider.set_callbacks(None, Some(cb));

        let err = provider.open(0).unwrap_err();
        assert_eq!(err.status(), Status::Io);
        assert_eq!(provider.state(), ProviderState::Closed);
        assert!(errors.lock().iter().any(|d| d.is_error() && d.status == Status::Io));
        provider.close();
    }

    #[test]
    fn read_failure_ends_loop_but_close_is_safe() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Flaky")
            .with_native(PixelFormat::Nv12, 32, 16, 60, 1)
            .failing_reads_after(3)]);
        let (mut provider, _) = provider(system, None);
        let (frames, frame_cb) = frame_log();
        let (errors, error_cb) = error_log();
        provider.set_callbacks(Some(frame_cb), Some(error_cb));

        provider.open(0).unwrap();
        provider.start().unwrap();
        assert!(wait_until(|| errors.lock().iter().any(|d| d.is_error())));
        assert_eq!(frames.lock().len(), 3);
        assert!(!provider.signal_status().unwrap().locked);

        provider.stop().unwrap();
        provider.close();
        assert_eq!(provider.state(), ProviderState::Closed);
    }

    #[test]
    fn open_info_diagnostic_is_queued_until_callback() {
        let (mut provider, _) = provider(camera(PixelFormat::Nv12, 64, 64, 30), None);
        provider.open(0).unwrap();
        let (seen, cb) = error_log();
        provider.set_callbacks(None, Some(cb));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].is_error());
        assert!(seen[0].message.contains("cpu path"));
    }

    #[test]
    fn profile_applies_while_opened_and_restores_on_failure() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Cam")
            .with_native(PixelFormat::Nv12, 1920, 1080, 60, 1)
            .with_native(PixelFormat::Nv12, 1280, 720, 30, 1)]);
        let (mut provider, _) = provider(system, None);
        provider.open(0).unwrap();

        let custom = CaptureProfile {
            width: 1280,
            height: 720,
            fps_num: 30,
            fps_den: 1,
            format: PixelFormat::Nv12,
            mode: ProfileMode::Custom,
        };
        provider.set_profile(custom).unwrap();
        assert_eq!(provider.negotiated_format().unwrap().width, 1280);

        let impossible = CaptureProfile { width: 3840, height: 2160, ..custom };
        assert!(matches!(provider.set_profile(impossible), Err(CaptureError::InvalidArgument(_))));
        assert_eq!(provider.negotiated_format().unwrap().width, 1280);

        let invalid = CaptureProfile { fps_den: 0, ..custom };
        assert!(matches!(provider.set_profile(invalid), Err(CaptureError::InvalidArgument(_))));

        provider.start().unwrap();
        assert!(matches!(provider.set_profile(custom), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn profile_set_while_closed_drives_negotiation() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Cam")
            .with_native(PixelFormat::Nv12, 1920, 1080, 60, 1)
            .with_native(PixelFormat::Nv12, 640, 480, 30, 1)]);
        let (mut provider, _) = provider(system, None);
        provider
            .set_profile(CaptureProfile {
                width: 640,
                height: 480,
                fps_num: 30,
                fps_den: 1,
                format: PixelFormat::Nv12,
                mode: ProfileMode::Custom,
            })
            .unwrap();
        provider.open(0).unwrap();
        assert_eq!(provider.negotiated_format().unwrap().width, 640);
    }

    #[test]
    fn buffers_hint_is_validated() {
        let (mut provider, _) = provider(camera(PixelFormat::Nv12, 64, 64, 30), None);
        assert!(matches!(provider.set_buffers(0, 1024), Err(CaptureError::InvalidArgument(_))));
        provider.set_buffers(4, 1 << 20).unwrap();
        provider.open(0).unwrap();
        provider.set_buffers(4, 2 << 20).unwrap();
    }

    #[test]
    fn recording_without_audio_endpoint_is_video_only() {
        let (mut provider, muxers) = provider(camera(PixelFormat::Nv12, 32, 16, 60), None);
        let (frames, cb) = frame_log();
        provider.set_callbacks(Some(cb), None);
        let path = std::env::temp_dir().join(format!("gcapture_provider_{}.mp4", std::process::id()));

        assert!(matches!(provider.start_recording(&path), Err(CaptureError::InvalidState(_))));

        provider.open(0).unwrap();
        provider.start().unwrap();
        provider.start_recording(&path).unwrap();
        assert!(wait_until(|| frames.lock().len() >= 4));

        let result = provider.stop_recording().unwrap().unwrap();
        assert!(!result.has_audio);
        assert!(result.stats.video_frames > 0);
        let output = muxers.last().unwrap();
        assert!(output.finalized);
        assert!(output.audio.is_none());

        provider.close();
        std::fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn failed_recording_start_keeps_streaming() {
        let backend = Backend::transform(Arc::new(camera(PixelFormat::Nv12, 32, 16, 60)), None);
        let mut provider = Provider::new(
            backend,
            CaptureConfig::default(),
            Arc::new(SimAudioService::new(Vec::new())),
            Arc::new(MemoryMuxerFactory::failing()),
        );
        let (frames, frame_cb) = frame_log();
        let (errors, error_cb) = error_log();
        provider.set_callbacks(Some(frame_cb), Some(error_cb));
        provider.open(0).unwrap();
        provider.start().unwrap();

        let path = std::env::temp_dir().join("gcapture_unwritable.mp4");
        let err = provider.start_recording(&path).unwrap_err();
        assert_eq!(err.status(), Status::Io);
        assert!(errors.lock().iter().any(|d| d.is_error() && d.status == Status::Io));

        let before = frames.lock().len();
        assert!(wait_until(|| frames.lock().len() > before + 1));
        assert_eq!(provider.state(), ProviderState::Streaming);
        assert!(provider.stop_recording().unwrap().is_none());
        provider.close();
    }

    #[test]
    fn gpu_path_records_packed_planes() {
        let (mut provider, muxers) = provider(camera(PixelFormat::Nv12, 32, 16, 60), Some(SimGpuFactory::new("Sim Adapter")));
        let (frames, cb) = frame_log();
        provider.set_callbacks(Some(cb), None);
        let path = std::env::temp_dir().join(format!("gcapture_gpu_rec_{}.mp4", std::process::id()));

        provider.open(0).unwrap();
        assert!(!provider.is_cpu_path());
        provider.start().unwrap();
        provider.start_recording(&path).unwrap();
        let before = frames.lock().len();
        assert!(wait_until(|| frames.lock().len() >= before + 4));
        let result = provider.stop_recording().unwrap().unwrap();
        provider.close();

        let output = muxers.last().unwrap();
        let video: Vec<_> = output.samples_for(output.video_stream).copied().collect();
        assert!(!video.is_empty());
        assert_eq!(video.len() as u64, result.stats.video_frames);
        assert!(video.iter().all(|s| s.len == 32 * 16 * 3 / 2));
        assert_eq!(video[0].ts, 0);
        assert!(video.windows(2).all(|w| w[1].ts > w[0].ts));
        std::fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn zero_stride_source_records_frames() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Sim Camera")
            .with_native(PixelFormat::Nv12, 32, 16, 60, 1)
            .reporting_zero_stride()]);
        let (mut provider, muxers) = provider(system, None);
        let (frames, frame_cb) = frame_log();
        let (errors, error_cb) = error_log();
        provider.set_callbacks(Some(frame_cb), Some(error_cb));
        let path = std::env::temp_dir().join(format!("gcapture_zero_stride_{}.mp4", std::process::id()));

        provider.open(0).unwrap();
        assert_eq!(provider.negotiated_format().unwrap().stride, 0);
        provider.start().unwrap();
        provider.start_recording(&path).unwrap();
        let before = frames.lock().len();
        assert!(wait_until(|| frames.lock().len() >= before + 4));
        let result = provider.stop_recording().unwrap().unwrap();
        provider.close();

        assert!(result.stats.video_frames > 0);
        assert!(frames.lock().iter().all(|seen| seen.stride == 32 * 4));
        let output = muxers.last().unwrap();
        assert!(output.samples_for(output.video_stream).all(|s| s.len == 32 * 16 * 3 / 2));
        assert!(!errors.lock().iter().any(|d| d.is_error()));
        std::fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn slow_audio_start_keeps_frames_flowing() {
        let backend = Backend::transform(Arc::new(camera(PixelFormat::Nv12, 32, 16, 60)), None);
        let mic = SimAudioEndpoint::stereo("mic-1", "Mic", true).with_init_delay(Duration::from_millis(300));
        let muxers = Arc::new(MemoryMuxerFactory::default());
        let mut provider = Provider::new(
            backend,
            CaptureConfig::default(),
            Arc::new(SimAudioService::new(vec![mic])),
            muxers.clone(),
        );
        let (frames, cb) = frame_log();
        provider.set_callbacks(Some(cb), None);
        let path = std::env::temp_dir().join(format!("gcapture_slow_audio_{}.mp4", std::process::id()));

        provider.open(0).unwrap();
        provider.start().unwrap();
        assert!(wait_until(|| frames.lock().len() >= 2));

        let before = frames.lock().len();
        let started = Instant::now();
        provider.start_recording(&path).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(frames.lock().len() >= before + 5, "frames stalled while audio started");

        let result = provider.stop_recording().unwrap().unwrap();
        assert!(result.has_audio);
        provider.close();
        std::fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn packed_formats_cannot_record() {
        let system = SimDeviceSystem::new(vec![SimDevice::new("Cam")
            .with_native(PixelFormat::Yuy2, 64, 32, 30, 1)
            .without_processing()]);
        let (mut provider, _) = provider(system, None);
        provider.open(0).unwrap();
        provider.start().unwrap();
        let path = std::env::temp_dir().join("gcapture_packed.mp4");
        assert!(matches!(provider.start_recording(&path), Err(CaptureError::NotSupported(_))));
    }

    #[test]
    fn direct_backend_lacks_diagnostics() {
        let backend = Backend::direct(Arc::new(camera(PixelFormat::Nv12, 64, 64, 30)));
        let mut provider = Provider::new(
            backend,
            CaptureConfig::default(),
            Arc::new(SimAudioService::new(Vec::new())),
            Arc::new(MemoryMuxerFactory::default()),
        );
        provider.open(0).unwrap();
        assert!(provider.is_cpu_path());
        assert!(matches!(provider.device_props(), Err(CaptureError::NotSupported(_))));
        assert!(matches!(provider.signal_status(), Err(CaptureError::NotSupported(_))));
        assert!(matches!(
            provider.set_processing(ProcessingOptions { overlay: true }),
            Err(CaptureError::NotSupported(_))
        ));
    }
}
