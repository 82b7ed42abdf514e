//! WASAPI endpoint capture.
//!
//! Implements the core `AudioEndpointService` on top of shared-mode,
//! event-driven WASAPI capture clients. Streams are created on the thread
//! that drives them; COM is initialized there and torn down when the
//! stream drops.

use std::sync::Arc;
use std::time::Duration;

use windows::core::*;
use windows::Win32::Foundation::{CloseHandle, HANDLE, RPC_E_CHANGED_MODE, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use gcapture_core::models::audio_models::{AudioEndpointInfo, AudioFormat, EngineFormat};
use gcapture_core::models::error::CaptureError;
use gcapture_core::traits::audio_endpoint::{AudioEndpointService, AudioPacket, AudioStream, WakeHandle};

use crate::device_enumerator::{engine_format_of, EndpointEnumerator};
use crate::permissions;

/// Engine buffer: 100 ms in 100 ns units.
const BUFFER_DURATION: i64 = 1_000_000;

const WAVE_FORMAT_PCM_TAG: u16 = 1;

/// Capture endpoints of the default audio device enumerator.
#[derive(Debug, Default)]
pub struct WasapiEndpointService;

impl WasapiEndpointService {
    pub fn new() -> Self {
        Self
    }
}

impl AudioEndpointService for WasapiEndpointService {
    fn list_endpoints(&self) -> std::result::Result<Vec<AudioEndpointInfo>, CaptureError> {
        let _com = ComGuard::init()?;
        let endpoints = EndpointEnumerator::new()?.list_capture_endpoints()?;
        if endpoints.is_empty() && !permissions::capture_access_allowed() {
            log::warn!("No capture endpoints visible; microphone access may be disabled in privacy settings");
        }
        Ok(endpoints)
    }

    fn open_endpoint(&self, id: Option<&str>) -> std::result::Result<Box<dyn AudioStream>, CaptureError> {
        let com = ComGuard::init()?;
        let device = EndpointEnumerator::new()?.device(id)?;
        let event = EventHandle::new()?;
        Ok(Box::new(WasapiStream {
            device,
            client: None,
            capture: None,
            engine: None,
            event: Arc::new(event),
            mmcss: None,
            _com: com,
        }))
    }
}

/// Auto-reset event signalled by the engine when a packet is ready.
struct EventHandle(HANDLE);

// SAFETY: event handles may be signalled and waited on from any thread.
unsafe impl Send for EventHandle {}
unsafe impl Sync for EventHandle {}

impl EventHandle {
    fn new() -> std::result::Result<Self, CaptureError> {
        unsafe {
            CreateEventW(None, false, false, PCWSTR::null())
                .map(Self)
                .map_err(|e| CaptureError::Io(format!("CreateEventW failed: {}", e)))
        }
    }

    fn signal(&self) {
        unsafe {
            if let Err(e) = SetEvent(self.0) {
                log::debug!("SetEvent failed: {}", e);
            }
        }
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// One shared-mode capture client on an endpoint.
pub struct WasapiStream {
    device: IMMDevice,
    client: Option<IAudioClient>,
    capture: Option<IAudioCaptureClient>,
    engine: Option<EngineFormat>,
    event: Arc<EventHandle>,
    mmcss: Option<HANDLE>,
    // Dropped last: COM stays initialized until the interfaces above are released.
    _com: ComGuard,
}

// SAFETY: the stream is created, driven and dropped on the capture thread.
// Only the event handle is shared, through `EventHandle`.
unsafe impl Send for WasapiStream {}

impl WasapiStream {
    fn init_client(&mut self, format: *const WAVEFORMATEX, engine: EngineFormat) -> std::result::Result<EngineFormat, CaptureError> {
        unsafe {
            // A client that failed Initialize cannot be reused.
            let client: IAudioClient = self
                .device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| permissions::activation_error(&e))?;
            client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    AUDCLNT_STREAMFLAGS_EVENTCALLBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                    BUFFER_DURATION,
                    0,
                    format,
                    None,
                )
                .map_err(|e| CaptureError::NotSupported(format!("IAudioClient::Initialize failed: {}", e)))?;
            client
                .SetEventHandle(self.event.0)
                .map_err(|e| CaptureError::Io(format!("SetEventHandle failed: {}", e)))?;
            let capture: IAudioCaptureClient = client
                .GetService()
                .map_err(|e| CaptureError::Io(format!("GetService failed: {}", e)))?;

            self.client = Some(client);
            self.capture = Some(capture);
            self.engine = Some(engine);
            Ok(engine)
        }
    }
}

impl AudioStream for WasapiStream {
    fn initialize(&mut self, format: &AudioFormat) -> std::result::Result<EngineFormat, CaptureError> {
        let block_align = format.block_align() as u16;
        let wave = WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_PCM_TAG,
            nChannels: format.channels,
            nSamplesPerSec: format.sample_rate,
            nAvgBytesPerSec: format.sample_rate * block_align as u32,
            nBlockAlign: block_align,
            wBitsPerSample: format.bits,
            cbSize: 0,
        };
        self.init_client(&wave, EngineFormat::from_request(format))
    }

    fn initialize_mix_format(&mut self) -> std::result::Result<EngineFormat, CaptureError> {
        unsafe {
            let mix_client: IAudioClient = self
                .device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| permissions::activation_error(&e))?;
            let mix = mix_client
                .GetMixFormat()
                .map_err(|e| CaptureError::Io(format!("GetMixFormat failed: {}", e)))?;
            let engine = engine_format_of(&*mix);
            drop(mix_client);
            let result = self.init_client(mix, engine);
            CoTaskMemFree(Some(mix as *const _));
            result
        }
    }

    fn start(&mut self) -> std::result::Result<(), CaptureError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidState("stream not initialized".into()))?;
        unsafe {
            let mut task_index: u32 = 0;
            match AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index) {
                Ok(handle) => self.mmcss = Some(handle),
                Err(e) => log::debug!("MMCSS registration failed: {}", e),
            }
            client
                .Start()
                .map_err(|e| CaptureError::Io(format!("IAudioClient::Start failed: {}", e)))
        }
    }

    fn wait_ready(&mut self, timeout: Duration) -> bool {
        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
        unsafe { WaitForSingleObject(self.event.0, millis) == WAIT_OBJECT_0 }
    }

    fn next_packet(&mut self) -> std::result::Result<Option<AudioPacket>, CaptureError> {
        let (Some(capture), Some(engine)) = (self.capture.as_ref(), self.engine) else {
            return Err(CaptureError::InvalidState("stream not initialized".into()));
        };
        unsafe {
            let pending = capture
                .GetNextPacketSize()
                .map_err(|e| CaptureError::Io(format!("GetNextPacketSize failed: {}", e)))?;
            if pending == 0 {
                return Ok(None);
            }

            let mut data: *mut u8 = std::ptr::null_mut();
            let mut frames: u32 = 0;
            let mut flags: u32 = 0;
            let mut position: u64 = 0;
            capture
                .GetBuffer(&mut data, &mut frames, &mut flags, Some(&mut position), None)
                .map_err(|e| CaptureError::Io(format!("GetBuffer failed: {}", e)))?;

            let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
            let bytes = frames as usize * engine.block_align as usize;
            let copied = if silent || data.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(data, bytes).to_vec()
            };

            capture
                .ReleaseBuffer(frames)
                .map_err(|e| CaptureError::Io(format!("ReleaseBuffer failed: {}", e)))?;

            Ok(Some(AudioPacket {
                data: copied,
                frames,
                device_position: position,
                silent: silent || data.is_null(),
            }))
        }
    }

    fn wake_handle(&self) -> Option<WakeHandle> {
        let event = Arc::clone(&self.event);
        Some(Arc::new(move || event.signal()))
    }

    fn stop(&mut self) {
        if let Some(client) = self.client.as_ref() {
            unsafe {
                if let Err(e) = client.Stop() {
                    log::debug!("IAudioClient::Stop failed: {}", e);
                }
            }
        }
        if let Some(handle) = self.mmcss.take() {
            unsafe {
                let _ = AvRevertMmThreadCharacteristics(handle);
            }
        }
    }
}

impl Drop for WasapiStream {
    fn drop(&mut self) {
        self.stop();
        self.capture = None;
        self.client = None;
    }
}

/// Keeps COM initialized (MTA) on the current thread for its lifetime.
pub(crate) struct ComGuard {
    owned: bool,
}

impl ComGuard {
    pub(crate) fn init() -> std::result::Result<Self, CaptureError> {
        unsafe {
            let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
            if hr == RPC_E_CHANGED_MODE {
                // COM already runs STA on this thread; use it as is.
                return Ok(Self { owned: false });
            }
            hr.ok()
                .map_err(|e| CaptureError::Io(format!("CoInitializeEx failed: {}", e)))?;
            Ok(Self { owned: true })
        }
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                CoUninitialize();
            }
        }
    }
}
