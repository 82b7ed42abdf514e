//! Simulated audio endpoints producing a paced sine tone.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::{AudioEndpointInfo, AudioFormat, EngineFormat};
use crate::models::error::CaptureError;
use crate::traits::audio_endpoint::{AudioEndpointService, AudioPacket, AudioStream, WakeHandle};

/// Device position reported for the first packet; capture re-bases it to zero.
const POSITION_ORIGIN: u64 = 96_000;

#[derive(Debug, Clone)]
pub struct SimAudioEndpoint {
    info: AudioEndpointInfo,
    mix: EngineFormat,
    accepts_exact: bool,
    init_delay: Duration,
    tone_hz: f32,
}

impl SimAudioEndpoint {
    /// 48 kHz stereo endpoint whose mix format is float32.
    pub fn stereo(id: &str, name: &str, is_default: bool) -> Self {
        Self {
            info: AudioEndpointInfo {
                id: id.to_string(),
                name: name.to_string(),
                channels: 2,
                sample_rate: 48000,
                bits_per_sample: 32,
                is_float: true,
                is_default,
            },
            mix: EngineFormat {
                sample_rate: 48000,
                channels: 2,
                bits: 32,
                is_float: true,
                block_align: 8,
            },
            accepts_exact: true,
            init_delay: Duration::ZERO,
            tone_hz: 440.0,
        }
    }

    /// Only the mix format initializes.
    pub fn rejecting_exact_format(mut self) -> Self {
        self.accepts_exact = false;
        self
    }

    /// Stream initialization blocks for `delay`.
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn info(&self) -> &AudioEndpointInfo {
        &self.info
    }
}

pub struct SimAudioService {
    endpoints: Vec<SimAudioEndpoint>,
    opened: Mutex<Vec<String>>,
}

impl SimAudioService {
    pub fn new(endpoints: Vec<SimAudioEndpoint>) -> Self {
        Self {
            endpoints,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Ids of the endpoints opened so far, in order.
    pub fn opened_ids(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    fn default_endpoint(&self) -> Option<&SimAudioEndpoint> {
        self.endpoints
            .iter()
            .find(|e| e.info.is_default)
            .or_else(|| self.endpoints.first())
    }
}

impl AudioEndpointService for SimAudioService {
    fn list_endpoints(&self) -> Result<Vec<AudioEndpointInfo>, CaptureError> {
        Ok(self.endpoints.iter().map(|e| e.info.clone()).collect())
    }

    fn open_endpoint(&self, id: Option<&str>) -> Result<Box<dyn AudioStream>, CaptureError> {
        let endpoint = match id {
            Some(id) => self
                .endpoints
                .iter()
                .find(|e| e.info.id == id)
                .ok_or_else(|| CaptureError::NoDevice(format!("audio endpoint {id}")))?,
            None => self
                .default_endpoint()
                .ok_or_else(|| CaptureError::NoDevice("no audio capture endpoint".into()))?,
        };
        self.opened.lock().push(endpoint.info.id.clone());
        Ok(Box::new(SimAudioStream::new(endpoint.clone())))
    }
}

struct Wake {
    flag: Mutex<bool>,
    cond: Condvar,
}

struct SimAudioStream {
    endpoint: SimAudioEndpoint,
    engine: Option<EngineFormat>,
    started: Option<Instant>,
    delivered: u64,
    wake: Arc<Wake>,
}

impl SimAudioStream {
    fn new(endpoint: SimAudioEndpoint) -> Self {
        Self {
            endpoint,
            engine: None,
            started: None,
            delivered: 0,
            wake: Arc::new(Wake {
                flag: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// 10 ms packets.
    fn packet_frames(engine: &EngineFormat) -> u64 {
        (engine.sample_rate / 100).max(1) as u64
    }

    /// Frames the simulated engine has produced but not yet handed out.
    fn backlog(&self, engine: &EngineFormat) -> u64 {
        let Some(started) = self.started else {
            return 0;
        };
        let produced = (started.elapsed().as_secs_f64() * engine.sample_rate as f64) as u64;
        produced.saturating_sub(self.delivered)
    }

    fn render(&self, engine: &EngineFormat, frames: u64) -> Vec<u8> {
        let channels = engine.channels as usize;
        let mut data = Vec::with_capacity(frames as usize * engine.block_align as usize);
        for i in 0..frames {
            let t = (self.delivered + i) as f32 / engine.sample_rate as f32;
            let sample = 0.25 * (TAU * self.endpoint.tone_hz * t).sin();
            for _ in 0..channels {
                match (engine.is_float, engine.bits) {
                    (true, _) => data.extend_from_slice(&sample.to_le_bytes()),
                    (false, 16) => data.extend_from_slice(&((sample * 32767.0) as i16).to_le_bytes()),
                    (false, 32) => data.extend_from_slice(&((sample * 2_147_483_647.0) as i32).to_le_bytes()),
                    (false, bits) => data.extend(std::iter::repeat_n(0u8, bits as usize / 8)),
                }
            }
        }
        data
    }
}

impl AudioStream for SimAudioStream {
    fn initialize(&mut self, format: &AudioFormat) -> Result<EngineFormat, CaptureError> {
        if !self.endpoint.init_delay.is_zero() {
            std::thread::sleep(self.endpoint.init_delay);
        }
        if !self.endpoint.accepts_exact {
            return Err(CaptureError::NotSupported(format!(
                "{} Hz {} ch {}-bit not accepted by {}",
                format.sample_rate, format.channels, format.bits, self.endpoint.info.name
            )));
        }
        let engine = EngineFormat::from_request(format);
        self.engine = Some(engine);
        Ok(engine)
    }

    fn initialize_mix_format(&mut self) -> Result<EngineFormat, CaptureError> {
        self.engine = Some(self.endpoint.mix);
        Ok(self.endpoint.mix)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.engine.is_none() {
            return Err(CaptureError::InvalidState("stream not initialized".into()));
        }
        self.started = Some(Instant::now());
        self.delivered = 0;
        Ok(())
    }

    fn wait_ready(&mut self, timeout: Duration) -> bool {
        let Some(engine) = self.engine else {
            return false;
        };
        let packet = Self::packet_frames(&engine);
        let backlog = self.backlog(&engine);
        if backlog >= packet {
            return true;
        }
        let missing = Duration::from_secs_f64((packet - backlog) as f64 / engine.sample_rate as f64);

        let mut woken = self.wake.flag.lock();
        if !*woken {
            self.wake.cond.wait_for(&mut woken, missing.min(timeout));
        }
        let signalled = std::mem::take(&mut *woken);
        drop(woken);
        signalled || self.backlog(&engine) >= packet
    }

    fn next_packet(&mut self) -> Result<Option<AudioPacket>, CaptureError> {
        let engine = self
            .engine
            .ok_or_else(|| CaptureError::InvalidState("stream not initialized".into()))?;
        if self.started.is_none() {
            return Err(CaptureError::InvalidState("stream not started".into()));
        }

        let frames = Self::packet_frames(&engine);
        if self.backlog(&engine) < frames {
            return Ok(None);
        }
        let data = self.render(&engine, frames);
        let packet = AudioPacket {
            data,
            frames: frames as u32,
            device_position: POSITION_ORIGIN + self.delivered,
            silent: false,
        };
        self.delivered += frames;
        Ok(Some(packet))
    }

    fn wake_handle(&self) -> Option<WakeHandle> {
        let wake = Arc::clone(&self.wake);
        Some(Arc::new(move || {
            *wake.flag.lock() = true;
            wake.cond.notify_all();
        }))
    }

    fn stop(&mut self) {
        self.started = None;
    }
}
