//! Background audio capture into a bounded chunk queue.
//!
//! One thread per capture binds the endpoint, negotiates a format, then pulls
//! packets in an event-driven loop and pushes PCM16 chunks onto a
//! [`ChunkQueue`]. Chunk timestamps come from the device sample position,
//! rebased so the first packet starts at 0.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::{AudioChunk, AudioFormat, EngineFormat};
use crate::models::config::AudioConfig;
use crate::models::error::CaptureError;
use crate::processing::chunk_queue::ChunkQueue;
use crate::processing::pcm::PcmNormalizer;
use crate::traits::audio_endpoint::{AudioEndpointService, AudioPacket, AudioStream, WakeHandle};

/// Outcome of stream initialization reported by the capture thread.
enum InitState {
    Pending,
    Ready(Result<(EngineFormat, Option<WakeHandle>), CaptureError>),
}

struct InitSignal {
    state: Mutex<InitState>,
    cond: Condvar,
}

impl InitSignal {
    fn new() -> Self {
        Self {
            state: Mutex::new(InitState::Pending),
            cond: Condvar::new(),
        }
    }

    fn publish(&self, result: Result<(EngineFormat, Option<WakeHandle>), CaptureError>) {
        *self.state.lock() = InitState::Ready(result);
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<Result<(EngineFormat, Option<WakeHandle>), CaptureError>> {
        let mut state = self.state.lock();
        if matches!(*state, InitState::Pending) {
            self.cond
                .wait_while_for(&mut state, |s| matches!(s, InitState::Pending), timeout);
        }
        match std::mem::replace(&mut *state, InitState::Pending) {
            InitState::Ready(result) => Some(result),
            InitState::Pending => None,
        }
    }
}

/// Turns device-relative packet positions into non-decreasing chunk times.
#[derive(Debug, Default)]
pub(crate) struct ChunkClock {
    base: Option<u64>,
    last_position: u64,
    last_ts: i64,
    last_end: i64,
}

impl ChunkClock {
    /// Returns `(ts, duration)` in 100 ns ticks for a packet.
    pub(crate) fn stamp(&mut self, format: &AudioFormat, position: u64, frames: u32) -> (i64, i64) {
        let base = *self.base.get_or_insert(position);
        let duration = format.frames_to_ticks(frames as u64);

        let ts = if position < self.last_position || position < base {
            // Device position went backwards: continue from the previous chunk.
            self.last_end
        } else {
            // Still below an earlier high-water mark after a regression.
            format.frames_to_ticks(position - base).max(self.last_ts)
        };

        self.last_position = position;
        self.last_ts = ts;
        self.last_end = self.last_end.max(ts + duration);
        (ts, duration)
    }
}

/// Captures audio from one endpoint on a dedicated thread.
pub struct AudioCapture {
    service: Arc<dyn AudioEndpointService>,
    config: AudioConfig,
    queue: Arc<ChunkQueue>,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
    wake: Option<WakeHandle>,
    actual_format: Option<AudioFormat>,
    engine_format: Option<EngineFormat>,
}

impl AudioCapture {
    pub fn new(service: Arc<dyn AudioEndpointService>, config: AudioConfig) -> Self {
        let queue = Arc::new(ChunkQueue::new(config.queue_depth));
        Self {
            service,
            config,
            queue,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
            wake: None,
            actual_format: None,
            engine_format: None,
        }
    }

    /// Start capturing. `endpoint_id` of `None` (or empty) selects the
    /// default endpoint; an unknown id falls back to the default.
    ///
    /// Blocks until the capture thread reports its format or the init
    /// timeout elapses. Returns the PCM16 format chunks are delivered in.
    pub fn start(&mut self, format: AudioFormat, endpoint_id: Option<&str>) -> Result<AudioFormat, CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::InvalidState("audio capture already running".into()));
        }
        if format.sample_rate == 0 || format.channels == 0 || format.bits == 0 {
            return Err(CaptureError::InvalidArgument(format!("invalid audio format {format:?}")));
        }

        self.queue.clear();
        // Each run owns its flag; a thread orphaned by an init timeout keeps the old one.
        self.running = Arc::new(AtomicBool::new(true));

        let running = Arc::clone(&self.running);
        let queue = Arc::clone(&self.queue);
        let service = Arc::clone(&self.service);
        let signal = Arc::new(InitSignal::new());
        let thread_signal = Arc::clone(&signal);
        let endpoint_id = endpoint_id.filter(|id| !id.is_empty()).map(str::to_string);
        let poll = self.config.poll_interval();

        let handle = thread::Builder::new()
            .name("gcapture-audio".into())
            .spawn(move || {
                let stream = match open_stream(service.as_ref(), endpoint_id.as_deref(), &format) {
                    Ok((stream, engine)) => {
                        thread_signal.publish(Ok((engine, stream.wake_handle())));
                        Some((stream, engine))
                    }
                    Err(e) => {
                        log::error!("Audio capture init failed: {}", e);
                        thread_signal.publish(Err(e));
                        None
                    }
                };

                if let Some((mut stream, engine)) = stream {
                    if let Err(e) = capture_loop(stream.as_mut(), &engine, &running, &queue, poll) {
                        log::error!("Audio capture error: {}", e);
                    }
                    stream.stop();
                }
                running.store(false, Ordering::SeqCst);
                queue.notify();
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::Io(format!("failed to spawn audio thread: {}", e))
            })?;

        match signal.wait(self.config.init_timeout()) {
            Some(Ok((engine, wake))) => {
                let actual = engine.output_format();
                log::info!(
                    "Audio capture started: {} Hz, {} ch, engine {}-bit{}",
                    engine.sample_rate,
                    engine.channels,
                    engine.bits,
                    if engine.is_float { " float" } else { "" }
                );
                self.capture_handle = Some(handle);
                self.wake = wake;
                self.engine_format = Some(engine);
                self.actual_format = Some(actual);
                Ok(actual)
            }
            Some(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                if handle.join().is_err() {
                    log::error!("Audio capture thread panicked");
                }
                Err(e)
            }
            None => {
                // The thread exits on its own once initialization returns.
                log::warn!("Audio capture init timed out after {:?}", self.config.init_timeout());
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::Timeout)
            }
        }
    }

    /// Stop the capture thread and discard queued chunks. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(wake) = self.wake.take() {
            wake();
        }
        self.queue.notify();
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("Audio capture thread panicked");
            }
            log::info!("Audio capture stopped");
        }
        self.queue.clear();
        self.actual_format = None;
        self.engine_format = None;
    }

    /// Oldest queued chunk, without blocking.
    pub fn pop(&self) -> Option<AudioChunk> {
        self.queue.pop()
    }

    /// Block until a chunk is queued or `timeout` elapses. Does not consume.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        self.queue.wait_for_data(timeout)
    }

    /// Shared handle to the chunk queue for a consumer thread.
    pub fn queue(&self) -> Arc<ChunkQueue> {
        Arc::clone(&self.queue)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// PCM16 format of delivered chunks while running.
    pub fn actual_format(&self) -> Option<AudioFormat> {
        self.actual_format
    }

    pub fn engine_format(&self) -> Option<EngineFormat> {
        self.engine_format
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind the endpoint and initialize it, trying the exact format first and
/// then the endpoint's mix format.
fn open_stream(
    service: &dyn AudioEndpointService,
    endpoint_id: Option<&str>,
    format: &AudioFormat,
) -> Result<(Box<dyn AudioStream>, EngineFormat), CaptureError> {
    let mut stream = match endpoint_id {
        Some(id) => match service.open_endpoint(Some(id)) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Audio endpoint '{}' unavailable ({}), using default", id, e);
                service.open_endpoint(None)?
            }
        },
        None => service.open_endpoint(None)?,
    };

    let engine = match stream.initialize(format) {
        Ok(engine) => engine,
        Err(e) => {
            log::info!("Requested audio format rejected ({}), falling back to mix format", e);
            stream.initialize_mix_format()?
        }
    };
    stream.start()?;
    Ok((stream, engine))
}

fn capture_loop(
    stream: &mut dyn AudioStream,
    engine: &EngineFormat,
    running: &AtomicBool,
    queue: &ChunkQueue,
    poll: Duration,
) -> Result<(), CaptureError> {
    let normalizer = PcmNormalizer::new(*engine);
    let output = engine.output_format();
    let mut clock = ChunkClock::default();

    while running.load(Ordering::SeqCst) {
        stream.wait_ready(poll);
        if !running.load(Ordering::SeqCst) {
            break;
        }

        while let Some(packet) = stream.next_packet()? {
            if packet.frames == 0 {
                continue;
            }
            queue.push(to_chunk(&normalizer, &output, &mut clock, packet));
        }
    }
    Ok(())
}

fn to_chunk(normalizer: &PcmNormalizer, output: &AudioFormat, clock: &mut ChunkClock, packet: AudioPacket) -> AudioChunk {
    let pcm = if packet.silent {
        normalizer.silence(packet.frames)
    } else {
        normalizer.normalize(&packet.data, packet.frames)
    };
    let (ts, duration) = clock.stamp(output, packet.device_position, packet.frames);
    AudioChunk { ts, duration, pcm }
}
