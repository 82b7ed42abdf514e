use std::sync::Arc;
use std::time::Duration;

use crate::models::audio_models::{AudioEndpointInfo, AudioFormat, EngineFormat};
use crate::models::error::CaptureError;

/// Wakes a thread blocked in [`AudioStream::wait_ready`].
pub type WakeHandle = Arc<dyn Fn() + Send + Sync>;

/// One packet of captured audio in the engine's format.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    pub data: Vec<u8>,
    pub frames: u32,
    /// Device-relative position of the first frame, in sample frames.
    pub device_position: u64,
    /// The engine flagged this packet as silence; `data` must be ignored.
    pub silent: bool,
}

/// Audio endpoint capture service.
pub trait AudioEndpointService: Send + Sync {
    fn list_endpoints(&self) -> Result<Vec<AudioEndpointInfo>, CaptureError>;

    /// Bind to endpoint `id`, or to the default capture endpoint when `None`.
    fn open_endpoint(&self, id: Option<&str>) -> Result<Box<dyn AudioStream>, CaptureError>;
}

/// An event-driven capture stream on one endpoint.
///
/// Streams are created and driven on the capture thread.
pub trait AudioStream: Send {
    /// Initialize at exactly `format`. Fails if the engine rejects it.
    fn initialize(&mut self, format: &AudioFormat) -> Result<EngineFormat, CaptureError>;

    /// Initialize at the endpoint's native mix format.
    fn initialize_mix_format(&mut self) -> Result<EngineFormat, CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Block until the engine signals data or `timeout` elapses. Returns true if signalled.
    fn wait_ready(&mut self, timeout: Duration) -> bool;

    /// Next available packet, or `None` when the engine buffer is drained.
    fn next_packet(&mut self) -> Result<Option<AudioPacket>, CaptureError>;

    /// Handle that interrupts a pending `wait_ready` from another thread.
    fn wake_handle(&self) -> Option<WakeHandle>;

    fn stop(&mut self);
}
