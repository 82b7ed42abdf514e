//! # gcapture-core
//!
//! Platform-agnostic video capture core library.
//!
//! Negotiates a capture pipeline for a video device (GPU-resident, CPU or
//! minimal reader), converts YUV frames to packed RGB, and records live
//! video together with endpoint audio. Platform backends implement the
//! collaborator traits in [`traits`] and plug into [`CaptureManager`].
//!
//! ## Architecture
//!
//! ```text
//! gcapture-core (this crate)
//! ├── traits/       ← DeviceSystem, SourceReader, GpuFactory, AudioEndpointService, MuxerFactory
//! ├── models/       ← CaptureError, CaptureConfig, Frame, CaptureProfile, AudioChunk, etc.
//! ├── processing/   ← FrameConverter, PCM normalization, ChunkQueue, colour kernels
//! ├── capture/      ← negotiation cascade, GPU pipeline, streaming worker, DeviceProvider
//! ├── audio/        ← AudioCapture (endpoint capture thread)
//! ├── recording/    ← Recorder (A/V synchronizer), audio timeline
//! ├── storage/      ← GCAP chunk container, metadata sidecar
//! ├── manager       ← CaptureManager façade, Platform
//! └── sim/          ← simulated devices, GPU, audio endpoints, muxer
//! ```

pub mod audio;
pub mod capture;
pub mod manager;
pub mod models;
pub mod processing;
pub mod recording;
pub mod sim;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use audio::capture::AudioCapture;
pub use capture::provider::DeviceProvider;
pub use manager::{CaptureManager, Platform};
pub use models::audio_models::{AudioChunk, AudioEndpointInfo, AudioFormat};
pub use models::config::{AudioConfig, BackendKind, CaptureConfig, GpuConfig};
pub use models::device::{CaptureProfile, DeviceDescriptor, MediaFormat, ProfileMode};
pub use models::diagnostics::{Diagnostic, DeviceProps, ProcessingOptions, Severity, SignalStatus};
pub use models::error::{CaptureError, Status};
pub use models::frame::{Frame, PixelFormat, Plane};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::{NegotiationPath, ProviderState};
pub use processing::frame_converter::FrameConverter;
pub use recording::recorder::{PreparedSession, Recorder, RecordingTarget, SessionBuilder};
pub use storage::chunk_writer::ChunkFileMuxerFactory;
pub use traits::callbacks::{ErrorCallback, FrameCallback};
