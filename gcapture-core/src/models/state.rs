use serde::{Deserialize, Serialize};

/// Provider lifecycle.
///
/// State transitions:
/// ```text
/// closed → negotiating → opened → streaming
///    ↑          │           ↑  ↓      │
///    └──────────┘ (failure) └─ stop ──┘
/// opened/streaming ── close ──→ closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderState {
    Closed,
    Negotiating,
    Opened,
    Streaming,
}

impl ProviderState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Opened | Self::Streaming)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

/// Which step of the negotiation cascade produced the active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationPath {
    /// GPU-bound reader delivering planar YUV textures.
    Gpu,
    /// GPU-bound reader that could only offer converted packed RGB.
    GpuDegraded,
    /// Software conversion reader.
    Cpu,
    /// Bare reader, format accepted as-is.
    Minimal,
}

impl NegotiationPath {
    /// Whether frames are converted on the CPU.
    pub fn is_cpu(&self) -> bool {
        !matches!(self, Self::Gpu)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::GpuDegraded => "gpu-degraded",
            Self::Cpu => "cpu",
            Self::Minimal => "minimal",
        }
    }
}
