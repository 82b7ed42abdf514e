use serde::{Deserialize, Serialize};

use super::error::{CaptureError, Status};
use super::frame::PixelFormat;
use super::state::NegotiationPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Error,
}

/// A message pushed through the error callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub status: Status,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn from_error(error: &CaptureError) -> Self {
        Self::error(error.status(), error.to_string())
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Properties of the opened device and its negotiated stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProps {
    pub name: String,
    pub symbolic_link: String,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub format: PixelFormat,
    pub path: NegotiationPath,
    pub gpu_adapter: Option<String>,
}

/// Input signal as observed from recently delivered frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalStatus {
    pub locked: bool,
    pub width: u32,
    pub height: u32,
    pub measured_fps: f64,
}

/// Runtime processing toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub overlay: bool,
}
