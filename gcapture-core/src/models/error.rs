use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flat status code reported across the public control surface.
///
/// Every `CaptureError` maps onto exactly one status via [`CaptureError::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    InvalidArgument,
    NoDevice,
    InvalidState,
    Io,
    NotSupported,
}

impl Status {
    /// Human-readable description of the status code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidArgument => "Invalid argument",
            Self::NoDevice => "No such device",
            Self::InvalidState => "Invalid state",
            Self::Io => "I/O error",
            Self::NotSupported => "Not supported",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during capture, negotiation and recording.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no such device: {0}")]
    NoDevice(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("i/o failure: {0}")]
    Io(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("timeout")]
    Timeout,
}

impl CaptureError {
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidArgument(_) => Status::InvalidArgument,
            Self::NoDevice(_) => Status::NoDevice,
            Self::InvalidState(_) => Status::InvalidState,
            Self::Io(_) | Self::Timeout => Status::Io,
            Self::NotSupported(_) => Status::NotSupported,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Collapse a result into the status code the control surface reports.
pub fn status_of<T>(result: &Result<T, CaptureError>) -> Status {
    match result {
        Ok(_) => Status::Ok,
        Err(e) => e.status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_a_status() {
        assert_eq!(CaptureError::InvalidArgument("x".into()).status(), Status::InvalidArgument);
        assert_eq!(CaptureError::NoDevice("x".into()).status(), Status::NoDevice);
        assert_eq!(CaptureError::InvalidState("x".into()).status(), Status::InvalidState);
        assert_eq!(CaptureError::Io("x".into()).status(), Status::Io);
        assert_eq!(CaptureError::Timeout.status(), Status::Io);
        assert_eq!(CaptureError::NotSupported("x".into()).status(), Status::NotSupported);
    }

    #[test]
    fn strerror_strings() {
        assert_eq!(Status::Ok.as_str(), "OK");
        assert_eq!(Status::NoDevice.to_string(), "No such device");
        assert_eq!(status_of::<()>(&Ok(())), Status::Ok);
        assert_eq!(status_of::<()>(&Err(CaptureError::Timeout)), Status::Io);
    }
}
