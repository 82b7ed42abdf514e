//! # gcapture-windows
//!
//! Windows WASAPI audio backend for gcapture.
//!
//! Provides:
//! - `WasapiEndpointService`: `AudioEndpointService` over shared-mode, event-driven WASAPI capture
//! - `EndpointEnumerator`: capture endpoint listing via the MMDevice API
//! - `permissions`: microphone privacy checks
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use gcapture_core::{AudioCapture, AudioConfig};
//! use gcapture_windows::WasapiEndpointService;
//!
//! let capture = AudioCapture::new(Arc::new(WasapiEndpointService::new()), AudioConfig::default());
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;

#[cfg(target_os = "windows")]
pub use device_enumerator::EndpointEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_capture::WasapiEndpointService;
