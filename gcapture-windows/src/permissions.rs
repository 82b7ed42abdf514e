//! Microphone privacy checks.
//!
//! On Windows 10 1803+ capture access is governed by Settings > Privacy >
//! Microphone. Unpackaged desktop apps get no consent prompt; a disabled
//! toggle shows up as `E_ACCESSDENIED` when an endpoint is activated.

use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use gcapture_core::models::error::CaptureError;

use crate::wasapi_capture::ComGuard;

/// Map an `IMMDevice::Activate` failure to a capture error.
pub fn activation_error(e: &windows::core::Error) -> CaptureError {
    let code = e.code();
    if code == E_ACCESSDENIED {
        CaptureError::InvalidState("microphone access is disabled in privacy settings".into())
    } else if code == AUDCLNT_E_DEVICE_IN_USE {
        CaptureError::Io("audio endpoint is in exclusive use".into())
    } else if code == AUDCLNT_E_DEVICE_INVALIDATED {
        CaptureError::NoDevice("audio endpoint was removed".into())
    } else {
        CaptureError::Io(format!("IMMDevice::Activate failed: {}", e))
    }
}

/// Whether the default capture endpoint can be activated.
///
/// No capture endpoint at all counts as no access.
pub fn capture_access_allowed() -> bool {
    let Ok(_com) = ComGuard::init() else {
        return false;
    };
    unsafe {
        let enumerator: IMMDeviceEnumerator = match CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Failed to create enumerator for permission check: {}", e);
                return false;
            }
        };
        let Ok(device) = enumerator.GetDefaultAudioEndpoint(eCapture, eConsole) else {
            return false;
        };
        let activated: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);
        match activated {
            Ok(_) => true,
            Err(e) => match activation_error(&e) {
                CaptureError::InvalidState(_) => false,
                other => {
                    log::warn!("Unexpected error checking capture access: {}", other);
                    true
                }
            },
        }
    }
}
