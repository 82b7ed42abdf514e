//! Capture endpoint enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list active capture endpoints with their
//! friendly names, default flag and shared-mode mix format.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::Media::Multimedia::KSDATAFORMAT_SUBTYPE_IEEE_FLOAT;
use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;

use gcapture_core::models::audio_models::{AudioEndpointInfo, EngineFormat};
use gcapture_core::models::error::CaptureError;

const WAVE_FORMAT_IEEE_FLOAT_TAG: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE_TAG: u16 = 0xFFFE;

/// Capture endpoint enumerator.
pub struct EndpointEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl EndpointEnumerator {
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> std::result::Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::Io(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// Endpoint `id`, or the default console capture endpoint.
    pub fn device(&self, id: Option<&str>) -> std::result::Result<IMMDevice, CaptureError> {
        unsafe {
            match id {
                Some(id) => {
                    let wide: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                    self.enumerator
                        .GetDevice(PCWSTR(wide.as_ptr()))
                        .map_err(|e| CaptureError::NoDevice(format!("audio endpoint {id}: {e}")))
                }
                None => self
                    .enumerator
                    .GetDefaultAudioEndpoint(eCapture, eConsole)
                    .map_err(|e| CaptureError::NoDevice(format!("no default capture endpoint: {e}"))),
            }
        }
    }

    pub fn list_capture_endpoints(&self) -> std::result::Result<Vec<AudioEndpointInfo>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::Io(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::Io(format!("GetCount failed: {}", e)))?;

            let default_id = self
                .enumerator
                .GetDefaultAudioEndpoint(eCapture, eConsole)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok());

            let mut endpoints = Vec::new();
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let id = match device.GetId() {
                    Ok(id) => id.to_string().unwrap_or_default(),
                    Err(_) => continue,
                };
                let Some(mix) = Self::mix_format(&device) else {
                    log::debug!("Skipping endpoint {id}: no mix format");
                    continue;
                };

                let name = Self::friendly_name(&device).unwrap_or_else(|| format!("Audio Input {}", i));
                let is_default = default_id.as_deref() == Some(id.as_str());
                endpoints.push(AudioEndpointInfo {
                    id,
                    name,
                    channels: mix.channels,
                    sample_rate: mix.sample_rate,
                    bits_per_sample: mix.bits,
                    is_float: mix.is_float,
                    is_default,
                });
            }

            Ok(endpoints)
        }
    }

    fn mix_format(device: &IMMDevice) -> Option<EngineFormat> {
        unsafe {
            let client: IAudioClient = device.Activate(CLSCTX_ALL, None).ok()?;
            let mix = client.GetMixFormat().ok()?;
            let format = engine_format_of(&*mix);
            CoTaskMemFree(Some(mix as *const _));
            Some(format)
        }
    }

    /// PKEY_Device_FriendlyName from the endpoint's property store.
    fn friendly_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ).ok()?;

            let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
            store.GetValue(&PKEY_Device_FriendlyName, &mut prop_variant).ok()?;

            let name = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
                let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
                if pwsz.is_null() {
                    None
                } else {
                    pwsz.to_string().ok()
                }
            } else {
                None
            };

            PropVariantClear(&mut prop_variant).ok();
            name
        }
    }
}

/// Engine format described by a `WAVEFORMATEX` (or its extensible form).
pub(crate) fn engine_format_of(wave: &WAVEFORMATEX) -> EngineFormat {
    let tag = wave.wFormatTag;
    let is_float = match tag {
        WAVE_FORMAT_IEEE_FLOAT_TAG => true,
        WAVE_FORMAT_EXTENSIBLE_TAG if wave.cbSize >= 22 => unsafe {
            let ext = wave as *const WAVEFORMATEX as *const WAVEFORMATEXTENSIBLE;
            let sub = std::ptr::addr_of!((*ext).SubFormat).read_unaligned();
            sub == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
        },
        _ => false,
    };
    EngineFormat {
        sample_rate: wave.nSamplesPerSec,
        channels: wave.nChannels,
        bits: wave.wBitsPerSample,
        is_float,
        block_align: wave.nBlockAlign,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(tag: u16, channels: u16, rate: u32, bits: u16) -> WAVEFORMATEX {
        let block = channels * bits / 8;
        WAVEFORMATEX {
            wFormatTag: tag,
            nChannels: channels,
            nSamplesPerSec: rate,
            nAvgBytesPerSec: rate * block as u32,
            nBlockAlign: block,
            wBitsPerSample: bits,
            cbSize: 0,
        }
    }

    #[test]
    fn pcm_is_integer() {
        let format = engine_format_of(&wave(1, 2, 44_100, 16));
        assert!(!format.is_float);
        assert_eq!(format.block_align, 4);
        assert_eq!(format.sample_rate, 44_100);
    }

    #[test]
    fn ieee_float_tag_is_float() {
        let format = engine_format_of(&wave(WAVE_FORMAT_IEEE_FLOAT_TAG, 2, 48_000, 32));
        assert!(format.is_float);
        assert_eq!(format.block_align, 8);
    }

    #[test]
    fn truncated_extensible_is_not_float() {
        let format = engine_format_of(&wave(WAVE_FORMAT_EXTENSIBLE_TAG, 2, 48_000, 32));
        assert!(!format.is_float);
    }
}
