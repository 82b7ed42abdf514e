use serde::{Deserialize, Serialize};

use super::frame::PixelFormat;

/// Capability bits reported in [`DeviceDescriptor::caps`].
pub mod caps {
    pub const HDMI: u32 = 1 << 0;
    pub const SDI: u32 = 1 << 1;
    pub const BIT10: u32 = 1 << 2;
    pub const GPU_TRANSFORM: u32 = 1 << 3;
}

/// One capture device from a single enumeration call.
///
/// Indices are only valid until the next enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub symbolic_link: String,
    pub caps: u32,
}

impl DeviceDescriptor {
    pub fn has_cap(&self, bit: u32) -> bool {
        self.caps & bit != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProfileMode {
    /// Accept whatever the device negotiates.
    #[default]
    DeviceDefault,
    /// Request this exact configuration; fail closed if rejected.
    Custom,
}

/// Capture configuration requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureProfile {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub format: PixelFormat,
    pub mode: ProfileMode,
}

impl CaptureProfile {
    pub fn validate(&self) -> Result<(), String> {
        if self.mode == ProfileMode::DeviceDefault {
            return Ok(());
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid resolution {}x{}", self.width, self.height));
        }
        if self.fps_num == 0 || self.fps_den == 0 {
            return Err(format!("invalid frame rate {}/{}", self.fps_num, self.fps_den));
        }
        Ok(())
    }

    pub fn is_custom(&self) -> bool {
        self.mode == ProfileMode::Custom
    }

    /// The exact format request this profile stands for.
    pub fn as_request(&self) -> MediaFormat {
        MediaFormat {
            format: self.format,
            width: self.width,
            height: self.height,
            fps_num: self.fps_num,
            fps_den: self.fps_den,
            stride: self.format.default_stride(self.width),
        }
    }
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps_num: 60,
            fps_den: 1,
            format: PixelFormat::Nv12,
            mode: ProfileMode::DeviceDefault,
        }
    }
}

/// A media type as offered or negotiated by a source reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaFormat {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// Bytes per row of the first plane.
    pub stride: u32,
}

impl MediaFormat {
    pub fn new(format: PixelFormat, width: u32, height: u32, fps_num: u32, fps_den: u32) -> Self {
        Self {
            format,
            width,
            height,
            fps_num,
            fps_den,
            stride: format.default_stride(width),
        }
    }

    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            self.fps_num as f64 / self.fps_den as f64
        }
    }

    /// First-plane stride, falling back to the packed stride when the
    /// source reports none.
    pub fn effective_stride(&self) -> u32 {
        if self.stride > 0 {
            self.stride
        } else {
            self.format.default_stride(self.width)
        }
    }

    /// Same resolution, rate and pixel format (stride is device-chosen).
    pub fn matches(&self, other: &MediaFormat) -> bool {
        self.format == other.format
            && self.width == other.width
            && self.height == other.height
            && self.fps_num as u64 * other.fps_den as u64 == other.fps_num as u64 * self.fps_den as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_default_profile_skips_validation() {
        let profile = CaptureProfile {
            width: 0,
            ..Default::default()
        };
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn custom_profile_requires_geometry() {
        let profile = CaptureProfile {
            width: 0,
            mode: ProfileMode::Custom,
            ..Default::default()
        };
        assert!(profile.validate().is_err());

        let profile = CaptureProfile {
            fps_den: 0,
            mode: ProfileMode::Custom,
            ..Default::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn rate_comparison_is_rational() {
        let a = MediaFormat::new(PixelFormat::Nv12, 1280, 720, 60, 1);
        let b = MediaFormat::new(PixelFormat::Nv12, 1280, 720, 120, 2);
        let c = MediaFormat::new(PixelFormat::Nv12, 1280, 720, 30, 1);
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!((a.fps() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_stride_falls_back_to_packed() {
        let mut format = MediaFormat::new(PixelFormat::Nv12, 4, 2, 30, 1);
        assert_eq!(format.effective_stride(), 4);
        format.stride = 0;
        assert_eq!(format.effective_stride(), 4);
        format.stride = 64;
        assert_eq!(format.effective_stride(), 64);
        assert_eq!(MediaFormat { stride: 0, ..MediaFormat::new(PixelFormat::P010, 6, 2, 30, 1) }.effective_stride(), 12);
    }

    #[test]
    fn caps_bits() {
        let d = DeviceDescriptor {
            index: 0,
            name: "Cam".into(),
            symbolic_link: "sim://0".into(),
            caps: caps::HDMI | caps::BIT10,
        };
        assert!(d.has_cap(caps::HDMI));
        assert!(d.has_cap(caps::BIT10));
        assert!(!d.has_cap(caps::SDI));
    }
}
