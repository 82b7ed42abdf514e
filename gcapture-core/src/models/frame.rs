use serde::{Deserialize, Serialize};

/// Pixel formats exchanged with capture devices and frame consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit 4:2:0, Y plane followed by interleaved UV plane.
    Nv12,
    /// 8-bit 4:2:2 packed, `Y0 U Y1 V`.
    Yuy2,
    /// Packed 32-bit RGB, bytes `B G R A` in memory, alpha opaque.
    Argb,
    /// 10-bit 4:2:0 in 16-bit little-endian words, data in the high 10 bits.
    P010,
    /// Compressed motion JPEG.
    Mjpg,
    V210,
    R210,
}

impl PixelFormat {
    /// Preference used when scoring native formats (higher wins).
    pub fn preference(&self) -> Option<i64> {
        match self {
            Self::P010 => Some(3),
            Self::Nv12 => Some(2),
            Self::Yuy2 => Some(1),
            Self::Mjpg => Some(0),
            _ => None,
        }
    }

    pub fn is_planar_yuv(&self) -> bool {
        matches!(self, Self::Nv12 | Self::P010)
    }

    pub fn bit_depth(&self) -> u32 {
        match self {
            Self::P010 | Self::V210 | Self::R210 => 10,
            _ => 8,
        }
    }

    /// Bytes per row for a tightly packed first plane.
    pub fn default_stride(&self, width: u32) -> u32 {
        match self {
            Self::Nv12 => width,
            Self::P010 => width * 2,
            Self::Yuy2 => width * 2,
            Self::Argb | Self::R210 => width * 4,
            Self::V210 => width.div_ceil(48) * 128,
            Self::Mjpg => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nv12 => "NV12",
            Self::Yuy2 => "YUY2",
            Self::Argb => "ARGB32",
            Self::P010 => "P010",
            Self::Mjpg => "MJPG",
            Self::V210 => "V210",
            Self::R210 => "R210",
        }
    }
}

/// A single plane of image data.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

/// A borrowed video frame.
///
/// Plane memory is only valid for the duration of the frame callback;
/// consumers copy what they need to keep.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: &'a [Plane<'a>],
    pub pts_ns: u64,
    pub frame_id: u64,
}

impl Frame<'_> {
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Stride of plane `index`, or 0 if the plane does not exist.
    pub fn stride(&self, index: usize) -> usize {
        self.planes.get(index).map(|p| p.stride).unwrap_or(0)
    }
}
