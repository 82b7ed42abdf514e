//! YUV to packed RGB conversion on the CPU.
//!
//! Output pixels are 32-bit `B G R A` in memory with opaque alpha, using the
//! limited-range integer transform:
//!
//! ```text
//! C = Y - 16, D = U - 128, E = V - 128
//! R = (298C + 409E + 128) >> 8
//! G = (298C - 100D - 208E + 128) >> 8
//! B = (298C + 516D + 128) >> 8
//! ```
//!
//! Odd widths reuse the last chroma sample for the final column; odd heights
//! read chroma row `y / 2` of the rounded-up chroma plane.

use crate::models::device::MediaFormat;
use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;

pub const BYTES_PER_PIXEL: usize = 4;

#[inline]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Convert one YUV triple to `[B, G, R, A]`.
#[inline]
pub fn yuv_to_bgra(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp_u8(b), clamp_u8(g), clamp_u8(r), 255]
}

fn check_len(what: &str, have: usize, rows: u32, stride: usize, row_bytes: usize) -> Result<(), CaptureError> {
    if rows == 0 {
        return Ok(());
    }
    if stride < row_bytes {
        return Err(CaptureError::InvalidArgument(format!(
            "{what} stride {stride} shorter than row ({row_bytes} bytes)"
        )));
    }
    let need = (rows as usize - 1) * stride + row_bytes;
    if have < need {
        return Err(CaptureError::InvalidArgument(format!(
            "{what} buffer too small: {have} < {need}"
        )));
    }
    Ok(())
}

/// 4:2:0 planar with interleaved chroma (NV12) to packed 32-bit RGB.
#[allow(clippy::too_many_arguments)]
pub fn nv12_to_argb(
    y_plane: &[u8],
    uv_plane: &[u8],
    width: u32,
    height: u32,
    y_stride: usize,
    uv_stride: usize,
    out: &mut [u8],
    out_stride: usize,
) -> Result<(), CaptureError> {
    let w = width as usize;
    let chroma_w = w.div_ceil(2) * 2;
    check_len("luma", y_plane.len(), height, y_stride, w)?;
    check_len("chroma", uv_plane.len(), height.div_ceil(2), uv_stride, chroma_w)?;
    check_len("output", out.len(), height, out_stride, w * BYTES_PER_PIXEL)?;

    for row in 0..height as usize {
        let y_row = &y_plane[row * y_stride..row * y_stride + w];
        let uv_row = &uv_plane[(row / 2) * uv_stride..(row / 2) * uv_stride + chroma_w];
        let dst = &mut out[row * out_stride..row * out_stride + w * BYTES_PER_PIXEL];

        for (col, (luma, px)) in y_row.iter().zip(dst.chunks_exact_mut(BYTES_PER_PIXEL)).enumerate() {
            let pair = (col / 2) * 2;
            px.copy_from_slice(&yuv_to_bgra(*luma, uv_row[pair], uv_row[pair + 1]));
        }
    }
    Ok(())
}

/// 4:2:2 packed (YUY2, `Y0 U Y1 V`) to packed 32-bit RGB.
pub fn yuy2_to_argb(
    src: &[u8],
    width: u32,
    height: u32,
    src_stride: usize,
    out: &mut [u8],
    out_stride: usize,
) -> Result<(), CaptureError> {
    let w = width as usize;
    let src_row_bytes = w.div_ceil(2) * 4;
    check_len("source", src.len(), height, src_stride, src_row_bytes)?;
    check_len("output", out.len(), height, out_stride, w * BYTES_PER_PIXEL)?;

    for row in 0..height as usize {
        let src_row = &src[row * src_stride..row * src_stride + src_row_bytes];
        let dst = &mut out[row * out_stride..row * out_stride + w * BYTES_PER_PIXEL];

        for (group, quad) in src_row.chunks_exact(4).enumerate() {
            let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
            let x = group * 2;
            let off = x * BYTES_PER_PIXEL;
            dst[off..off + BYTES_PER_PIXEL].copy_from_slice(&yuv_to_bgra(y0, u, v));
            if x + 1 < w {
                dst[off + BYTES_PER_PIXEL..off + 2 * BYTES_PER_PIXEL].copy_from_slice(&yuv_to_bgra(y1, u, v));
            }
        }
    }
    Ok(())
}

/// 10-bit 4:2:0 (P010) to packed 32-bit RGB. Samples are reduced to 8 bits
/// before the planar transform.
#[allow(clippy::too_many_arguments)]
pub fn p010_to_argb(
    y_plane: &[u8],
    uv_plane: &[u8],
    width: u32,
    height: u32,
    y_stride: usize,
    uv_stride: usize,
    out: &mut [u8],
    out_stride: usize,
) -> Result<(), CaptureError> {
    let w = width as usize;
    let chroma_w = w.div_ceil(2) * 2;
    check_len("luma", y_plane.len(), height, y_stride, w * 2)?;
    check_len("chroma", uv_plane.len(), height.div_ceil(2), uv_stride, chroma_w * 2)?;
    check_len("output", out.len(), height, out_stride, w * BYTES_PER_PIXEL)?;

    let high_byte = |bytes: &[u8], index: usize| bytes[index * 2 + 1];

    for row in 0..height as usize {
        let y_row = &y_plane[row * y_stride..];
        let uv_row = &uv_plane[(row / 2) * uv_stride..];
        let dst = &mut out[row * out_stride..row * out_stride + w * BYTES_PER_PIXEL];

        for (col, px) in dst.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let pair = (col / 2) * 2;
            px.copy_from_slice(&yuv_to_bgra(
                high_byte(y_row, col),
                high_byte(uv_row, pair),
                high_byte(uv_row, pair + 1),
            ));
        }
    }
    Ok(())
}

/// Reusable CPU conversion stage owning its output buffer.
#[derive(Debug, Default)]
pub struct FrameConverter {
    scratch: Vec<u8>,
}

impl FrameConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the output buffer.
    pub fn reserve(&mut self, bytes: usize) {
        if bytes > self.scratch.capacity() {
            self.scratch.reserve(bytes - self.scratch.len());
        }
    }

    pub fn capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Whether [`FrameConverter::convert`] handles `format`.
    pub fn supports(format: PixelFormat) -> bool {
        matches!(
            format,
            PixelFormat::Nv12 | PixelFormat::P010 | PixelFormat::Yuy2 | PixelFormat::Argb
        )
    }

    /// Convert a contiguous frame laid out per `media` into tightly packed
    /// RGB (`width * 4` bytes per row). Returns the converted bytes.
    pub fn convert(&mut self, media: &MediaFormat, data: &[u8]) -> Result<&[u8], CaptureError> {
        let w = media.width as usize;
        let h = media.height as usize;
        let out_stride = w * BYTES_PER_PIXEL;
        self.scratch.resize(out_stride * h, 0);

        let stride = media.effective_stride() as usize;

        match media.format {
            PixelFormat::Nv12 | PixelFormat::P010 => {
                let split = (stride * h).min(data.len());
                let (y_plane, uv_plane) = data.split_at(split);
                if media.format == PixelFormat::Nv12 {
                    nv12_to_argb(y_plane, uv_plane, media.width, media.height, stride, stride, &mut self.scratch, out_stride)?;
                } else {
                    p010_to_argb(y_plane, uv_plane, media.width, media.height, stride, stride, &mut self.scratch, out_stride)?;
                }
            }
            PixelFormat::Yuy2 => {
                yuy2_to_argb(data, media.width, media.height, stride, &mut self.scratch, out_stride)?;
            }
            PixelFormat::Argb => {
                check_len("source", data.len(), media.height, stride, out_stride)?;
                for row in 0..h {
                    self.scratch[row * out_stride..(row + 1) * out_stride]
                        .copy_from_slice(&data[row * stride..row * stride + out_stride]);
                }
            }
            other => {
                return Err(CaptureError::NotSupported(format!(
                    "cpu conversion from {}",
                    other.name()
                )));
            }
        }
        Ok(&self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nv12_solid(w: u32, h: u32, y: u8, u: u8, v: u8) -> (Vec<u8>, Vec<u8>) {
        let cw = w.div_ceil(2) as usize;
        let ch = h.div_ceil(2) as usize;
        let y_plane = vec![y; (w * h) as usize];
        let uv_plane = [u, v].repeat(cw * ch);
        (y_plane, uv_plane)
    }

    fn pixel(out: &[u8], stride: usize, x: usize, y: usize) -> [u8; 4] {
        let off = y * stride + x * 4;
        [out[off], out[off + 1], out[off + 2], out[off + 3]]
    }

    #[test]
    fn reference_values() {
        assert_eq!(yuv_to_bgra(16, 128, 128), [0, 0, 0, 255]);
        assert_eq!(yuv_to_bgra(235, 128, 128), [255, 255, 255, 255]);
        assert_eq!(yuv_to_bgra(128, 128, 128), [130, 130, 130, 255]);
        // Saturated red.
        assert_eq!(yuv_to_bgra(81, 90, 240), [0, 0, 255, 255]);
    }

    #[test]
    fn outputs_are_clamped() {
        for y in [0u8, 16, 128, 235, 255] {
            for u in [0u8, 128, 255] {
                for v in [0u8, 128, 255] {
                    let px = yuv_to_bgra(y, u, v);
                    assert_eq!(px[3], 255);
                }
            }
        }
        assert_eq!(yuv_to_bgra(0, 128, 128), [0, 0, 0, 255]);
        assert_eq!(yuv_to_bgra(255, 128, 128), [255, 255, 255, 255]);
    }

    #[test]
    fn nv12_black_frame() {
        let (y, uv) = nv12_solid(4, 2, 16, 128, 128);
        let mut out = vec![7u8; 4 * 2 * 4];
        nv12_to_argb(&y, &uv, 4, 2, 4, 4, &mut out, 16).unwrap();
        for px in out.chunks_exact(4) {
            assert_eq!(px, [0, 0, 0, 255]);
        }
    }

    #[test]
    fn nv12_chroma_is_shared_by_pixel_pairs() {
        // Two chroma pairs: left red, right neutral.
        let y = vec![81, 81, 128, 128, 81, 81, 128, 128];
        let uv = vec![90, 240, 128, 128];
        let mut out = vec![0u8; 4 * 2 * 4];
        nv12_to_argb(&y, &uv, 4, 2, 4, 4, &mut out, 16).unwrap();

        assert_eq!(pixel(&out, 16, 0, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&out, 16, 1, 1), [0, 0, 255, 255]);
        assert_eq!(pixel(&out, 16, 2, 0), [130, 130, 130, 255]);
        assert_eq!(pixel(&out, 16, 3, 1), [130, 130, 130, 255]);
    }

    #[test]
    fn nv12_honours_strides() {
        // Luma stride 6 with padding bytes that must be ignored.
        let y = vec![235, 235, 0xAA, 0xAA, 0xAA, 0xAA, 16, 16];
        let uv = vec![128, 128];
        let mut out = vec![0u8; 2 * 12];
        nv12_to_argb(&y, &uv, 2, 2, 6, 2, &mut out, 12).unwrap();

        assert_eq!(pixel(&out, 12, 1, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&out, 12, 0, 1), [0, 0, 0, 255]);
        // Padding between output rows is left untouched.
        assert_eq!(&out[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn nv12_odd_dimensions() {
        let (y, uv) = nv12_solid(3, 3, 235, 128, 128);
        let mut out = vec![0u8; 3 * 3 * 4];
        nv12_to_argb(&y, &uv, 3, 3, 3, 4, &mut out, 12).unwrap();
        assert_eq!(pixel(&out, 12, 2, 2), [255, 255, 255, 255]);
    }

    #[test]
    fn nv12_rejects_short_buffers() {
        let (y, uv) = nv12_solid(4, 4, 16, 128, 128);
        let mut out = vec![0u8; 10];
        assert!(matches!(
            nv12_to_argb(&y, &uv, 4, 4, 4, 4, &mut out, 16),
            Err(CaptureError::InvalidArgument(_))
        ));
        let mut out = vec![0u8; 64];
        assert!(nv12_to_argb(&y[..8], &uv, 4, 4, 4, 4, &mut out, 16).is_err());
    }

    #[test]
    fn yuy2_pairs_share_chroma() {
        let src = vec![16, 128, 235, 128, 81, 90, 81, 240];
        let mut out = vec![0u8; 4 * 4];
        yuy2_to_argb(&src, 4, 1, 8, &mut out, 16).unwrap();

        assert_eq!(pixel(&out, 16, 0, 0), [0, 0, 0, 255]);
        assert_eq!(pixel(&out, 16, 1, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&out, 16, 2, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&out, 16, 3, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn yuy2_odd_width_writes_only_visible_pixels() {
        let src = vec![235, 128, 235, 128, 235, 128, 16, 128];
        let mut out = vec![9u8; 3 * 4 + 4];
        yuy2_to_argb(&src, 3, 1, 8, &mut out, 16).unwrap();
        assert_eq!(pixel(&out, 16, 2, 0), [255, 255, 255, 255]);
        assert_eq!(&out[12..16], &[9, 9, 9, 9]);
    }

    #[test]
    fn p010_uses_high_bits() {
        // 10-bit 940 (white) << 6 and 512 (neutral chroma) << 6.
        let white = (940u16 << 6).to_le_bytes();
        let neutral = (512u16 << 6).to_le_bytes();
        let y: Vec<u8> = white.repeat(4);
        let uv: Vec<u8> = [neutral, neutral].concat();
        let mut out = vec![0u8; 2 * 2 * 4];
        p010_to_argb(&y, &uv, 2, 2, 4, 4, &mut out, 8).unwrap();
        for px in out.chunks_exact(4) {
            assert_eq!(px, [255, 255, 255, 255]);
        }
    }

    #[test]
    fn converter_produces_tight_rgb() {
        let media = MediaFormat::new(PixelFormat::Nv12, 4, 2, 30, 1);
        let (y, uv) = nv12_solid(4, 2, 16, 128, 128);
        let data = [y, uv].concat();

        let mut converter = FrameConverter::new();
        converter.reserve(1024);
        assert!(converter.capacity() >= 1024);
        let out = converter.convert(&media, &data).unwrap();
        assert_eq!(out.len(), 4 * 4 * 2);
        assert!(out.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn converter_copies_padded_argb() {
        let mut media = MediaFormat::new(PixelFormat::Argb, 1, 2, 30, 1);
        media.stride = 8;
        let data = vec![1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];
        let mut converter = FrameConverter::new();
        let out = converter.convert(&media, &data).unwrap();
        assert_eq!(out, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn converter_rejects_compressed_input() {
        let media = MediaFormat::new(PixelFormat::Mjpg, 4, 4, 30, 1);
        let mut converter = FrameConverter::new();
        assert!(matches!(
            converter.convert(&media, &[0; 16]),
            Err(CaptureError::NotSupported(_))
        ));
        assert!(!FrameConverter::supports(PixelFormat::Mjpg));
    }
}
