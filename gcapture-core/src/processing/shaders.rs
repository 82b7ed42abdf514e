//! GPU colour kernels and their scalar reference.
//!
//! The kernels use the BT.709 limited-range float form. [`shade`] mirrors the
//! kernel body so software backends and tests produce the same pixels a GPU
//! would.

use crate::models::frame::PixelFormat;
use crate::traits::gpu::{KernelSource, KernelStage};

const NV12_PIXEL_SRC: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) id: u32) -> VsOut {
    let xy = vec2<f32>(f32((id << 1u) & 2u), f32(id & 2u));
    var out: VsOut;
    out.pos = vec4<f32>(xy * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = xy;
    return out;
}

@group(0) @binding(0) var tex_y: texture_2d<f32>;
@group(0) @binding(1) var tex_uv: texture_2d<f32>;
@group(0) @binding(2) var samp: sampler;

fn yuv_to_rgb709(y: f32, u: f32, v: f32) -> vec3<f32> {
    let c = y * 255.0 - 16.0;
    let d = (u - 0.5) * 255.0;
    let e = (v - 0.5) * 255.0;
    let r = 1.164383 * c + 1.792741 * e;
    let g = 1.164383 * c - 0.213249 * d - 0.532909 * e;
    let b = 1.164383 * c + 2.112402 * d;
    return clamp(vec3<f32>(r, g, b) / 255.0, vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let y = textureSample(tex_y, samp, in.uv).r;
    let uv = textureSample(tex_uv, samp, in.uv).rg;
    return vec4<f32>(yuv_to_rgb709(y, uv.x, uv.y), 1.0);
}
"#;

const P010_PIXEL_SRC: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) id: u32) -> VsOut {
    let xy = vec2<f32>(f32((id << 1u) & 2u), f32(id & 2u));
    var out: VsOut;
    out.pos = vec4<f32>(xy * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = xy;
    return out;
}

@group(0) @binding(0) var tex_y16: texture_2d<u32>;
@group(0) @binding(1) var tex_uv16: texture_2d<u32>;

fn yuv_to_rgb709(y: f32, u: f32, v: f32) -> vec3<f32> {
    let c = y * 255.0 - 16.0;
    let d = (u - 0.5) * 255.0;
    let e = (v - 0.5) * 255.0;
    let r = 1.164383 * c + 1.792741 * e;
    let g = 1.164383 * c - 0.213249 * d - 0.532909 * e;
    let b = 1.164383 * c + 2.112402 * d;
    return clamp(vec3<f32>(r, g, b) / 255.0, vec3<f32>(0.0), vec3<f32>(1.0));
}

fn unpack10(sample: u32) -> f32 {
    return f32((sample >> 6u) & 1023u) / 1023.0;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let p = vec2<i32>(in.pos.xy);
    let yy = textureLoad(tex_y16, p, 0).r;
    let uvv = textureLoad(tex_uv16, p / 2, 0).rg;
    return vec4<f32>(yuv_to_rgb709(unpack10(yy), unpack10(uvv.x), unpack10(uvv.y)), 1.0);
}
"#;

const NV12_COMPUTE_SRC: &str = r#"
@group(0) @binding(0) var tex_y: texture_2d<f32>;
@group(0) @binding(1) var tex_uv: texture_2d<f32>;
@group(0) @binding(2) var out_rgba: texture_storage_2d<bgra8unorm, write>;

fn yuv_to_rgb709(y: f32, u: f32, v: f32) -> vec3<f32> {
    let c = y * 255.0 - 16.0;
    let d = (u - 0.5) * 255.0;
    let e = (v - 0.5) * 255.0;
    let r = 1.164383 * c + 1.792741 * e;
    let g = 1.164383 * c - 0.213249 * d - 0.532909 * e;
    let b = 1.164383 * c + 2.112402 * d;
    return clamp(vec3<f32>(r, g, b) / 255.0, vec3<f32>(0.0), vec3<f32>(1.0));
}

@compute @workgroup_size(16, 16, 1)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(out_rgba);
    if (gid.x >= dims.x || gid.y >= dims.y) {
        return;
    }
    let p = vec2<i32>(gid.xy);
    let y = textureLoad(tex_y, p, 0).r;
    let uv = textureLoad(tex_uv, p / 2, 0).rg;
    textureStore(out_rgba, p, vec4<f32>(yuv_to_rgb709(y, uv.x, uv.y), 1.0));
}
"#;

pub const NV12_PIXEL: KernelSource = KernelSource {
    name: "nv12_pixel",
    stage: KernelStage::Pixel,
    input: PixelFormat::Nv12,
    entry_point: "fs_main",
    source: NV12_PIXEL_SRC,
};

pub const P010_PIXEL: KernelSource = KernelSource {
    name: "p010_pixel",
    stage: KernelStage::Pixel,
    input: PixelFormat::P010,
    entry_point: "fs_main",
    source: P010_PIXEL_SRC,
};

pub const NV12_COMPUTE: KernelSource = KernelSource {
    name: "nv12_compute",
    stage: KernelStage::Compute,
    input: PixelFormat::Nv12,
    entry_point: "cs_main",
    source: NV12_COMPUTE_SRC,
};

/// Workgroup edge of [`NV12_COMPUTE`].
pub const COMPUTE_TILE: u32 = 16;

/// Kernels a GPU pipeline compiles, in preference order per input format.
pub const ALL_KERNELS: [KernelSource; 3] = [NV12_COMPUTE, NV12_PIXEL, P010_PIXEL];

/// Scalar form of the kernel body. Inputs are normalized to `[0, 1]`;
/// returns `[B, G, R, A]`.
pub fn shade(y: f32, u: f32, v: f32) -> [u8; 4] {
    let c = y * 255.0 - 16.0;
    let d = (u - 0.5) * 255.0;
    let e = (v - 0.5) * 255.0;
    let r = 1.164383 * c + 1.792741 * e;
    let g = 1.164383 * c - 0.213249 * d - 0.532909 * e;
    let b = 1.164383 * c + 2.112402 * d;
    let to_unorm = |x: f32| ((x / 255.0).clamp(0.0, 1.0) * 255.0).round() as u8;
    [to_unorm(b), to_unorm(g), to_unorm(r), 255]
}

/// [`shade`] for 8-bit samples.
pub fn shade8(y: u8, u: u8, v: u8) -> [u8; 4] {
    shade(y as f32 / 255.0, u as f32 / 255.0, v as f32 / 255.0)
}

/// [`shade`] for P010 words (data in the high 10 bits).
pub fn shade10(y: u16, u: u16, v: u16) -> [u8; 4] {
    let unpack = |s: u16| ((s >> 6) & 1023) as f32 / 1023.0;
    shade(unpack(y), unpack(u), unpack(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernels_declare_their_entry_points() {
        for kernel in ALL_KERNELS {
            assert!(kernel.source.contains(kernel.entry_point), "{}", kernel.name);
        }
        assert_eq!(NV12_COMPUTE.stage, KernelStage::Compute);
        assert_eq!(P010_PIXEL.input, PixelFormat::P010);
    }

    fn assert_rgb_near(px: [u8; 4], rgb: [u8; 3], tol: u8) {
        for (got, want) in px[..3].iter().zip(rgb) {
            assert!(got.abs_diff(want) <= tol, "{px:?} vs {rgb:?}");
        }
        assert_eq!(px[3], 255);
    }

    #[test]
    fn limited_range_extremes() {
        assert_rgb_near(shade8(16, 128, 128), [0, 0, 0], 1);
        assert_rgb_near(shade8(235, 128, 128), [255, 255, 255], 1);
        assert_rgb_near(shade8(0, 128, 128), [0, 0, 0], 0);
        assert_rgb_near(shade8(255, 128, 128), [255, 255, 255], 0);
    }

    #[test]
    fn ten_bit_matches_eight_bit_on_aligned_values() {
        // 10-bit black is 64, white 940, neutral chroma 512.
        assert_rgb_near(shade10(64 << 6, 512 << 6, 512 << 6), [0, 0, 0], 1);
        assert_rgb_near(shade10(940 << 6, 512 << 6, 512 << 6), [255, 255, 255], 2);
    }

    #[test]
    fn red_dominates_for_high_v() {
        let [b, g, r, a] = shade8(81, 90, 240);
        assert_eq!(a, 255);
        assert!(r > 240);
        assert!(g < 40);
        assert!(b < 10);
    }
}
