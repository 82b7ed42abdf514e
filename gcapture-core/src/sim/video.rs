//! Simulated capture devices and source readers.
//!
//! A [`SimDevice`] describes the native media types a device exposes and
//! how it behaves under each reader tier. Readers pace frames in real time
//! and deliver a test pattern, as textures when bound to a GPU and the
//! negotiated format is planar, otherwise as contiguous memory.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::negotiation::score;
use crate::models::audio_models::TICKS_PER_SECOND;
use crate::models::device::{caps, DeviceDescriptor, MediaFormat};
use crate::models::error::CaptureError;
use crate::models::frame::PixelFormat;
use crate::sim::gpu::SimGpuBinding;
use crate::traits::device_system::{
    CapturedSample, DeviceSystem, FormatRequest, ReaderOptions, SamplePayload, SourceReader, TextureResource,
};

#[derive(Debug, Clone)]
pub struct SimDevice {
    name: String,
    caps: u32,
    natives: Vec<MediaFormat>,
    gpu_capable: bool,
    processing: bool,
    failing_activation: bool,
    fail_after: Option<u64>,
    frame_interval: Option<Duration>,
    zero_stride: bool,
}

impl SimDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            caps: caps::HDMI,
            natives: Vec::new(),
            gpu_capable: true,
            processing: true,
            failing_activation: false,
            fail_after: None,
            frame_interval: None,
            zero_stride: false,
        }
    }

    pub fn with_native(mut self, format: PixelFormat, width: u32, height: u32, fps_num: u32, fps_den: u32) -> Self {
        self.natives.push(MediaFormat::new(format, width, height, fps_num, fps_den));
        self
    }

    pub fn with_caps(mut self, caps: u32) -> Self {
        self.caps = caps;
        self
    }

    /// Readers bound to a GPU cannot be created.
    pub fn cpu_only(mut self) -> Self {
        self.gpu_capable = false;
        self
    }

    /// Readers with format conversion enabled cannot be created.
    pub fn without_processing(mut self) -> Self {
        self.processing = false;
        self
    }

    pub fn failing_activation(mut self) -> Self {
        self.failing_activation = true;
        self
    }

    /// Reads fail after `frames` samples have been delivered.
    pub fn failing_reads_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Override the pacing derived from the negotiated frame rate.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// The negotiated format reports a stride of 0; frames stay tightly packed.
    pub fn reporting_zero_stride(mut self) -> Self {
        self.zero_stride = true;
        self
    }

    fn descriptor(&self, index: usize) -> DeviceDescriptor {
        let mut caps = self.caps;
        if self.gpu_capable {
            caps |= caps::GPU_TRANSFORM;
        }
        if self.natives.iter().any(|f| f.format.bit_depth() == 10) {
            caps |= caps::BIT10;
        }
        DeviceDescriptor {
            index,
            name: self.name.clone(),
            symbolic_link: format!("sim://{index}"),
            caps,
        }
    }
}

pub struct SimDeviceSystem {
    devices: Vec<SimDevice>,
    live: Arc<AtomicUsize>,
}

impl SimDeviceSystem {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        Self {
            devices,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Readers created and not yet dropped.
    pub fn live_readers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl DeviceSystem for SimDeviceSystem {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        Ok(self.devices.iter().enumerate().map(|(i, d)| d.descriptor(i)).collect())
    }

    fn activate(&self, index: usize, options: &ReaderOptions) -> Result<Box<dyn SourceReader>, CaptureError> {
        let device = self
            .devices
            .get(index)
            .ok_or_else(|| CaptureError::NoDevice(format!("sim://{index}")))?;
        if device.failing_activation {
            return Err(CaptureError::Io(format!("{} failed to activate", device.name)));
        }
        if let Some(binding) = &options.gpu {
            if !device.gpu_capable {
                return Err(CaptureError::NotSupported(format!("{} cannot bind a GPU", device.name)));
            }
            if binding.downcast_ref::<SimGpuBinding>().is_none() {
                return Err(CaptureError::InvalidArgument("foreign GPU binding".into()));
            }
        }
        if options.video_processing && !device.processing {
            return Err(CaptureError::NotSupported(format!("{} has no video processor", device.name)));
        }
        let current = *device
            .natives
            .first()
            .ok_or_else(|| CaptureError::NotSupported(format!("{} exposes no media types", device.name)))?;

        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimReader {
            device: device.clone(),
            options: options.clone(),
            current,
            delivered: 0,
            next_due: None,
            pattern: None,
            live: Arc::clone(&self.live),
            shut_down: false,
        }))
    }
}

struct SimReader {
    device: SimDevice,
    options: ReaderOptions,
    current: MediaFormat,
    delivered: u64,
    next_due: Option<Instant>,
    pattern: Option<(MediaFormat, Vec<u8>)>,
    live: Arc<AtomicUsize>,
    shut_down: bool,
}

impl SimReader {
    fn check_alive(&self) -> Result<(), CaptureError> {
        if self.shut_down {
            Err(CaptureError::InvalidState("reader was shut down".into()))
        } else {
            Ok(())
        }
    }

    fn interval(&self) -> Duration {
        self.device.frame_interval.unwrap_or_else(|| {
            let fps = self.current.fps();
            if fps > 0.0 {
                Duration::from_secs_f64(1.0 / fps)
            } else {
                Duration::from_millis(33)
            }
        })
    }

    fn frame_bytes(&mut self) -> &[u8] {
        let stale = self.pattern.as_ref().is_none_or(|(format, _)| *format != self.current);
        if stale {
            self.pattern = Some((self.current, render_pattern(&self.current)));
        }
        self.pattern.as_ref().map(|(_, bytes)| bytes.as_slice()).unwrap_or_default()
    }
}

impl SourceReader for SimReader {
    fn native_formats(&mut self) -> Result<Vec<MediaFormat>, CaptureError> {
        self.check_alive()?;
        Ok(self.device.natives.clone())
    }

    fn set_format(&mut self, request: &FormatRequest) -> Result<(), CaptureError> {
        self.check_alive()?;
        let candidates: Vec<MediaFormat> = self
            .device
            .natives
            .iter()
            .copied()
            .filter(|f| request.size.is_none_or(|(w, h)| f.width == w && f.height == h))
            .filter(|f| {
                request
                    .rate
                    .is_none_or(|(n, d)| f.fps_num as u64 * d as u64 == n as u64 * f.fps_den as u64)
            })
            .collect();
        if candidates.is_empty() {
            return Err(CaptureError::InvalidArgument("no media type matches the request".into()));
        }

        let native = candidates
            .iter()
            .copied()
            .filter(|f| f.format == request.format)
            .max_by_key(score);
        if let Some(native) = native {
            self.current = native;
            return Ok(());
        }

        let convertible = matches!(request.format, PixelFormat::Nv12 | PixelFormat::Argb);
        if !self.options.video_processing || !convertible {
            return Err(CaptureError::NotSupported(format!("{} not offered", request.format.name())));
        }
        let base = candidates.into_iter().max_by_key(score).unwrap_or(self.current);
        self.current = MediaFormat::new(request.format, base.width, base.height, base.fps_num, base.fps_den);
        Ok(())
    }

    fn current_format(&mut self) -> Result<MediaFormat, CaptureError> {
        self.check_alive()?;
        let mut current = self.current;
        if self.device.zero_stride {
            current.stride = 0;
        }
        Ok(current)
    }

    fn read_sample(&mut self, timeout: Duration) -> Result<Option<CapturedSample>, CaptureError> {
        self.check_alive()?;
        if self.device.fail_after.is_some_and(|n| self.delivered >= n) {
            return Err(CaptureError::Io(format!("{} stopped responding", self.device.name)));
        }

        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        if due > now {
            let wait = due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(wait);
        }
        self.next_due = Some(due + self.interval());

        let format = self.current;
        let timestamp = self.delivered as i64 * TICKS_PER_SECOND * format.fps_den.max(1) as i64 / format.fps_num.max(1) as i64;
        self.delivered += 1;

        let on_gpu = self.options.gpu.is_some() && format.format.is_planar_yuv();
        let bytes = self.frame_bytes().to_vec();
        let payload = if on_gpu {
            SamplePayload::Texture(Box::new(SimTexture::from_contiguous(&format, bytes)))
        } else {
            SamplePayload::Memory(bytes)
        };
        Ok(Some(CapturedSample { timestamp, payload }))
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
    }
}

impl Drop for SimReader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pattern sample at `(x, y)`: a luma ramp with chroma bars.
fn pattern_yuv(x: u32, y: u32, width: u32) -> (u8, u8, u8) {
    let luma = 16 + ((x + y) % 220) as u8;
    let bar = (x * 4 / width.max(1)) as u8;
    (luma, 64 + bar * 32, 192 - bar * 32)
}

fn render_pattern(format: &MediaFormat) -> Vec<u8> {
    let (w, h) = (format.width, format.height);
    let stride = format.effective_stride() as usize;
    let chroma_rows = h.div_ceil(2) as usize;
    match format.format {
        PixelFormat::Nv12 | PixelFormat::P010 => {
            let wide = format.format == PixelFormat::P010;
            let mut out = vec![0u8; stride * (h as usize + chroma_rows)];
            let (luma, chroma) = out.split_at_mut(stride * h as usize);
            for row in 0..h {
                for col in 0..w {
                    let (y, _, _) = pattern_yuv(col, row, w);
                    put_sample(luma, row as usize * stride, col as usize, y, wide);
                }
            }
            for row in 0..chroma_rows as u32 {
                for pair in 0..w.div_ceil(2) {
                    let (_, u, v) = pattern_yuv(pair * 2, row * 2, w);
                    put_sample(chroma, row as usize * stride, pair as usize * 2, u, wide);
                    put_sample(chroma, row as usize * stride, pair as usize * 2 + 1, v, wide);
                }
            }
            out
        }
        PixelFormat::Yuy2 => {
            let mut out = vec![0u8; stride * h as usize];
            for row in 0..h {
                for pair in 0..w.div_ceil(2) {
                    let (y0, u, v) = pattern_yuv(pair * 2, row, w);
                    let (y1, _, _) = pattern_yuv(pair * 2 + 1, row, w);
                    let at = row as usize * stride + pair as usize * 4;
                    out[at..at + 4].copy_from_slice(&[y0, u, y1, v]);
                }
            }
            out
        }
        PixelFormat::Argb => {
            let mut out = vec![0u8; stride * h as usize];
            for row in 0..h {
                for col in 0..w {
                    let (y, _, _) = pattern_yuv(col, row, w);
                    let at = row as usize * stride + col as usize * 4;
                    out[at..at + 4].copy_from_slice(&[y, y, y, 255]);
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

fn put_sample(plane: &mut [u8], row_start: usize, index: usize, value: u8, wide: bool) {
    if wide {
        let sample = ((value as u16) << 2) << 6;
        let at = row_start + index * 2;
        if let Some(slot) = plane.get_mut(at..at + 2) {
            slot.copy_from_slice(&sample.to_le_bytes());
        }
    } else if let Some(slot) = plane.get_mut(row_start + index) {
        *slot = value;
    }
}

/// GPU-resident planar frame produced by a GPU-bound [`SimReader`].
#[derive(Debug, Clone)]
pub struct SimTexture {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub uv: Vec<u8>,
    pub y_stride: usize,
    pub uv_stride: usize,
}

impl SimTexture {
    /// Split a contiguous planar frame into its planes.
    pub fn from_contiguous(format: &MediaFormat, mut bytes: Vec<u8>) -> Self {
        let stride = format.effective_stride() as usize;
        let split = (stride * format.height as usize).min(bytes.len());
        let uv = bytes.split_off(split);
        Self {
            format: format.format,
            width: format.width,
            height: format.height,
            y: bytes,
            uv,
            y_stride: stride,
            uv_stride: stride,
        }
    }

    /// Uniform NV12 frame.
    pub fn nv12_solid(width: u32, height: u32, y: u8, u: u8, v: u8) -> Self {
        let stride = width.div_ceil(2) as usize * 2;
        Self {
            format: PixelFormat::Nv12,
            width,
            height,
            y: vec![y; stride * height as usize],
            uv: [u, v].repeat(stride / 2 * height.div_ceil(2) as usize),
            y_stride: stride,
            uv_stride: stride,
        }
    }

    /// Uniform P010 frame from 10-bit sample values.
    pub fn p010_solid(width: u32, height: u32, y: u16, u: u16, v: u16) -> Self {
        let stride = width.div_ceil(2) as usize * 4;
        let pack = |s: u16| (s << 6).to_le_bytes();
        Self {
            format: PixelFormat::P010,
            width,
            height,
            y: pack(y).repeat(stride / 2 * height as usize),
            uv: [pack(u), pack(v)].concat().repeat(stride / 4 * height.div_ceil(2) as usize),
            y_stride: stride,
            uv_stride: stride,
        }
    }

    /// Sample `(y, u, v)` at pixel `(x, row)`, as raw 16-bit words for P010.
    pub fn sample(&self, x: u32, row: u32) -> (u16, u16, u16) {
        let (x, row) = (x as usize, row as usize);
        let pair = x / 2 * 2;
        let crow = row / 2;
        if self.format == PixelFormat::P010 {
            let word = |plane: &[u8], at: usize| u16::from_le_bytes([plane[at], plane[at + 1]]);
            (
                word(&self.y, row * self.y_stride + x * 2),
                word(&self.uv, crow * self.uv_stride + pair * 2),
                word(&self.uv, crow * self.uv_stride + pair * 2 + 2),
            )
        } else {
            (
                self.y[row * self.y_stride + x] as u16,
                self.uv[crow * self.uv_stride + pair] as u16,
                self.uv[crow * self.uv_stride + pair + 1] as u16,
            )
        }
    }
}

impl TextureResource for SimTexture {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
