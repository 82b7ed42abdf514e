//! Streaming thread: pulls samples from the negotiated reader, converts them
//! to packed RGB and hands them to the frame callback. Planar frames are also
//! forwarded to the recorder while one is open.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::capture::gpu_pipeline::{overlay_text, GpuPipeline};
use crate::capture::notifier::Notifier;
use crate::models::device::MediaFormat;
use crate::models::error::CaptureError;
use crate::models::frame::{Frame, PixelFormat, Plane};
use crate::models::state::NegotiationPath;
use crate::processing::frame_converter::{FrameConverter, BYTES_PER_PIXEL};
use crate::recording::recorder::Recorder;
use crate::traits::callbacks::FrameCallback;
use crate::traits::device_system::{SamplePayload, SourceReader, TextureResource};

/// Everything the streaming thread owns while it runs.
pub struct StreamContext {
    pub reader: Box<dyn SourceReader>,
    pub format: MediaFormat,
    pub path: NegotiationPath,
    pub pipeline: Option<GpuPipeline>,
    pub converter: FrameConverter,
    pub device_name: String,
}

/// Context parked between streaming sessions. The thread takes it on start
/// and puts it back on exit.
pub type ContextSlot = Arc<Mutex<Option<StreamContext>>>;

/// Exponentially smoothed frame rate.
#[derive(Debug, Default)]
pub struct FpsMeter {
    last: Option<Instant>,
    fps: f64,
}

impl FpsMeter {
    pub fn tick(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let instant = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    instant
                } else {
                    0.9 * self.fps + 0.1 * instant
                };
            }
        }
        self.last = Some(now);
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStats {
    pub frames: u64,
    pub measured_fps: f64,
    /// The loop is running and has not hit a read failure.
    pub alive: bool,
}

/// State shared between the provider and its streaming thread.
pub struct WorkerShared {
    pub frame_callback: Mutex<Option<FrameCallback>>,
    pub notifier: Arc<Notifier>,
    pub recorder: Arc<Mutex<Recorder>>,
    pub overlay: AtomicBool,
    stats: Mutex<StreamStats>,
    next_frame_id: AtomicU64,
}

impl WorkerShared {
    pub fn new(notifier: Arc<Notifier>, recorder: Arc<Mutex<Recorder>>, overlay: bool) -> Self {
        Self {
            frame_callback: Mutex::new(None),
            notifier,
            recorder,
            overlay: AtomicBool::new(overlay),
            stats: Mutex::new(StreamStats::default()),
            next_frame_id: AtomicU64::new(1),
        }
    }

    pub fn stats(&self) -> StreamStats {
        *self.stats.lock()
    }

    fn next_frame_id(&self) -> u64 {
        self.next_frame_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handle to a running streaming thread.
pub struct CaptureWorker {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureWorker {
    pub fn spawn(slot: ContextSlot, shared: Arc<WorkerShared>, frame_timeout: Duration) -> Result<Self, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        *shared.stats.lock() = StreamStats {
            alive: true,
            ..Default::default()
        };

        let thread_running = Arc::clone(&running);
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("gcapture-video".into())
            .spawn(move || {
                let Some(mut ctx) = slot.lock().take() else {
                    log::error!("Streaming thread started without a negotiated device");
                    thread_shared.stats.lock().alive = false;
                    return;
                };
                run_loop(&mut ctx, &thread_shared, &thread_running, frame_timeout);
                thread_shared.stats.lock().alive = false;
                *slot.lock() = Some(ctx);
            })
            .map_err(|e| {
                shared.stats.lock().alive = false;
                CaptureError::Io(format!("failed to spawn capture thread: {e}"))
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the loop and join it. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(ctx: &mut StreamContext, shared: &WorkerShared, running: &AtomicBool, timeout: Duration) {
    log::info!(
        "Streaming {} {}x{} via {} path",
        ctx.format.format.name(),
        ctx.format.width,
        ctx.format.height,
        ctx.path.name()
    );

    let mut meter = FpsMeter::default();
    let mut recording_failed = false;

    while running.load(Ordering::SeqCst) {
        let sample = match ctx.reader.read_sample(timeout) {
            Ok(Some(sample)) => sample,
            Ok(None) => continue,
            Err(e) => {
                shared.stats.lock().alive = false;
                shared
                    .notifier
                    .error(&CaptureError::Io(format!("frame read failed: {e}")));
                break;
            }
        };

        let fps = meter.tick(Instant::now());
        {
            let mut stats = shared.stats.lock();
            stats.frames += 1;
            stats.measured_fps = fps;
        }

        let frame_id = shared.next_frame_id();
        let pts_ns = sample.timestamp.max(0) as u64 * 100;

        let result = match &sample.payload {
            SamplePayload::Memory(data) => {
                record_memory(ctx, shared, data, sample.timestamp, &mut recording_failed);
                ctx.converter.convert(&ctx.format, data).map(|rgb| {
                    deliver(shared, ctx.format.width, ctx.format.height, rgb, pts_ns, frame_id);
                })
            }
            SamplePayload::Texture(texture) => render_texture(
                ctx,
                shared,
                texture.as_ref(),
                sample.timestamp,
                pts_ns,
                frame_id,
                fps,
                &mut recording_failed,
            ),
        };

        if let Err(e) = result {
            shared.notifier.error(&e);
        }
    }

    log::info!("Streaming loop exited after {} frames", shared.stats().frames);
}

fn deliver(shared: &WorkerShared, width: u32, height: u32, rgb: &[u8], pts_ns: u64, frame_id: u64) {
    let planes = [Plane {
        data: rgb,
        stride: width as usize * BYTES_PER_PIXEL,
    }];
    let frame = Frame {
        width,
        height,
        format: PixelFormat::Argb,
        planes: &planes,
        pts_ns,
        frame_id,
    };
    if let Some(callback) = shared.frame_callback.lock().as_mut() {
        callback(&frame);
    }
}

fn report_recording(shared: &WorkerShared, result: Result<(), CaptureError>, failed: &mut bool) {
    match result {
        Ok(()) => *failed = false,
        Err(e) => {
            if !*failed {
                shared.notifier.error(&e);
            }
            *failed = true;
        }
    }
}

fn record_memory(ctx: &StreamContext, shared: &WorkerShared, data: &[u8], ts: i64, failed: &mut bool) {
    if !ctx.format.format.is_planar_yuv() {
        return;
    }
    let mut recorder = shared.recorder.lock();
    if !recorder.is_open() {
        return;
    }
    let stride = ctx.format.effective_stride() as usize;
    let split = (stride * ctx.format.height as usize).min(data.len());
    let (y, uv) = data.split_at(split);
    let result = recorder.write_frame(y, stride, uv, stride, ts);
    report_recording(shared, result, failed);
}

#[allow(clippy::too_many_arguments)]
fn render_texture(
    ctx: &mut StreamContext,
    shared: &WorkerShared,
    texture: &dyn TextureResource,
    ts: i64,
    pts_ns: u64,
    frame_id: u64,
    fps: f64,
    failed: &mut bool,
) -> Result<(), CaptureError> {
    let Some(pipeline) = ctx.pipeline.as_mut() else {
        return Err(CaptureError::InvalidState("texture sample without a GPU pipeline".into()));
    };

    {
        let mut recorder = shared.recorder.lock();
        if recorder.is_open() {
            let mut written = Ok(());
            let read = pipeline.read_planes(texture, &mut |y: &[u8], y_stride: usize, uv: &[u8], uv_stride: usize| {
                written = recorder.write_frame(y, y_stride, uv, uv_stride, ts);
            });
            report_recording(shared, read.and(written), failed);
        }
    }

    pipeline.set_overlay(shared.overlay.load(Ordering::Relaxed));
    let banner = if pipeline.overlay() {
        let shown_fps = if fps > 0.0 { fps } else { ctx.format.fps() };
        Some(overlay_text(
            &ctx.device_name,
            texture.width(),
            texture.height(),
            shown_fps,
            texture.format(),
            frame_id,
        ))
    } else {
        None
    };

    let rgb = pipeline.render(texture, banner.as_deref())?;
    deliver(shared, texture.width(), texture.height(), rgb, pts_ns, frame_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_meter_smooths() {
        let mut meter = FpsMeter::default();
        let t0 = Instant::now();
        assert_eq!(meter.tick(t0), 0.0);
        let first = meter.tick(t0 + Duration::from_millis(20));
        approx::assert_relative_eq!(first, 50.0, epsilon = 1e-6);
        let second = meter.tick(t0 + Duration::from_millis(30));
        approx::assert_relative_eq!(second, 0.9 * 50.0 + 0.1 * 100.0, epsilon = 1e-6);
        approx::assert_relative_eq!(meter.fps(), second);
    }

    #[test]
    fn fps_meter_ignores_zero_interval() {
        let mut meter = FpsMeter::default();
        let t0 = Instant::now();
        meter.tick(t0);
        assert_eq!(meter.tick(t0), 0.0);
    }
}
