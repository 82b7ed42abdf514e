//! In-memory muxer that records what it was asked to write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::traits::muxer::{AudioStreamConfig, MediaSample, MuxSummary, Muxer, MuxerFactory, StreamIndex, VideoStreamConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedSample {
    pub stream: StreamIndex,
    pub ts: i64,
    pub duration: i64,
    pub len: usize,
}

/// Everything written to one muxer.
#[derive(Debug, Clone)]
pub struct MemoryOutput {
    pub path: PathBuf,
    pub video: Option<VideoStreamConfig>,
    pub audio: Option<AudioStreamConfig>,
    pub video_stream: StreamIndex,
    pub audio_stream: Option<StreamIndex>,
    pub samples: Vec<RecordedSample>,
    pub begun: bool,
    pub finalized: bool,
}

impl MemoryOutput {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            video: None,
            audio: None,
            video_stream: StreamIndex(0),
            audio_stream: None,
            samples: Vec::new(),
            begun: false,
            finalized: false,
        }
    }

    pub fn samples_for(&self, stream: StreamIndex) -> impl Iterator<Item = &RecordedSample> {
        self.samples.iter().filter(move |s| s.stream == stream)
    }
}

#[derive(Default)]
pub struct MemoryMuxerFactory {
    outputs: Mutex<Vec<Arc<Mutex<MemoryOutput>>>>,
    failing: bool,
}

impl MemoryMuxerFactory {
    /// A factory whose muxers cannot be created.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// Snapshot of the most recently created muxer.
    pub fn last(&self) -> Option<MemoryOutput> {
        self.outputs.lock().last().map(|o| o.lock().clone())
    }

    pub fn count(&self) -> usize {
        self.outputs.lock().len()
    }
}

impl MuxerFactory for MemoryMuxerFactory {
    fn create(&self, path: &Path) -> Result<Box<dyn Muxer>, CaptureError> {
        if self.failing {
            return Err(CaptureError::Io(format!("cannot create {}", path.display())));
        }
        let output = Arc::new(Mutex::new(MemoryOutput::new(path)));
        self.outputs.lock().push(Arc::clone(&output));
        Ok(Box::new(MemoryMuxer {
            output,
            next_stream: 0,
            last_ts: HashMap::new(),
        }))
    }
}

struct MemoryMuxer {
    output: Arc<Mutex<MemoryOutput>>,
    next_stream: u32,
    last_ts: HashMap<StreamIndex, i64>,
}

impl MemoryMuxer {
    fn allocate(&mut self) -> Result<StreamIndex, CaptureError> {
        if self.output.lock().begun {
            return Err(CaptureError::InvalidState("streams must be added before begin".into()));
        }
        let index = StreamIndex(self.next_stream);
        self.next_stream += 1;
        Ok(index)
    }
}

impl Muxer for MemoryMuxer {
    fn add_video_stream(&mut self, config: &VideoStreamConfig) -> Result<StreamIndex, CaptureError> {
        let index = self.allocate()?;
        let mut output = self.output.lock();
        output.video = Some(*config);
        output.video_stream = index;
        Ok(index)
    }

    fn add_audio_stream(&mut self, config: &AudioStreamConfig) -> Result<StreamIndex, CaptureError> {
        let index = self.allocate()?;
        let mut output = self.output.lock();
        output.audio = Some(*config);
        output.audio_stream = Some(index);
        Ok(index)
    }

    fn begin(&mut self) -> Result<(), CaptureError> {
        self.output.lock().begun = true;
        Ok(())
    }

    fn write_sample(&mut self, stream: StreamIndex, sample: &MediaSample<'_>) -> Result<(), CaptureError> {
        let mut output = self.output.lock();
        if !output.begun || output.finalized {
            return Err(CaptureError::InvalidState("muxer is not writable".into()));
        }
        if stream.0 >= self.next_stream {
            return Err(CaptureError::InvalidArgument(format!("unknown stream {}", stream.0)));
        }
        if let Some(&last) = self.last_ts.get(&stream) {
            if sample.ts < last {
                return Err(CaptureError::InvalidArgument(format!(
                    "stream {} timestamp went backwards: {} < {}",
                    stream.0, sample.ts, last
                )));
            }
        }
        self.last_ts.insert(stream, sample.ts);
        output.samples.push(RecordedSample {
            stream,
            ts: sample.ts,
            duration: sample.duration,
            len: sample.data.len(),
        });
        Ok(())
    }

    fn finalize(&mut self) -> Result<MuxSummary, CaptureError> {
        let mut output = self.output.lock();
        output.finalized = true;
        Ok(MuxSummary {
            bytes_written: output.samples.iter().map(|s| s.len as u64).sum(),
            checksum: None,
        })
    }
}
