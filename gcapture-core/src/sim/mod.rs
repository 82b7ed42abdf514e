//! In-process collaborators for running the capture stack without
//! hardware: simulated devices, a software GPU, paced audio endpoints and
//! an in-memory muxer.

pub mod audio;
pub mod gpu;
pub mod muxer;
pub mod video;

use std::sync::Arc;

use crate::manager::Platform;
use crate::traits::gpu::GpuFactory;

use self::audio::{SimAudioEndpoint, SimAudioService};
use self::gpu::SimGpuFactory;
use self::muxer::MemoryMuxerFactory;
use self::video::{SimDevice, SimDeviceSystem};

impl Platform {
    /// Platform backed entirely by simulations. Both device systems share
    /// the same devices.
    pub fn simulated(devices: Vec<SimDevice>, gpu: Option<SimGpuFactory>, endpoints: Vec<SimAudioEndpoint>) -> Self {
        let system = Arc::new(SimDeviceSystem::new(devices));
        Self {
            hardware: system.clone(),
            low_level: system,
            gpu: gpu.map(|g| Arc::new(g) as Arc<dyn GpuFactory>),
            audio: Arc::new(SimAudioService::new(endpoints)),
            muxers: Arc::new(MemoryMuxerFactory::default()),
        }
    }
}
