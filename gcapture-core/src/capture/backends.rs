//! Capture backends: which device system a provider talks to, which
//! negotiation strategies it runs, and whether it exposes diagnostics.

use std::sync::Arc;

use crate::capture::negotiation::{CpuStrategy, GpuStrategy, MinimalStrategy, NegotiationStrategy};
use crate::capture::provider::{DeviceProvider, Provider};
use crate::manager::Platform;
use crate::models::config::{BackendKind, CaptureConfig};
use crate::traits::device_system::DeviceSystem;
use crate::traits::gpu::GpuFactory;

pub struct Backend {
    pub name: &'static str,
    pub system: Arc<dyn DeviceSystem>,
    pub gpu: Option<Arc<dyn GpuFactory>>,
    pub strategies: Vec<Box<dyn NegotiationStrategy>>,
    /// `device_props`, `signal_status` and `set_processing` are available.
    pub diagnostics: bool,
}

impl Backend {
    /// Hardware transform backend. With a GPU factory the cascade starts on
    /// the GPU-resident path.
    pub fn transform(system: Arc<dyn DeviceSystem>, gpu: Option<Arc<dyn GpuFactory>>) -> Self {
        let mut strategies: Vec<Box<dyn NegotiationStrategy>> = Vec::with_capacity(3);
        if gpu.is_some() {
            strategies.push(Box::new(GpuStrategy));
        }
        strategies.push(Box::new(CpuStrategy));
        strategies.push(Box::new(MinimalStrategy));
        Self {
            name: if gpu.is_some() { "hardware-gpu" } else { "hardware-cpu" },
            system,
            gpu,
            strategies,
            diagnostics: true,
        }
    }

    /// Low-level backend: software conversion only, no diagnostics.
    pub fn direct(system: Arc<dyn DeviceSystem>) -> Self {
        Self {
            name: "low-level",
            system,
            gpu: None,
            strategies: vec![Box::new(CpuStrategy), Box::new(MinimalStrategy)],
            diagnostics: false,
        }
    }

    pub fn for_config(config: &CaptureConfig, platform: &Platform) -> Self {
        match config.backend {
            BackendKind::HardwareGpu => {
                if platform.gpu.is_none() {
                    log::info!("No GPU backend available, hardware provider runs on the CPU path");
                }
                Self::transform(Arc::clone(&platform.hardware), platform.gpu.clone())
            }
            BackendKind::HardwareCpu => Self::transform(Arc::clone(&platform.hardware), None),
            BackendKind::LowLevel => Self::direct(Arc::clone(&platform.low_level)),
        }
    }
}

/// Build the provider selected by `config.backend`.
pub fn create_provider(config: &CaptureConfig, platform: &Platform) -> Box<dyn DeviceProvider> {
    let backend = Backend::for_config(config, platform);
    log::debug!(
        "Creating {} provider ({} strategies)",
        backend.name,
        backend.strategies.len()
    );
    Box::new(Provider::new(
        backend,
        config.clone(),
        Arc::clone(&platform.audio),
        Arc::clone(&platform.muxers),
    ))
}
