pub mod audio_models;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod recording_result;
pub mod state;
