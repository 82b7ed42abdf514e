pub mod audio_endpoint;
pub mod callbacks;
pub mod device_system;
pub mod gpu;
pub mod muxer;
