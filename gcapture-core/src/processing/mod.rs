pub mod chunk_queue;
pub mod frame_converter;
pub mod pcm;
pub mod shaders;
