pub mod recorder;
pub mod timeline;
