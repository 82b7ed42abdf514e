pub mod chunk_writer;
pub mod container;
pub mod metadata;
