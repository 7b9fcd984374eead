//! File-system helpers shared by the file source and the text sink.

pub mod compression;
pub mod glob;
