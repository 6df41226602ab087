//! HTTP handlers for entity reads, writes and many-to-many links.

pub mod entity;
pub use entity::*;
