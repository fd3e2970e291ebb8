//! Shared memory segment management

pub mod config;
pub mod segment;

pub use config::{AccessMode, BackingType, RegionConfig};
pub use segment::Segment;
