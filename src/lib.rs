//! # segdir - Cross-Process Shared Memory Segment Directory
//!
//! segdir lets unrelated processes allocate, write, read and release byte
//! blobs in shared memory through a small numeric slot id, without a central
//! server. A fixed-capacity directory, itself stored in shared memory, maps
//! slots to value segments, and a system-wide semaphore serializes every
//! mutation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  Client (lock → fresh SegmentList → unlock)     │
//! ├─────────────────────────────────────────────────┤
//! │  SegmentList                                    │
//! │  key K:      [capacity N][record 0]..[record N] │
//! │  key K+1+i:  value segment of slot i            │
//! ├────────────────────────┬────────────────────────┤
//! │  Segment (shm / file)  │  SystemLock (sem_open) │
//! └────────────────────────┴────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use segdir::{Client, ClientConfig};
//!
//! # fn main() -> segdir::Result<()> {
//! let mut client = Client::new(ClientConfig::new(9000, 9100).with_capacity(64))?;
//! let id = client.allocate_segment()?;
//! client.write_to_segment(id, b"hello")?;
//! assert_eq!(client.read_segment(id)?, Some(b"hello".to_vec()));
//! client.release_segment(id)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod directory;
pub mod error;
pub mod memory;
pub mod sync;

// Main API re-exports
pub use client::{Client, ClientConfig, ReleaseOutcome};
pub use directory::{calculate_segment_size, SegmentList, SegmentListItem, SegmentListItemCodec};
pub use error::{Result, SegdirError};
pub use memory::{AccessMode, BackingType, RegionConfig, Segment};
pub use sync::SystemLock;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod config {
    /// Size of the capacity header at the start of the directory
    pub const HEADER_SIZE: usize = 4;

    /// Encoded size of one directory record
    pub const RECORD_SIZE: usize = 16;

    /// Geometric growth factor for value segments
    pub const GROWTH_FACTOR: f64 = 1.2;

    /// Slot count used when a client creates a missing directory
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Largest value a client accepts by default (16MB)
    pub const DEFAULT_MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

    /// Default prefix of OS object names
    pub const DEFAULT_NAMESPACE: &str = "segdir";
}
