//! Fixed-capacity directory of value segments

pub mod growth;
pub mod item;
pub mod list;

pub use growth::calculate_segment_size;
pub use item::{SegmentListItem, SegmentListItemCodec};
pub use list::{directory_size, SegmentList};
