//! Error types and handling for segdir

/// Result type alias for segdir operations
pub type Result<T> = std::result::Result<T, SegdirError>;

/// Error types for the segment directory
#[derive(Debug, thiserror::Error)]
pub enum SegdirError {
    /// The directory region does not exist yet
    #[error("Directory not initialized: no region at key {key}")]
    NotInitialized { key: u32 },

    /// Slot id outside the directory, or no usable slot left on allocation
    #[error("Slot out of bounds: id {id}, capacity {capacity}")]
    OutOfBounds { id: usize, capacity: usize },

    /// Decoded bytes do not match the fixed binary layout
    #[error("Format error: {message}")]
    Format { message: String },

    /// An operation on the underlying OS primitive failed
    #[error("Resource error: {message}")]
    Resource {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Create-exclusive found an existing region under the key
    #[error("Segment already exists: key {key}")]
    SegmentExists { key: u32 },

    /// Attach found no region under the key
    #[error("Segment not found: key {key}")]
    SegmentNotFound { key: u32 },

    /// I/O attempted on a closed segment handle
    #[error("Segment not open: key {key}")]
    NotOpen { key: u32 },

    /// Byte range outside the mapped segment
    #[error("Segment access out of bounds: offset {offset} + length {len} exceeds size {size}")]
    SegmentOutOfBounds { offset: usize, len: usize, size: usize },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Failure of a client operation, wrapping the underlying cause
    #[error("{operation} failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<SegdirError>,
    },
}

impl SegdirError {
    /// Create a resource error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Resource {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a resource error without an OS cause
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
            source: None,
        }
    }

    /// Create a format error
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(id: usize, capacity: usize) -> Self {
        Self::OutOfBounds { id, capacity }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Wrap an error as the failure of a named client operation
    pub fn operation(operation: &'static str, source: SegdirError) -> Self {
        Self::Operation {
            operation,
            source: Box::new(source),
        }
    }

    /// Whether this is a slot bounds violation or a full directory
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. })
    }

    /// Whether the directory region is missing
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized { .. })
    }
}

impl From<std::io::Error> for SegdirError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::errno::Errno> for SegdirError {
    fn from(err: nix::errno::Errno) -> Self {
        Self::from_io(std::io::Error::from(err), "System call failed")
    }
}
