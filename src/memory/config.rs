//! Configuration types for shared memory segments

use std::path::PathBuf;

use crate::config::DEFAULT_NAMESPACE;

/// Types of shared memory backing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingType {
    /// POSIX shared memory object (`shm_open`)
    PosixShm,
    /// Regular file mapped into memory
    FileBacked,
}

impl Default for BackingType {
    fn default() -> Self {
        Self::PosixShm
    }
}

impl BackingType {
    /// Get a human-readable name for the backing type
    pub fn name(&self) -> &'static str {
        match self {
            BackingType::PosixShm => "posix-shm",
            BackingType::FileBacked => "file-backed",
        }
    }
}

/// How a segment is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Create a new segment; fails if the key is taken
    CreateExclusive,
    /// Attach to an existing segment for reading
    AttachExisting,
    /// Attach to an existing segment for reading and writing
    AttachWritable,
}

impl AccessMode {
    /// Whether the mapping is writable in this mode
    pub fn is_writable(&self) -> bool {
        !matches!(self, AccessMode::AttachExisting)
    }
}

/// Configuration shared by every segment of one directory
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Prefix of every OS object name
    pub namespace: String,
    /// Backing type for the segments
    pub backing_type: BackingType,
    /// Directory holding the files of file-backed segments
    pub base_dir: Option<PathBuf>,
    /// Permissions for created segments (Unix permissions)
    pub permissions: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            backing_type: BackingType::default(),
            base_dir: None,
            permissions: 0o600,
        }
    }
}

impl RegionConfig {
    /// Create a new region configuration under a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Set the backing type
    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.backing_type = backing_type;
        self
    }

    /// Use file-backed segments stored under `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backing_type = BackingType::FileBacked;
        self.base_dir = Some(dir.into());
        self
    }

    /// Set the permissions for created segments
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        use crate::error::SegdirError;

        if self.namespace.is_empty() {
            return Err(SegdirError::invalid_parameter(
                "namespace",
                "Namespace cannot be empty",
            ));
        }

        if self.namespace.contains('/') || self.namespace.contains('\0') {
            return Err(SegdirError::invalid_parameter(
                "namespace",
                "Namespace cannot contain '/' or null bytes",
            ));
        }

        if self.permissions & !0o777 != 0 {
            return Err(SegdirError::invalid_parameter(
                "permissions",
                format!("Invalid permission bits: {:o}", self.permissions),
            ));
        }

        Ok(())
    }

    /// Name of the POSIX shared memory object for `key`
    pub fn shm_name(&self, key: u32) -> String {
        format!("/{}.{}", self.namespace, key)
    }

    /// Path of the backing file for `key`
    pub fn file_path(&self, key: u32) -> PathBuf {
        self.base_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("{}.{}", self.namespace, key))
    }

    /// Human-readable location of the segment for `key`, used in log lines
    pub fn describe(&self, key: u32) -> String {
        match self.backing_type {
            BackingType::PosixShm => self.shm_name(key),
            BackingType::FileBacked => self.file_path(key).display().to_string(),
        }
    }
}
