//! Configuration for the directory client

use std::path::PathBuf;

use crate::{
    config::{DEFAULT_CAPACITY, DEFAULT_MAX_VALUE_SIZE},
    error::{Result, SegdirError},
    memory::{BackingType, RegionConfig},
};

/// Configuration of a [`Client`](super::Client)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Key of the system lock
    pub lock_key: u32,
    /// Base key of the directory; slot `i` uses `directory_key + 1 + i`
    pub directory_key: u32,
    /// Number of slots used when the directory has to be created
    pub capacity: usize,
    /// Largest value accepted by `write_to_segment`
    pub max_value_size: usize,
    /// Naming and backing of every segment and of the lock
    pub region: RegionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            lock_key: 0,
            directory_key: 0,
            capacity: DEFAULT_CAPACITY,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            region: RegionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given lock and directory keys
    pub fn new(lock_key: u32, directory_key: u32) -> Self {
        Self {
            lock_key,
            directory_key,
            ..Default::default()
        }
    }

    /// Set the slot count used on initialization
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the largest accepted value
    pub fn with_max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = max_value_size;
        self
    }

    /// Set the namespace prefix of OS object names
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.region.namespace = namespace.into();
        self
    }

    /// Set the segment backing type
    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.region.backing_type = backing_type;
        self
    }

    /// Store segments as files under `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.region = self.region.with_base_dir(dir);
        self
    }

    /// Set the permissions of created segments and of the lock
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.region.permissions = permissions;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.region.validate()?;

        if self.capacity == 0 {
            return Err(SegdirError::invalid_parameter(
                "capacity",
                "Capacity must be greater than 0",
            ));
        }

        let fits = u32::try_from(self.capacity)
            .ok()
            .and_then(|capacity| self.directory_key.checked_add(capacity))
            .is_some();
        if !fits {
            return Err(SegdirError::invalid_parameter(
                "capacity",
                format!(
                    "{} slots above directory key {} overflow the key space",
                    self.capacity, self.directory_key
                ),
            ));
        }

        if self.max_value_size > u32::MAX as usize {
            return Err(SegdirError::invalid_parameter(
                "max_value_size",
                format!("Value size limit cannot exceed {}", u32::MAX),
            ));
        }

        Ok(())
    }
}
