//! Lock-guarded entry point to the segment directory

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::{
    directory::{SegmentList, SegmentListItem},
    error::{Result, SegdirError},
    sync::SystemLock,
};

use super::config::ClientConfig;

/// Result of [`Client::release_segment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The slot was occupied and is now free
    Released,
    /// The slot was already free; nothing changed
    AlreadyEmpty,
    /// The id is outside the directory; nothing changed
    OutOfRange,
}

/// Client of a shared segment directory
///
/// Every operation takes the system lock, reloads the directory from shared
/// memory, runs, and releases the lock again on every exit path. Independent
/// `Client`s, in the same process or not, serialize on the lock.
///
/// The `locked` flag only tracks this instance. Calling [`Client::lock`] while
/// this instance already holds the lock returns `false` instead of blocking,
/// and any directory operation issued while the lock is held explicitly still
/// releases it when the operation finishes.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    lock: SystemLock,
    locked: bool,
}

impl Client {
    /// Open the lock and make sure the directory exists, creating it with
    /// the configured capacity on first use
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let lock = SystemLock::open(&config.region, config.lock_key)?;
        let mut client = Self {
            config,
            lock,
            locked: false,
        };

        client.lock()?;
        let prepared = client.prepare_directory();
        let unlocked = client.unlock();
        prepared?;
        unlocked?;

        Ok(client)
    }

    fn prepare_directory(&self) -> Result<()> {
        let mut list = self.directory();
        match list.read() {
            Ok(()) => {
                if list.capacity() != self.config.capacity {
                    warn!(
                        "directory {} has {} slots, configured capacity {} is ignored",
                        self.config.directory_key,
                        list.capacity(),
                        self.config.capacity
                    );
                }
                Ok(())
            }
            Err(e) if e.is_not_initialized() => list
                .init(self.config.capacity)
                .map_err(|e| SegdirError::operation("initialize directory", e)),
            Err(e) => Err(e),
        }
    }

    fn directory(&self) -> SegmentList {
        SegmentList::new(self.config.region.clone(), self.config.directory_key)
    }

    /// Acquire the system lock for this instance. Returns `false` without
    /// blocking if this instance already holds it.
    pub fn lock(&mut self) -> Result<bool> {
        if self.locked {
            return Ok(false);
        }
        self.lock.acquire()?;
        self.locked = true;
        Ok(true)
    }

    /// Release the system lock. Returns `false` if this instance does not
    /// hold it.
    pub fn unlock(&mut self) -> Result<bool> {
        if !self.locked {
            return Ok(false);
        }
        self.lock.release()?;
        self.locked = false;
        Ok(true)
    }

    /// Whether this instance holds the lock
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run `op` on a fresh directory view under the lock
    fn with_directory<T>(&mut self, op: impl FnOnce(&mut SegmentList) -> Result<T>) -> Result<T> {
        self.lock()?;
        let mut list = self.directory();
        let result = op(&mut list);
        drop(list);
        let unlocked = self.unlock();

        let value = result?;
        unlocked?;
        Ok(value)
    }

    /// Claim a free slot, returning its id
    ///
    /// A full directory surfaces as [`SegdirError::OutOfBounds`]; every other
    /// failure is wrapped in [`SegdirError::Operation`].
    pub fn allocate_segment(&mut self) -> Result<usize> {
        self.with_directory(|list| list.allocate_segment())
            .map_err(|e| {
                if e.is_out_of_bounds() {
                    e
                } else {
                    SegdirError::operation("allocate_segment", e)
                }
            })
    }

    /// Free a slot; releasing an empty slot or an unknown id is not an error
    pub fn release_segment(&mut self, id: usize) -> Result<ReleaseOutcome> {
        match self.with_directory(|list| list.release_segment(id)) {
            Ok(true) => Ok(ReleaseOutcome::Released),
            Ok(false) => Ok(ReleaseOutcome::AlreadyEmpty),
            Err(e) if e.is_out_of_bounds() => {
                debug!("release of slot {} ignored: {}", id, e);
                Ok(ReleaseOutcome::OutOfRange)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the contents of slot `id` with `data`
    pub fn write_to_segment(&mut self, id: usize, data: &[u8]) -> Result<()> {
        if data.len() > self.config.max_value_size {
            return Err(SegdirError::invalid_parameter(
                "data",
                format!(
                    "{} bytes exceeds the limit of {}",
                    data.len(),
                    self.config.max_value_size
                ),
            ));
        }
        self.with_directory(|list| list.write_to_segment(id, data))
    }

    /// Contents of one slot, `None` when it is empty
    pub fn read_segment(&mut self, id: usize) -> Result<Option<Vec<u8>>> {
        self.with_directory(|list| list.read_segment(id))
    }

    /// Contents of every occupied slot keyed by slot id
    pub fn read_all_segments(&mut self) -> Result<BTreeMap<usize, Vec<u8>>> {
        self.with_directory(|list| {
            let ids: Vec<usize> = list.get_items()?.into_keys().collect();
            let mut values = BTreeMap::new();
            for id in ids {
                if let Some(data) = list.read_segment(id)? {
                    values.insert(id, data);
                }
            }
            Ok(values)
        })
    }

    /// Records of every occupied slot keyed by slot id
    pub fn get_segments(&mut self) -> Result<BTreeMap<usize, SegmentListItem>> {
        self.with_directory(|list| list.get_items())
    }

    /// Slot count stored in the directory header
    pub fn capacity(&mut self) -> Result<usize> {
        self.with_directory(|list| {
            list.read()?;
            Ok(list.capacity())
        })
    }

    /// Free every slot and delete the directory itself
    pub fn destroy(&mut self) -> Result<()> {
        self.with_directory(|list| list.destroy())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // A lock left held here would block every other process forever
        if self.locked {
            let _ = self.lock.release();
        }
    }
}
