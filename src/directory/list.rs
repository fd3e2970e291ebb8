//! The segment directory stored in its own shared memory segment
//!
//! Layout of the directory segment:
//!
//! ```text
//! [0..4]            capacity N (big-endian u32)
//! [4..4 + 16 * N]   N records, see `SegmentListItemCodec`
//! ```
//!
//! The directory segment lives under the base key `K`; slot `i` owns the
//! value segment at key `K + 1 + i`. A `SegmentList` is a short-lived view:
//! it reloads from shared memory on first use and writes the whole table
//! back after every mutation. Callers must hold the system lock for the
//! lifetime of the view.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::{
    config::{HEADER_SIZE, RECORD_SIZE},
    error::{Result, SegdirError},
    memory::{RegionConfig, Segment},
};

use super::{
    growth::calculate_segment_size,
    item::{unix_timestamp, SegmentListItem, SegmentListItemCodec},
};

/// Expected size of a directory segment holding `capacity` records
pub fn directory_size(capacity: usize) -> usize {
    HEADER_SIZE + RECORD_SIZE * capacity
}

/// View over the directory of value segments
#[derive(Debug)]
pub struct SegmentList {
    key: u32,
    config: RegionConfig,
    items: Vec<SegmentListItem>,
    loaded: bool,
    #[cfg(test)]
    fail_writes: bool,
}

impl SegmentList {
    /// Create an unloaded view bound to the directory at `key`
    pub fn new(config: RegionConfig, key: u32) -> Self {
        Self {
            key,
            config,
            items: Vec::new(),
            loaded: false,
            #[cfg(test)]
            fail_writes: false,
        }
    }

    /// Key of the directory segment
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Whether the table has been read or initialized
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Number of slots; zero until loaded
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Key of the value segment owned by slot `id`
    pub fn segment_key(&self, id: usize) -> Result<u32> {
        u32::try_from(id)
            .ok()
            .and_then(|id| self.key.checked_add(1)?.checked_add(id))
            .ok_or_else(|| {
                SegdirError::invalid_parameter(
                    "id",
                    format!("slot {} overflows the key space above {}", id, self.key),
                )
            })
    }

    /// Create the directory segment with `capacity` empty slots
    pub fn init(&mut self, capacity: usize) -> Result<()> {
        if self.loaded {
            return Err(SegdirError::invalid_parameter(
                "init",
                "directory is already loaded",
            ));
        }
        if capacity == 0 || u32::try_from(capacity).is_err() {
            return Err(SegdirError::invalid_parameter(
                "capacity",
                format!("capacity {} must be between 1 and {}", capacity, u32::MAX),
            ));
        }
        // Keys for every slot must be derivable
        self.segment_key(capacity - 1)?;

        let segment = Segment::create(&self.config, self.key, directory_size(capacity))?;
        drop(segment);

        self.items = vec![SegmentListItemCodec::new_empty(); capacity];
        self.loaded = true;
        if let Err(e) = self.write() {
            // A zero-filled segment would fail every later read
            self.items.clear();
            self.loaded = false;
            if let Err(remove_err) = Segment::remove(&self.config, self.key) {
                warn!(
                    "failed to remove half-initialized directory {}: {}",
                    self.config.describe(self.key),
                    remove_err
                );
            }
            return Err(e);
        }

        debug!(
            "initialized directory {} with {} slots",
            self.config.describe(self.key),
            capacity
        );
        Ok(())
    }

    /// Load the table from shared memory
    ///
    /// Returns [`SegdirError::NotInitialized`] when the directory segment does
    /// not exist, and [`SegdirError::Format`] when its size disagrees with the
    /// capacity stored in its header.
    pub fn read(&mut self) -> Result<()> {
        let segment = match Segment::attach_existing(&self.config, self.key, 0) {
            Ok(segment) => segment,
            Err(SegdirError::SegmentNotFound { .. }) => {
                return Err(SegdirError::NotInitialized { key: self.key })
            }
            Err(e) => return Err(e),
        };

        let capacity = Self::validate_layout(&segment)?;

        let mut items = Vec::with_capacity(capacity);
        for id in 0..capacity {
            let bytes = segment.read(HEADER_SIZE + id * RECORD_SIZE, RECORD_SIZE)?;
            items.push(SegmentListItemCodec::decode(&bytes)?);
        }

        self.items = items;
        self.loaded = true;
        Ok(())
    }

    /// Read the capacity header and check the segment size against it
    fn validate_layout(segment: &Segment) -> Result<usize> {
        if segment.size() < HEADER_SIZE {
            return Err(SegdirError::format(format!(
                "directory segment is {} bytes, smaller than its header",
                segment.size()
            )));
        }

        let header = segment.read(0, HEADER_SIZE)?;
        let capacity = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;

        let expected = directory_size(capacity);
        if segment.size() != expected {
            return Err(SegdirError::format(format!(
                "directory segment is {} bytes, expected {} for capacity {}",
                segment.size(),
                expected,
                capacity
            )));
        }

        Ok(capacity)
    }

    /// Persist the whole table; a no-op when nothing is loaded
    pub fn write(&mut self) -> Result<()> {
        if !self.loaded {
            return Ok(());
        }

        #[cfg(test)]
        if self.fail_writes {
            return Err(SegdirError::resource("injected write failure"));
        }

        // The handle is unmapped on every exit path when it drops
        let mut segment = Segment::attach_writable(&self.config, self.key, 0)?;
        let capacity = self.items.len();
        let expected = directory_size(capacity);
        if segment.size() != expected {
            return Err(SegdirError::format(format!(
                "directory segment is {} bytes, expected {} for {} loaded slots",
                segment.size(),
                expected,
                capacity
            )));
        }

        // A zero header means the segment was just created
        let header = segment.read(0, HEADER_SIZE)?;
        let stored = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if stored != 0 && stored != capacity {
            return Err(SegdirError::format(format!(
                "directory holds {} slots but {} are loaded",
                stored, capacity
            )));
        }

        let mut buffer = Vec::with_capacity(directory_size(capacity));
        buffer.extend_from_slice(&(capacity as u32).to_be_bytes());
        for item in &self.items {
            buffer.extend_from_slice(&SegmentListItemCodec::encode(item));
        }

        segment.write(0, &buffer)?;
        segment.close();
        Ok(())
    }

    fn ensure_loaded(&mut self) -> Result<()> {
        if !self.loaded {
            self.read()?;
        }
        Ok(())
    }

    fn check_id(&self, id: usize) -> Result<()> {
        if id >= self.items.len() {
            return Err(SegdirError::out_of_bounds(id, self.items.len()));
        }
        Ok(())
    }

    /// Claim the lowest free slot and create its value segment
    ///
    /// Slots whose derived key is already taken by a stray segment are
    /// skipped. Fails with [`SegdirError::OutOfBounds`] when no slot is usable.
    pub fn allocate_segment(&mut self) -> Result<usize> {
        self.ensure_loaded()?;

        let initial_size = calculate_segment_size(0);
        for id in 0..self.items.len() {
            if !self.items[id].is_empty() {
                continue;
            }

            let key = match self.segment_key(id) {
                Ok(key) => key,
                Err(e) => {
                    warn!("slot {} skipped: {}", id, e);
                    continue;
                }
            };
            let segment = match Segment::create(&self.config, key, initial_size) {
                Ok(segment) => segment,
                Err(SegdirError::SegmentExists { .. }) => {
                    warn!("slot {} skipped: key {} is already in use", id, key);
                    continue;
                }
                Err(e) => {
                    warn!("slot {} skipped: {}", id, e);
                    continue;
                }
            };
            drop(segment);

            self.items[id] = SegmentListItem::new(key, initial_size as u32, 0, unix_timestamp());
            if let Err(e) = self.write() {
                self.items[id] = SegmentListItemCodec::new_empty();
                if let Err(remove_err) = Segment::remove(&self.config, key) {
                    warn!("slot {} leaked segment {}: {}", id, key, remove_err);
                }
                return Err(e);
            }

            debug!("allocated slot {} (key {})", id, key);
            return Ok(id);
        }

        Err(SegdirError::out_of_bounds(self.items.len(), self.items.len()))
    }

    /// Free slot `id` and delete its value segment
    ///
    /// Returns `false` without touching anything when the slot is already
    /// empty.
    pub fn release_segment(&mut self, id: usize) -> Result<bool> {
        self.ensure_loaded()?;
        self.check_id(id)?;

        let item = self.items[id];
        if item.is_empty() {
            return Ok(false);
        }

        let mut segment = Segment::attach_writable(&self.config, item.key, 0).map_err(|e| {
            SegdirError::resource(format!(
                "slot {} claims key {} but its segment cannot be opened: {}",
                id, item.key, e
            ))
        })?;
        segment.delete()?;

        self.items[id] = SegmentListItemCodec::new_empty();
        self.write()?;
        debug!("released slot {} (key {})", id, item.key);
        Ok(true)
    }

    /// Read the live data of slot `id`
    ///
    /// `None` means the slot is empty or its segment is gone; a slot with no
    /// data yet yields an empty vector.
    pub fn read_segment(&mut self, id: usize) -> Result<Option<Vec<u8>>> {
        self.ensure_loaded()?;
        self.check_id(id)?;

        let item = self.items[id];
        if item.is_empty() {
            return Ok(None);
        }
        // A zero length would attach the whole segment
        if item.data_size == 0 {
            return Ok(Some(Vec::new()));
        }

        let len = item.data_size as usize;
        let segment = match Segment::attach_existing(&self.config, item.key, len) {
            Ok(segment) => segment,
            Err(e) => {
                warn!("slot {} (key {}) could not be read: {}", id, item.key, e);
                return Ok(None);
            }
        };

        segment.read(0, len).map(Some)
    }

    /// Store `data` in slot `id`, growing its segment when it does not fit
    pub fn write_to_segment(&mut self, id: usize, data: &[u8]) -> Result<()> {
        self.ensure_loaded()?;
        self.check_id(id)?;

        let data_size = u32::try_from(data.len()).map_err(|_| {
            SegdirError::invalid_parameter("data", format!("{} bytes exceeds u32 range", data.len()))
        })?;

        let mut item = self.items[id];
        if item.is_empty() {
            return Err(SegdirError::resource(format!(
                "cannot write to unallocated slot {}",
                id
            )));
        }

        let mut segment = Segment::attach_writable(&self.config, item.key, 0).map_err(|e| {
            SegdirError::resource(format!(
                "slot {} claims key {} but its segment cannot be opened: {}",
                id, item.key, e
            ))
        })?;

        if data_size > item.segment_size {
            let new_size = calculate_segment_size(data.len());
            let segment_size = u32::try_from(new_size).map_err(|_| {
                SegdirError::invalid_parameter(
                    "data",
                    format!("segment of {} bytes exceeds u32 range", new_size),
                )
            })?;

            segment.delete()?;
            segment = match Segment::create(&self.config, item.key, new_size) {
                Ok(segment) => segment,
                Err(e) => {
                    // The old segment is already gone, so the slot cannot stay occupied
                    self.items[id] = SegmentListItemCodec::new_empty();
                    self.write()?;
                    return Err(e);
                }
            };
            debug!(
                "grew slot {} (key {}) from {} to {} bytes",
                id, item.key, item.segment_size, segment_size
            );
            item.segment_size = segment_size;
            item.data_size = 0;
            // The old segment is gone; record the new size even if the write fails
            self.items[id] = item;
        }

        segment.write(0, data)?;
        segment.close();

        item.data_size = data_size;
        item.touch();
        self.items[id] = item;
        self.write()
    }

    /// Copy of every occupied slot keyed by slot id
    pub fn get_items(&mut self) -> Result<BTreeMap<usize, SegmentListItem>> {
        self.ensure_loaded()?;
        Ok(self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_empty())
            .map(|(id, item)| (id, *item))
            .collect())
    }

    /// Release every slot and delete the directory segment itself
    pub fn destroy(&mut self) -> Result<()> {
        self.ensure_loaded()?;

        for id in 0..self.items.len() {
            if !self.items[id].is_empty() {
                self.release_segment(id)?;
            }
        }

        let mut segment = Segment::attach_writable(&self.config, self.key, 0).map_err(|e| {
            SegdirError::resource(format!(
                "directory {} cannot be opened for deletion: {}",
                self.key, e
            ))
        })?;
        segment.delete()?;

        self.items.clear();
        self.loaded = false;
        debug!("destroyed directory {}", self.config.describe(self.key));
        Ok(())
    }
}
