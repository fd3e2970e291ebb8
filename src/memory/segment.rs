//! Handle to one keyed shared memory segment
//!
//! A [`Segment`] is a bounds-checked view over a block of memory shared by
//! every process that agrees on the same [`RegionConfig`] and key. The block
//! outlives the handle: dropping or closing a handle only unmaps it, while
//! [`Segment::delete`] removes the name so later opens fail.

use std::{
    fs::{File, OpenOptions},
    io::ErrorKind,
    os::unix::fs::OpenOptionsExt,
};

use log::debug;
use memmap2::{Mmap, MmapMut, MmapOptions};
use nix::{
    errno::Errno,
    fcntl::OFlag,
    sys::{mman, stat::Mode},
};

use crate::error::{Result, SegdirError};

use super::config::{AccessMode, BackingType, RegionConfig};

/// Memory mapping of an open segment
#[derive(Debug)]
enum Mapping {
    ReadOnly(Mmap),
    Writable(MmapMut),
    /// Zero-length view; nothing to map
    Empty,
}

impl Mapping {
    fn as_slice(&self) -> &[u8] {
        match self {
            Mapping::ReadOnly(map) => map,
            Mapping::Writable(map) => map,
            Mapping::Empty => &[],
        }
    }
}

#[derive(Debug)]
struct OpenSegment {
    _file: File,
    mapping: Mapping,
}

/// A handle to one shared memory segment
#[derive(Debug)]
pub struct Segment {
    key: u32,
    mode: AccessMode,
    config: RegionConfig,
    /// Length of the mapped view in bytes
    size: usize,
    open: Option<OpenSegment>,
}

impl Segment {
    /// Create a new segment of `size` bytes; fails with
    /// [`SegdirError::SegmentExists`] if the key is already in use
    pub fn create(config: &RegionConfig, key: u32, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SegdirError::invalid_parameter(
                "size",
                "Segment size must be greater than 0",
            ));
        }

        let file = Self::open_backing(config, key, AccessMode::CreateExclusive)?;

        if let Err(e) = file.set_len(size as u64) {
            let _ = Self::remove(config, key);
            return Err(SegdirError::from_io(e, "Failed to set segment size"));
        }

        debug!("created segment {} ({} bytes)", config.describe(key), size);
        Self::map(config, key, AccessMode::CreateExclusive, file, size)
    }

    /// Attach to an existing segment read-only. A `len` of zero maps the
    /// whole segment; otherwise only the first `len` bytes are mapped.
    pub fn attach_existing(config: &RegionConfig, key: u32, len: usize) -> Result<Self> {
        Self::attach(config, key, len, AccessMode::AttachExisting)
    }

    /// Attach to an existing segment for reading and writing
    pub fn attach_writable(config: &RegionConfig, key: u32, len: usize) -> Result<Self> {
        Self::attach(config, key, len, AccessMode::AttachWritable)
    }

    fn attach(config: &RegionConfig, key: u32, len: usize, mode: AccessMode) -> Result<Self> {
        let file = Self::open_backing(config, key, mode)?;
        let actual = file
            .metadata()
            .map_err(|e| SegdirError::from_io(e, "Failed to stat segment"))?
            .len() as usize;

        let view = if len == 0 {
            actual
        } else if len > actual {
            return Err(SegdirError::SegmentOutOfBounds {
                offset: 0,
                len,
                size: actual,
            });
        } else {
            len
        };

        Self::map(config, key, mode, file, view)
    }

    /// Open the OS object behind `key` in the requested mode
    fn open_backing(config: &RegionConfig, key: u32, mode: AccessMode) -> Result<File> {
        match config.backing_type {
            BackingType::PosixShm => Self::open_shm(config, key, mode),
            BackingType::FileBacked => Self::open_file(config, key, mode),
        }
    }

    fn open_shm(config: &RegionConfig, key: u32, mode: AccessMode) -> Result<File> {
        let flags = match mode {
            AccessMode::CreateExclusive => OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            AccessMode::AttachExisting => OFlag::O_RDONLY,
            AccessMode::AttachWritable => OFlag::O_RDWR,
        };
        let perms = Mode::from_bits_truncate(config.permissions as libc::mode_t);

        mman::shm_open(config.shm_name(key).as_str(), flags, perms)
            .map(File::from)
            .map_err(|errno| match errno {
                Errno::EEXIST => SegdirError::SegmentExists { key },
                Errno::ENOENT => SegdirError::SegmentNotFound { key },
                other => SegdirError::from_io(
                    std::io::Error::from(other),
                    &format!("Failed to open shared memory {}", config.shm_name(key)),
                ),
            })
    }

    fn open_file(config: &RegionConfig, key: u32, mode: AccessMode) -> Result<File> {
        let path = config.file_path(key);
        let mut options = OpenOptions::new();
        match mode {
            AccessMode::CreateExclusive => options
                .read(true)
                .write(true)
                .create_new(true)
                .mode(config.permissions),
            AccessMode::AttachExisting => options.read(true),
            AccessMode::AttachWritable => options.read(true).write(true),
        };

        options.open(&path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => SegdirError::SegmentExists { key },
            ErrorKind::NotFound if mode != AccessMode::CreateExclusive => {
                SegdirError::SegmentNotFound { key }
            }
            _ => SegdirError::from_io(e, &format!("Failed to open {}", path.display())),
        })
    }

    fn map(
        config: &RegionConfig,
        key: u32,
        mode: AccessMode,
        file: File,
        size: usize,
    ) -> Result<Self> {
        let mapping = if size == 0 {
            Mapping::Empty
        } else if mode.is_writable() {
            // SAFETY: the mapping is only touched through bounds-checked
            // slices; cross-process writers are serialized by the system lock.
            let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }
                .map_err(|e| SegdirError::from_io(e, "Failed to create memory mapping"))?;
            Mapping::Writable(map)
        } else {
            // SAFETY: as above.
            let map = unsafe { MmapOptions::new().len(size).map(&file) }
                .map_err(|e| SegdirError::from_io(e, "Failed to create memory mapping"))?;
            Mapping::ReadOnly(map)
        };

        Ok(Self {
            key,
            mode,
            config: config.clone(),
            size,
            open: Some(OpenSegment {
                _file: file,
                mapping,
            }),
        })
    }

    /// Remove the segment name for `key` without opening it
    pub fn remove(config: &RegionConfig, key: u32) -> Result<()> {
        match config.backing_type {
            BackingType::PosixShm => match mman::shm_unlink(config.shm_name(key).as_str()) {
                Ok(()) => Ok(()),
                Err(Errno::ENOENT) => Err(SegdirError::SegmentNotFound { key }),
                Err(e) => Err(SegdirError::from_io(
                    std::io::Error::from(e),
                    "Failed to unlink shared memory",
                )),
            },
            BackingType::FileBacked => {
                std::fs::remove_file(config.file_path(key)).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => SegdirError::SegmentNotFound { key },
                    _ => SegdirError::from_io(e, "Failed to remove segment file"),
                })
            }
        }
    }

    /// Check whether a segment exists under `key`
    pub fn exists(config: &RegionConfig, key: u32) -> bool {
        Self::attach_existing(config, key, 0).is_ok()
    }

    /// Read exactly `len` bytes starting at `offset`
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let open = self.open.as_ref().ok_or(SegdirError::NotOpen { key: self.key })?;
        let end = self.check_bounds(offset, len)?;
        Ok(open.mapping.as_slice()[offset..end].to_vec())
    }

    /// Write all of `data` starting at `offset`, returning the byte count
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<usize> {
        let end = self.check_bounds(offset, data.len())?;
        let key = self.key;
        let open = self.open.as_mut().ok_or(SegdirError::NotOpen { key })?;

        match &mut open.mapping {
            Mapping::Writable(map) => {
                map[offset..end].copy_from_slice(data);
                Ok(data.len())
            }
            Mapping::Empty => Ok(0),
            Mapping::ReadOnly(_) => Err(SegdirError::resource(format!(
                "Segment {} is attached read-only",
                key
            ))),
        }
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<usize> {
        if self.open.is_none() {
            return Err(SegdirError::NotOpen { key: self.key });
        }
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(end),
            _ => Err(SegdirError::SegmentOutOfBounds {
                offset,
                len,
                size: self.size,
            }),
        }
    }

    /// Mark the segment for removal and close this handle. Later opens of
    /// the key fail until a segment is created again.
    pub fn delete(&mut self) -> Result<()> {
        if self.open.is_none() {
            return Err(SegdirError::NotOpen { key: self.key });
        }
        self.close();
        Self::remove(&self.config, self.key)?;
        debug!("deleted segment {}", self.config.describe(self.key));
        Ok(())
    }

    /// Release the local mapping; the segment itself stays alive
    pub fn close(&mut self) {
        self.open = None;
    }

    /// Key the segment was opened under
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Mode the segment was opened in
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Size of the mapped view in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the handle is still open
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}
