//! System-wide binary lock backed by a POSIX named semaphore

use std::ffi::CString;

use log::debug;
use nix::errno::Errno;

use crate::{
    error::{Result, SegdirError},
    memory::RegionConfig,
};

/// A named binary semaphore shared by every process using the same
/// namespace and key
///
/// The semaphore is created with a count of one on first open. Dropping the
/// handle closes it locally without releasing a held count and without
/// removing the name; use [`SystemLock::unlink`] for that.
#[derive(Debug)]
pub struct SystemLock {
    sem: *mut libc::sem_t,
    name: CString,
    key: u32,
}

// SAFETY: POSIX semaphores may be waited on and posted from any thread.
unsafe impl Send for SystemLock {}
unsafe impl Sync for SystemLock {}

impl SystemLock {
    /// Name of the semaphore for `key`
    pub fn name_for(config: &RegionConfig, key: u32) -> String {
        format!("/{}.lock.{}", config.namespace, key)
    }

    fn c_name(config: &RegionConfig, key: u32) -> Result<CString> {
        CString::new(Self::name_for(config, key))
            .map_err(|_| SegdirError::invalid_parameter("namespace", "Name contains null bytes"))
    }

    /// Open the semaphore for `key`, creating it unlocked if missing
    pub fn open(config: &RegionConfig, key: u32) -> Result<Self> {
        let name = Self::c_name(config, key)?;

        let sem = unsafe {
            libc::sem_open(
                name.as_ptr(),
                libc::O_CREAT,
                config.permissions as libc::c_uint,
                1 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(SegdirError::from_io(
                std::io::Error::last_os_error(),
                &format!("Failed to open semaphore {}", Self::name_for(config, key)),
            ));
        }

        debug!("opened lock {}", Self::name_for(config, key));
        Ok(Self { sem, name, key })
    }

    /// Block until the lock is acquired
    pub fn acquire(&self) -> Result<()> {
        loop {
            match Errno::result(unsafe { libc::sem_wait(self.sem) }) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(SegdirError::from_io(
                        std::io::Error::from(e),
                        "Failed to acquire lock",
                    ))
                }
            }
        }
    }

    /// Acquire the lock if it is free, without blocking
    pub fn try_acquire(&self) -> Result<bool> {
        loop {
            match Errno::result(unsafe { libc::sem_trywait(self.sem) }) {
                Ok(_) => return Ok(true),
                Err(Errno::EAGAIN) => return Ok(false),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(SegdirError::from_io(
                        std::io::Error::from(e),
                        "Failed to acquire lock",
                    ))
                }
            }
        }
    }

    /// Release the lock
    pub fn release(&self) -> Result<()> {
        Errno::result(unsafe { libc::sem_post(self.sem) })
            .map(drop)
            .map_err(|e| SegdirError::from_io(std::io::Error::from(e), "Failed to release lock"))
    }

    /// Remove the semaphore name; open handles keep working
    pub fn unlink(config: &RegionConfig, key: u32) -> Result<()> {
        let name = Self::c_name(config, key)?;
        Errno::result(unsafe { libc::sem_unlink(name.as_ptr()) })
            .map(drop)
            .map_err(|e| SegdirError::from_io(std::io::Error::from(e), "Failed to unlink lock"))
    }

    /// Key the lock was opened under
    pub fn key(&self) -> u32 {
        self.key
    }

    /// OS name of the semaphore
    pub fn name(&self) -> &str {
        self.name.to_str().unwrap_or_default()
    }
}

impl Drop for SystemLock {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tag: &str) -> RegionConfig {
        RegionConfig::new(format!("segdir-lock-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn test_acquire_release() {
        let config = config("basic");
        let lock = SystemLock::open(&config, 1).unwrap();

        lock.acquire().unwrap();
        assert!(!lock.try_acquire().unwrap());
        lock.release().unwrap();
        assert!(lock.try_acquire().unwrap());
        lock.release().unwrap();

        SystemLock::unlink(&config, 1).unwrap();
    }

    #[test]
    fn test_handles_share_state() {
        let config = config("shared");
        let first = SystemLock::open(&config, 2).unwrap();
        let second = SystemLock::open(&config, 2).unwrap();

        first.acquire().unwrap();
        assert!(!second.try_acquire().unwrap());
        first.release().unwrap();
        assert!(second.try_acquire().unwrap());
        second.release().unwrap();

        assert_eq!(first.name(), SystemLock::name_for(&config, 2));
        SystemLock::unlink(&config, 2).unwrap();
    }
}
