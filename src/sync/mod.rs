//! Cross-process synchronization
//!
//! Directory mutations are serialized by one named binary semaphore per lock
//! key. Shared memory segments carry no locks of their own.

pub mod semaphore;

pub use semaphore::SystemLock;
