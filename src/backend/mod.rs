//! Pluggable storage for stream bytes.
//!
//! The cache never touches files or buffers directly; it goes through a
//! [`Backend`], which creates, opens and deletes backing objects addressed by
//! an opaque `name`. Two implementations ship with the crate: [`DiskBackend`]
//! (one file per stream under a root directory) and [`MemoryBackend`] (an
//! in-process table). Custom backends plug in through the same trait.

use std::io::{self, Read, Write};
use std::time::SystemTime;

mod disk;
mod memory;
mod name;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

/// A freshly created backing object: its durable name plus the write side.
pub struct NewStream {
    pub name: String,
    pub writer: Box<dyn Write + Send>,
}

impl std::fmt::Debug for NewStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewStream").field("name", &self.name).finish_non_exhaustive()
    }
}

/// One persisted stream discovered on [`Backend::reload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadedStream {
    pub key: String,
    pub name: String,
}

/// Last-read / last-write times of a backing object, as the backend tracks
/// them. Eviction policies consume these.
#[derive(Debug, Clone, Copy)]
pub struct AccessTimes {
    pub last_read: SystemTime,
    pub last_write: SystemTime,
}

/// Storage operations the cache depends on.
///
/// Invariants implementations must uphold:
///
/// - [`create`](Self::create) yields an object that [`open`](Self::open) can
///   read concurrently with the writer and with other readers, each read
///   handle with its own cursor.
/// - Bytes written through [`NewStream::writer`] are visible to already open
///   read handles without any close or sync step in between.
/// - [`reload`](Self::reload) resolves duplicates so at most one entry per
///   key is returned.
pub trait Backend: Send + Sync + 'static {
    /// Enumerates the streams already present in storage.
    ///
    /// Called once at cache construction, before any `get` can run.
    fn reload(&self) -> io::Result<Vec<ReloadedStream>>;

    /// Creates a fresh backing object for `key`.
    ///
    /// A backend that derives names from keys must refuse an existing name
    /// with [`io::ErrorKind::AlreadyExists`]; the cache treats that as a
    /// concurrent creation race and retries the lookup.
    fn create(&self, key: &str) -> io::Result<NewStream>;

    /// Opens a new read handle. May be called many times per object.
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Deletes the object. Called after the writer closed and readers
    /// drained.
    fn remove(&self, name: &str) -> io::Result<()>;

    /// Clears the backend of all objects.
    fn remove_all(&self) -> io::Result<()>;

    fn access_times(&self, name: &str) -> io::Result<AccessTimes>;

    fn size(&self, name: &str) -> io::Result<u64>;
}
