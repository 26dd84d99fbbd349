use std::io;

use thiserror::Error;

/// An error surfaced by a cache operation.
///
/// Stream-level failures (a write that did not reach storage, a read hitting a
/// bad sector) travel through the [`std::io::Write`] / [`std::io::Read`]
/// implementations of the handles instead, so this enum only covers the
/// operations on the cache itself.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend refused to create a new backing object.
    ///
    /// The key was not inserted; a later `get` will retry the creation.
    #[error("failed to create stream in storage: {0}")]
    Create(io::Error),

    /// An existing stream's backing object could not be opened for reading.
    #[error("failed to open stream in storage: {0}")]
    Open(io::Error),

    /// The backing object could not be deleted.
    #[error("failed to remove stream from storage: {0}")]
    Remove(io::Error),

    /// The backend could not enumerate its stored streams at construction.
    #[error("failed to reload streams from storage: {0}")]
    Reload(io::Error),
}
