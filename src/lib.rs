//! # streamcache
//!
//! A streaming file cache: a concurrent-safe mapping from string keys to byte
//! streams, where each stream is written exactly once and read by many
//! consumers — including consumers that start reading *before* the writer has
//! finished. A reader that drains the buffer parks until the writer appends
//! more bytes or seals the stream; it never observes partial corruption, and
//! the bytes it sees are always a prefix of the bytes written.
//!
//! ## Layers
//!
//! - [`Cache`] is the entry point: `get` / `exists` / `remove` / `clean` over
//!   a key→stream map with single-flight creation, so concurrent `get`s of a
//!   missing key produce exactly one [`Writer`] between them.
//! - Every stream lives in a storage [`Backend`]. [`DiskBackend`] keeps one
//!   file per stream under a directory and survives restarts: on
//!   construction the cache reloads whatever the directory holds, resolving
//!   duplicates left behind by interrupted writes. [`MemoryBackend`] keeps
//!   everything in process memory. Custom backends implement the same trait.
//! - An optional [`Haunter`] expires streams on a background thread, by age
//!   ([`Reaper`]), by count/size quota with least-recently-read victims
//!   ([`Janitor`]), or several of these combined. Eviction never touches a
//!   stream while any handle on it is open. [`EvictionConfig`] builds a
//!   haunter from a serde-friendly description.
//!
//! ## Example
//!
//! ```
//! use std::io::{Read, Write};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = streamcache::Cache::with_backend(streamcache::MemoryBackend::new(), None)?;
//!
//! // First get creates the stream and yields its only writer.
//! let (mut reader, writer) = cache.get("motd")?;
//! let mut writer = writer.expect("fresh stream");
//!
//! // A second consumer can start reading immediately; it will block at
//! // end-of-buffer until the writer catches up or closes.
//! let (mut late_reader, _) = cache.get("motd")?;
//!
//! writer.write_all(b"hello world")?;
//! writer.close()?;
//!
//! let mut seen = String::new();
//! reader.read_to_string(&mut seen)?;
//! late_reader.read_to_string(&mut String::new())?;
//! assert_eq!(seen, "hello world");
//! # Ok(())
//! # }
//! ```

mod backend;
mod cache;
mod config;
mod entry;
mod error;
mod haunt;
mod sync;

pub use backend::{AccessTimes, Backend, DiskBackend, MemoryBackend, NewStream, ReloadedStream};
pub use cache::Cache;
pub use config::EvictionConfig;
pub use entry::{Reader, Writer};
pub use error::CacheError;
pub use haunt::{Haunter, Janitor, Reaper};
