//! The cache map: key→stream coordination.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;

use crate::backend::{AccessTimes, Backend, DiskBackend};
use crate::entry::{Entry, Reader, Writer};
use crate::error::CacheError;
use crate::haunt::Haunter;

/// How often the default reaper of [`Cache::new`] makes a pass.
const REAP_PERIOD: Duration = Duration::from_secs(3600);

/// A concurrent-safe map from string keys to byte streams.
///
/// Each stream is written exactly once and can be read by many consumers,
/// including consumers that start before the writer finishes: readers block
/// at end-of-buffer until more bytes arrive or the stream is sealed. Streams
/// are persisted through a storage [`Backend`] and optionally expired by a
/// background [`Haunter`].
///
/// `Cache` is cheap to clone; clones share the same underlying map. Dropping
/// the last clone stops the eviction thread. Outstanding [`Reader`]s and
/// [`Writer`]s stay usable after the cache itself is gone.
///
/// ```no_run
/// use std::io::{Read, Write};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = streamcache::Cache::new("./cache", 0o700, Some(Duration::from_secs(3600)))?;
///
/// let (mut reader, writer) = cache.get("greeting")?;
/// if let Some(mut writer) = writer {
///     writer.write_all(b"hello world")?;
///     writer.close()?;
/// }
///
/// let mut content = String::new();
/// reader.read_to_string(&mut content)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Cache {
    shared: Arc<Shared>,
}

struct Shared {
    backend: Box<dyn Backend>,
    streams: RwLock<HashMap<String, Arc<Entry>>>,
    /// Keeps the eviction thread's wake-up channel alive. Dropped with the
    /// last cache handle, which disconnects the channel and stops the thread.
    _haunt_stop: Option<Sender<()>>,
}

impl Cache {
    /// Opens an on-disk cache rooted at `dir`, creating the directory with
    /// the given unix `mode` if missing (the mode is ignored elsewhere).
    ///
    /// Streams already in the directory are loaded and immediately readable.
    /// With an `expiry`, a reaper drops streams not read for that long,
    /// checking once an hour; with `None` streams never expire.
    pub fn new(
        dir: impl AsRef<Path>,
        mode: u32,
        expiry: Option<Duration>,
    ) -> Result<Cache, CacheError> {
        let backend = DiskBackend::with_mode(dir, mode).map_err(CacheError::Reload)?;
        let haunter = expiry.map(|expiry| Haunter::reaper(expiry, REAP_PERIOD));
        Cache::with_backend(backend, haunter)
    }

    /// Builds a cache over any storage backend with an optional eviction
    /// schedule.
    ///
    /// The backend is asked to enumerate its stored streams; each becomes a
    /// sealed entry that readers can consume right away. The haunter makes a
    /// first pass immediately and then re-arms itself from its own cadence.
    pub fn with_backend(
        backend: impl Backend,
        haunter: Option<Haunter>,
    ) -> Result<Cache, CacheError> {
        let mut streams = HashMap::new();
        for stored in backend.reload().map_err(CacheError::Reload)? {
            streams.insert(stored.key, Entry::reloaded(stored.name));
        }
        tracing::debug!(streams = streams.len(), "cache loaded from storage");

        let (stop_tx, stop_rx) = bounded(0);
        let shared = Arc::new(Shared {
            backend: Box::new(backend),
            streams: RwLock::new(streams),
            _haunt_stop: haunter.is_some().then_some(stop_tx),
        });
        if let Some(haunter) = haunter {
            spawn_haunter(Arc::downgrade(&shared), haunter, stop_rx);
        }
        Ok(Cache { shared })
    }

    /// Looks up `key`, creating the stream if it does not exist.
    ///
    /// Always returns a fresh [`Reader`]. The [`Writer`] is returned only on
    /// the `get` that created the stream; it is the single writer that will
    /// ever exist for this key. Concurrent `get`s of a missing key produce
    /// exactly one writer between them.
    pub fn get(&self, key: &str) -> Result<(Reader, Option<Writer>), CacheError> {
        loop {
            // The map lock covers the lookup only, never backend I/O.
            let hit = self.shared.streams.read().get(key).cloned();
            if let Some(entry) = hit {
                return Ok((self.open_reader(&entry)?, None));
            }

            // Miss: build the stream without holding the map lock, then race
            // to publish it.
            let stream = match self.shared.backend.create(key) {
                Ok(stream) => stream,
                // A backend with key-derived names refuses the second of two
                // concurrent creates; the winner's binding is about to
                // appear, so go back to the hit path.
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    thread::yield_now();
                    continue;
                }
                Err(err) => return Err(CacheError::Create(err)),
            };
            let entry = Entry::new(stream.name);
            let mut writer = Writer::new(Arc::clone(&entry), stream.writer);
            let reader = match self.open_reader(&entry) {
                Ok(reader) => reader,
                Err(err) => {
                    self.discard_unpublished(key, writer, &entry);
                    return Err(err);
                }
            };

            let raced = {
                let mut streams = self.shared.streams.write();
                match streams.get(key).cloned() {
                    Some(existing) => Some(existing),
                    None => {
                        streams.insert(key.to_owned(), Arc::clone(&entry));
                        None
                    }
                }
            };
            return match raced {
                None => Ok((reader, Some(writer))),
                Some(existing) => {
                    // Another get published first; the stream we built was
                    // never visible. Drop it and read the winner's instead.
                    drop(reader);
                    self.discard_unpublished(key, writer, &entry);
                    Ok((self.open_reader(&existing)?, None))
                }
            };
        }
    }

    /// Rolls back a stream that never made it into the map: seals the writer,
    /// then takes the backing object out of storage again.
    fn discard_unpublished(&self, key: &str, mut writer: Writer, entry: &Entry) {
        let _ = writer.close();
        if let Err(e) = self.shared.backend.remove(entry.name()) {
            tracing::error!(
                error = &e as &dyn std::error::Error,
                key,
                "failed to roll back stream creation",
            );
        }
    }

    /// Whether `key` currently maps to a stream. Safe to call concurrently
    /// with `get`, though the answer may be stale by the time it returns.
    pub fn exists(&self, key: &str) -> bool {
        self.shared.streams.read().contains_key(key)
    }

    /// Deletes the stream under `key`.
    ///
    /// The key is unbound immediately: a concurrent `get` observes a miss and
    /// creates an independent stream. The backing object is deleted once
    /// every outstanding handle on the old stream has been closed, which this
    /// call blocks on. Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        let entry = self.shared.streams.write().remove(key);
        if let Some(entry) = entry {
            self.shared.delete(&entry).map_err(CacheError::Remove)?;
        }
        Ok(())
    }

    /// Empties the cache and the backend.
    ///
    /// Not safe to call while streams are being read or written: in-flight
    /// handles keep working on their already open objects, but the backing
    /// storage is cleared underneath them.
    pub fn clean(&self) -> Result<(), CacheError> {
        let mut streams = self.shared.streams.write();
        streams.clear();
        drop(streams);
        self.shared.backend.remove_all().map_err(CacheError::Remove)
    }

    fn open_reader(&self, entry: &Arc<Entry>) -> Result<Reader, CacheError> {
        let source = self
            .shared
            .backend
            .open(entry.name())
            .map_err(CacheError::Open)?;
        entry.acquire();
        Ok(Reader::new(Arc::clone(entry), source))
    }

    /// A single eviction pass, driven by tests.
    #[cfg(test)]
    fn haunt_once(&self, haunter: &Haunter) {
        haunter.haunt(&EvictionScan {
            shared: &self.shared,
        });
    }
}

impl Shared {
    /// Waits out in-flight handles, then deletes the backing object.
    fn delete(&self, entry: &Entry) -> io::Result<()> {
        entry.wait_unused();
        self.backend.remove(entry.name())
    }
}

/// What an eviction pass may see and do. Handed to [`Haunter::haunt`].
pub(crate) struct EvictionScan<'a> {
    shared: &'a Shared,
}

impl EvictionScan<'_> {
    /// Snapshot of the current key→entry bindings.
    pub(crate) fn streams(&self) -> Vec<(String, Arc<Entry>)> {
        let streams = self.shared.streams.read();
        streams
            .iter()
            .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
            .collect()
    }

    pub(crate) fn access_times(&self, name: &str) -> io::Result<AccessTimes> {
        self.shared.backend.access_times(name)
    }

    pub(crate) fn size(&self, name: &str) -> io::Result<u64> {
        self.shared.backend.size(name)
    }

    /// Removes a victim. Eviction is best-effort: failures are logged and the
    /// pass moves on.
    pub(crate) fn evict(&self, key: &str) {
        tracing::debug!(key, "evicting stream");
        let entry = self.shared.streams.write().remove(key);
        if let Some(entry) = entry {
            if let Err(e) = self.shared.delete(&entry) {
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    key,
                    "failed to remove evicted stream",
                );
            }
        }
    }
}

fn spawn_haunter(shared: Weak<Shared>, haunter: Haunter, stop: Receiver<()>) {
    thread::Builder::new()
        .name("streamcache-haunt".into())
        .spawn(move || loop {
            {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                haunter.haunt(&EvictionScan { shared: &shared });
            }
            // One-shot timer, re-armed from the policy's own cadence. The
            // channel never carries messages; it only disconnects when the
            // last cache handle goes away.
            match stop.recv_timeout(haunter.next()) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        })
        .expect("failed to spawn eviction thread");
}
