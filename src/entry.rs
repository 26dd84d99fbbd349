//! The per-key stream entry and the handles it issues.
//!
//! An [`Entry`] owns the synchronisation state for one key: the broadcaster
//! readers and the writer rendezvous on, and the bookkeeping that tells
//! eviction whether the stream is still in use. The actual bytes live in the
//! storage backend; handles carry their own backend file object.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::sync::{Broadcaster, WaitGroup};

pub(crate) struct Entry {
    /// Opaque backend handle: the filename for the disk backend, the key
    /// itself for the memory backend.
    name: String,
    /// Outstanding read handles, plus one while the writer is open.
    open_handles: AtomicI64,
    in_use: WaitGroup,
    broadcaster: Broadcaster,
}

impl Entry {
    /// A fresh entry whose writer is about to be handed out. The writer's
    /// reference is registered here so the stream counts as in use until
    /// [`Writer::close`] runs.
    pub(crate) fn new(name: String) -> Arc<Entry> {
        let entry = Arc::new(Entry {
            name,
            open_handles: AtomicI64::new(0),
            in_use: WaitGroup::default(),
            broadcaster: Broadcaster::new(),
        });
        entry.acquire();
        entry
    }

    /// An entry materialised from storage on reload: no writer, broadcaster
    /// pre-closed, readers see the frozen content.
    pub(crate) fn reloaded(name: String) -> Arc<Entry> {
        Arc::new(Entry {
            name,
            open_handles: AtomicI64::new(0),
            in_use: WaitGroup::default(),
            broadcaster: Broadcaster::closed(),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn in_use(&self) -> bool {
        self.open_handles.load(Ordering::Acquire) > 0
    }

    /// Blocks until no handle remains open.
    pub(crate) fn wait_unused(&self) {
        self.in_use.wait();
    }

    pub(crate) fn acquire(&self) {
        self.open_handles.fetch_add(1, Ordering::AcqRel);
        self.in_use.join();
    }

    fn release(&self) {
        self.open_handles.fetch_sub(1, Ordering::AcqRel);
        self.in_use.leave();
    }
}

/// The exclusive write side of a stream.
///
/// At most one writer ever exists per key. Every `write` lands in the backend
/// and wakes readers parked at end-of-buffer; [`close`](Writer::close) seals
/// the stream so readers observe end-of-file once they drain it. Dropping the
/// writer closes it.
pub struct Writer {
    entry: Arc<Entry>,
    sink: Option<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer").finish_non_exhaustive()
    }
}

impl Writer {
    pub(crate) fn new(entry: Arc<Entry>, sink: Box<dyn Write + Send>) -> Writer {
        Writer {
            entry,
            sink: Some(sink),
        }
    }

    /// Flushes the backend and seals the stream.
    ///
    /// Parked readers wake and observe end-of-file once they reach the written
    /// length. Closing twice is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        let flushed = {
            let _exclusive = self.entry.broadcaster.write_guard();
            sink.flush()
        };
        drop(sink);
        self.entry.broadcaster.close();
        self.entry.release();
        flushed
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stream writer is closed",
            ));
        };
        let written = {
            let _exclusive = self.entry.broadcaster.write_guard();
            sink.write(buf)
        };
        // Wake parked readers even on failure so they re-read and surface the
        // backend state instead of sleeping forever.
        self.entry.broadcaster.notify();
        written
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => {
                let _exclusive = self.entry.broadcaster.write_guard();
                sink.flush()
            }
            None => Ok(()),
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A read handle on a stream.
///
/// Reads block at end-of-buffer while the writer is still producing and resume
/// when it appends or closes; once the stream is sealed, reaching the written
/// length is a normal end-of-file (`Ok(0)`). Dropping the reader closes it.
pub struct Reader {
    entry: Arc<Entry>,
    source: Option<Box<dyn Read + Send>>,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader").finish_non_exhaustive()
    }
}

impl Reader {
    /// Wraps a freshly opened backend read handle. The caller must have
    /// already registered the handle via [`Entry::acquire`].
    pub(crate) fn new(entry: Arc<Entry>, source: Box<dyn Read + Send>) -> Reader {
        Reader {
            entry,
            source: Some(source),
        }
    }

    /// Releases this handle, letting a pending `remove` proceed once the last
    /// one is gone. Closing twice is a no-op, and closing never fails the
    /// backend.
    pub fn close(&mut self) -> io::Result<()> {
        if self.source.take().is_some() {
            self.entry.release();
        }
        Ok(())
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(source) = self.source.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stream reader is closed",
            ));
        };
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let seen = self.entry.broadcaster.epoch();
            let (read, open) = {
                let _shared = self.entry.broadcaster.read_guard();
                let read = source.read(buf);
                // Sampled under the shared lock: no append can interleave, so
                // "zero bytes and closed" is a true end-of-file.
                (read, self.entry.broadcaster.is_open())
            };
            match read {
                Ok(0) if open => self.entry.broadcaster.wait(seen),
                other => return other,
            }
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    /// An append-only shared buffer standing in for a backend object.
    mod buffer {
        use std::io::{self, Read, Write};
        use std::sync::Arc;

        use parking_lot::RwLock;

        #[derive(Default)]
        pub(super) struct Shared(Arc<RwLock<Vec<u8>>>);

        impl Shared {
            pub(super) fn writer(&self) -> Box<dyn Write + Send> {
                Box::new(Sink(Arc::clone(&self.0)))
            }

            pub(super) fn reader(&self) -> Box<dyn Read + Send> {
                Box::new(Source {
                    data: Arc::clone(&self.0),
                    pos: 0,
                })
            }
        }

        struct Sink(Arc<RwLock<Vec<u8>>>);

        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.write().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        struct Source {
            data: Arc<RwLock<Vec<u8>>>,
            pos: usize,
        }

        impl Read for Source {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let data = self.data.read();
                if self.pos >= data.len() {
                    return Ok(0);
                }
                let n = buf.len().min(data.len() - self.pos);
                buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
                self.pos += n;
                Ok(n)
            }
        }
    }

    fn stream() -> (buffer::Shared, Arc<Entry>) {
        (buffer::Shared::default(), Entry::new("test".into()))
    }

    fn open_reader(backing: &buffer::Shared, entry: &Arc<Entry>) -> Reader {
        entry.acquire();
        Reader::new(Arc::clone(entry), backing.reader())
    }

    #[test]
    fn reader_blocks_until_write_then_close() {
        let (backing, entry) = stream();
        let mut writer = Writer::new(Arc::clone(&entry), backing.writer());
        let mut reader = open_reader(&backing, &entry);

        let producer = thread::spawn(move || {
            writer.write_all(b"hello").unwrap();
            thread::sleep(Duration::from_millis(100));
            writer.write_all(b"world").unwrap();
            writer.close().unwrap();
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        producer.join().unwrap();

        assert_eq!(out, b"helloworld");
    }

    #[test]
    fn late_reader_sees_frozen_content() {
        let (backing, entry) = stream();
        let mut writer = Writer::new(Arc::clone(&entry), backing.writer());
        writer.write_all(b"payload").unwrap();
        writer.close().unwrap();

        let mut reader = open_reader(&backing, &entry);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn double_close_is_a_no_op() {
        let (backing, entry) = stream();
        let mut writer = Writer::new(Arc::clone(&entry), backing.writer());
        let mut reader = open_reader(&backing, &entry);

        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.write(b"x").is_err());

        reader.close().unwrap();
        reader.close().unwrap();
        assert!(!entry.in_use());
    }

    #[test]
    fn in_use_tracks_open_handles() {
        let (backing, entry) = stream();
        let mut writer = Writer::new(Arc::clone(&entry), backing.writer());
        assert!(entry.in_use());

        let mut reader = open_reader(&backing, &entry);
        writer.close().unwrap();
        assert!(entry.in_use());

        reader.close().unwrap();
        assert!(!entry.in_use());
        // No handles left: a pending removal would not block.
        entry.wait_unused();
    }

    #[test]
    fn dropping_handles_releases_them() {
        let (backing, entry) = stream();
        let writer = Writer::new(Arc::clone(&entry), backing.writer());
        let reader = open_reader(&backing, &entry);

        drop(writer);
        drop(reader);
        assert!(!entry.in_use());
    }
}
