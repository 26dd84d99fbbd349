//! In-memory storage, mostly useful for tests and short-lived processes.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use super::{AccessTimes, Backend, NewStream, ReloadedStream};

/// A process-local table of named byte buffers.
///
/// Names are the keys themselves. Nothing survives the process; `reload`
/// finds nothing. Access times are tracked manually: last-write is set at
/// creation, last-read on every open.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: RwLock<HashMap<String, Arc<MemoryFile>>>,
}

#[derive(Debug)]
struct MemoryFile {
    data: RwLock<Vec<u8>>,
    times: Mutex<AccessTimes>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    fn lookup(&self, name: &str) -> io::Result<Arc<MemoryFile>> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such stream"))
    }
}

impl Backend for MemoryBackend {
    fn reload(&self) -> io::Result<Vec<ReloadedStream>> {
        Ok(Vec::new())
    }

    fn create(&self, key: &str) -> io::Result<NewStream> {
        let mut files = self.files.write();
        if files.contains_key(key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "stream already exists",
            ));
        }
        let now = SystemTime::now();
        let file = Arc::new(MemoryFile {
            data: RwLock::new(Vec::new()),
            times: Mutex::new(AccessTimes {
                last_read: now,
                last_write: now,
            }),
        });
        files.insert(key.to_owned(), Arc::clone(&file));
        Ok(NewStream {
            name: key.to_owned(),
            writer: Box::new(MemoryWriter { file }),
        })
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = self.lookup(name)?;
        file.times.lock().last_read = SystemTime::now();
        Ok(Box::new(MemoryReader { file, pos: 0 }))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.files.write().remove(name);
        Ok(())
    }

    fn remove_all(&self) -> io::Result<()> {
        self.files.write().clear();
        Ok(())
    }

    fn access_times(&self, name: &str) -> io::Result<AccessTimes> {
        Ok(*self.lookup(name)?.times.lock())
    }

    fn size(&self, name: &str) -> io::Result<u64> {
        Ok(self.lookup(name)?.data.read().len() as u64)
    }
}

struct MemoryWriter {
    file: Arc<MemoryFile>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.is_empty() {
            self.file.data.write().extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct MemoryReader {
    file: Arc<MemoryFile>,
    /// Cursor private to this handle; the buffer is shared.
    pos: usize,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.file.data.read();
        if self.pos >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - self.pos);
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
