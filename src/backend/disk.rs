//! On-disk storage: one file per stream under a root directory.

use std::collections::{hash_map, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use filetime::FileTime;

use super::name::{self, DecodedName, SIDECAR_SUFFIX};
use super::{AccessTimes, Backend, NewStream, ReloadedStream};

/// Stores each stream as a salted file under `root`, as described in the
/// module docs of [`name`](super::name).
///
/// The directory may contain leftovers from interrupted writes; `reload`
/// keeps the newest file per key and deletes the rest, along with anything it
/// cannot decode. Last-read time is the filesystem access time, last-write
/// the modification time. Pointing two processes at one directory is not
/// supported.
#[derive(Debug)]
pub struct DiskBackend {
    root: PathBuf,
    mode: u32,
}

impl DiskBackend {
    /// Opens a backend rooted at `dir`, creating the directory if missing.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<DiskBackend> {
        Self::with_mode(dir, 0o700)
    }

    /// Like [`new`](Self::new), with explicit unix permissions for created
    /// directories. The mode is ignored on other platforms.
    pub fn with_mode(dir: impl AsRef<Path>, mode: u32) -> io::Result<DiskBackend> {
        let backend = DiskBackend {
            root: dir.as_ref().to_path_buf(),
            mode,
        };
        backend.init()?;
        Ok(backend)
    }

    fn init(&self) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .recursive(true)
                .mode(self.mode)
                .create(&self.root)
        }
        #[cfg(not(unix))]
        {
            let _ = self.mode;
            fs::create_dir_all(&self.root)
        }
    }

    fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    fn sidecar_of(&self, file_name: &str) -> PathBuf {
        self.root.join(format!("{file_name}{SIDECAR_SUFFIX}"))
    }

    /// Recovers the key a stream file was created under.
    fn key_of(&self, file_name: &str) -> io::Result<String> {
        match name::decode(file_name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        {
            DecodedName::Key(key) => Ok(key),
            DecodedName::FromSidecar => fs::read_to_string(self.sidecar_of(file_name)),
        }
    }

    /// Deletes a stream file and its sidecar, if any. A missing sidecar is
    /// not an error; neither is a file already gone.
    fn delete(&self, file_name: &str) -> io::Result<()> {
        let _ = fs::remove_file(self.sidecar_of(file_name));
        match fs::remove_file(self.path_of(file_name)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn discard(&self, file_name: &str, reason: &dyn std::fmt::Display) {
        tracing::warn!(file = file_name, %reason, "removing unusable cache file");
        if let Err(e) = self.delete(file_name) {
            tracing::error!(
                error = &e as &dyn std::error::Error,
                file = file_name,
                "failed to remove unusable cache file",
            );
        }
    }
}

impl Backend for DiskBackend {
    fn reload(&self) -> io::Result<Vec<ReloadedStream>> {
        // Newest file per key wins; everything else is deleted as a leftover
        // from an interrupted write.
        let mut newest: HashMap<String, (String, SystemTime)> = HashMap::new();

        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_file() {
                continue;
            }
            let Ok(file_name) = dirent.file_name().into_string() else {
                continue;
            };
            if name::is_sidecar(&file_name) {
                continue;
            }
            let key = match self.key_of(&file_name) {
                Ok(key) => key,
                Err(e) => {
                    self.discard(&file_name, &e);
                    continue;
                }
            };
            let mtime = dirent.metadata()?.modified()?;

            match newest.entry(key) {
                hash_map::Entry::Vacant(slot) => {
                    slot.insert((file_name, mtime));
                }
                hash_map::Entry::Occupied(mut slot) => {
                    if slot.get().1 < mtime {
                        let (stale, _) = slot.insert((file_name, mtime));
                        self.discard(&stale, &"older duplicate");
                    } else {
                        self.discard(&file_name, &"older duplicate");
                    }
                }
            }
        }

        Ok(newest
            .into_iter()
            .map(|(key, (name, _))| ReloadedStream { key, name })
            .collect())
    }

    fn create(&self, key: &str) -> io::Result<NewStream> {
        let encoded = name::encode(key);
        if encoded.needs_sidecar {
            fs::write(self.sidecar_of(&encoded.name), key)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path_of(&encoded.name))?;
        Ok(NewStream {
            name: encoded.name,
            writer: Box::new(file),
        })
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.path_of(name))?;
        Ok(Box::new(file))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.delete(name)
    }

    fn remove_all(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            other => other?,
        }
        self.init()
    }

    fn access_times(&self, name: &str) -> io::Result<AccessTimes> {
        let meta = fs::metadata(self.path_of(name))?;
        Ok(AccessTimes {
            last_read: as_system_time(FileTime::from_last_access_time(&meta)),
            last_write: as_system_time(FileTime::from_last_modification_time(&meta)),
        })
    }

    fn size(&self, name: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.path_of(name))?.len())
    }
}

fn as_system_time(time: FileTime) -> SystemTime {
    let seconds = time.unix_seconds();
    if seconds >= 0 {
        UNIX_EPOCH + Duration::new(seconds as u64, time.nanoseconds())
    } else {
        // Pre-epoch timestamps, truncated to the second.
        UNIX_EPOCH - Duration::from_secs(seconds.unsigned_abs())
    }
}
