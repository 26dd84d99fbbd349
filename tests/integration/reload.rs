use std::io::{Read, Write};

use anyhow::Result;
use streamcache::Cache;

fn write_and_seal(cache: &Cache, key: &str, content: &[u8]) -> Result<()> {
    let (reader, writer) = cache.get(key)?;
    let mut writer = writer.expect("stream should be fresh");
    writer.write_all(content)?;
    writer.close()?;
    drop(reader);
    Ok(())
}

fn read_all(cache: &Cache, key: &str) -> Result<Vec<u8>> {
    let (mut reader, writer) = cache.get(key)?;
    assert!(writer.is_none(), "reloaded streams must not yield a writer");
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

#[test]
fn persisted_streams_survive_reconstruction() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let cache = Cache::new(dir.path(), 0o700, None)?;
    write_and_seal(&cache, "stream", b"hello world\n")?;
    drop(cache);

    let cache = Cache::new(dir.path(), 0o700, None)?;
    assert!(cache.exists("stream"));
    assert_eq!(read_all(&cache, "stream")?, b"hello world\n");

    cache.remove("stream")?;
    assert!(!cache.exists("stream"));
    Ok(())
}

#[test]
fn long_keys_round_trip_through_the_sidecar() -> Result<()> {
    // Far past the short-name bound, so the filename carries only a digest
    // and the key itself must come back from the sidecar on reload.
    let key = "0123456789 ".repeat(20);
    let dir = tempfile::tempdir()?;

    let cache = Cache::new(dir.path(), 0o700, None)?;
    write_and_seal(&cache, &key, b"payload")?;
    drop(cache);

    let cache = Cache::new(dir.path(), 0o700, None)?;
    assert!(cache.exists(&key));
    assert_eq!(read_all(&cache, &key)?, b"payload");
    Ok(())
}

#[test]
fn foreign_files_are_cleared_on_reload() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let cache = Cache::new(dir.path(), 0o700, None)?;
    write_and_seal(&cache, "keep", b"kept")?;
    drop(cache);

    std::fs::write(dir.path().join("not-a-stream"), b"junk")?;

    let cache = Cache::new(dir.path(), 0o700, None)?;
    assert!(cache.exists("keep"));
    assert!(!cache.exists("not-a-stream"));
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}
