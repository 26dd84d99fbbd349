use std::io::{Read, Write};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use streamcache::{Cache, MemoryBackend};

#[test]
fn reader_streams_while_writer_produces() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = Cache::new(dir.path(), 0o700, None)?;

    let (reader, writer) = cache.get("stream")?;
    let mut writer = writer.expect("fresh stream should yield the writer");
    drop(reader);

    let producer = thread::spawn(move || -> Result<()> {
        writer.write_all(b"hello")?;
        thread::sleep(Duration::from_millis(100));
        writer.write_all(b"world")?;
        writer.close()?;
        Ok(())
    });

    // This reader starts while the writer is mid-stream and must see the
    // whole payload.
    let (mut reader, writer) = cache.get("stream")?;
    assert!(writer.is_none());

    let mut seen = String::new();
    reader.read_to_string(&mut seen)?;
    assert_eq!(seen, "helloworld");

    producer.join().unwrap()?;
    Ok(())
}

#[test]
fn concurrent_gets_share_one_writer() -> Result<()> {
    let cache = Cache::with_backend(MemoryBackend::new(), None)?;
    let barrier = Arc::new(Barrier::new(3));

    let mut fetchers = Vec::new();
    for _ in 0..3 {
        let cache = cache.clone();
        let barrier = Arc::clone(&barrier);
        fetchers.push(thread::spawn(move || {
            barrier.wait();
            cache.get("fresh").unwrap()
        }));
    }

    let mut readers = Vec::new();
    let mut writers = Vec::new();
    for fetcher in fetchers {
        let (reader, writer) = fetcher.join().unwrap();
        readers.push(reader);
        writers.extend(writer);
    }
    assert_eq!(writers.len(), 1, "exactly one get may create the stream");

    let mut writer = writers.pop().unwrap();
    writer.write_all(b"hello world\n")?;
    writer.close()?;

    for mut reader in readers {
        let mut seen = String::new();
        reader.read_to_string(&mut seen)?;
        assert_eq!(seen, "hello world\n");
    }
    Ok(())
}

#[test]
fn remove_while_reading_lets_the_reader_finish() -> Result<()> {
    const PAYLOAD: usize = 1024 * 1024;

    let dir = tempfile::tempdir()?;
    let cache = Cache::new(dir.path(), 0o700, None)?;

    let (mut reader, writer) = cache.get("large")?;
    let mut writer = writer.expect("fresh stream should yield the writer");
    let payload = vec![0xA5u8; PAYLOAD];
    writer.write_all(&payload)?;
    writer.close()?;

    let mut head = vec![0u8; 100 * 1024];
    reader.read_exact(&mut head)?;

    // Remove blocks on our open reader; the unbinding itself is immediate.
    let remover = {
        let cache = cache.clone();
        thread::spawn(move || cache.remove("large").unwrap())
    };
    while cache.exists("large") {
        thread::sleep(Duration::from_millis(1));
    }

    let mut tail = Vec::new();
    reader.read_to_end(&mut tail)?;
    assert_eq!(head.len() + tail.len(), PAYLOAD);
    assert!(head.iter().chain(tail.iter()).all(|&b| b == 0xA5));

    reader.close()?;
    remover.join().unwrap();

    assert_eq!(
        std::fs::read_dir(dir.path())?.count(),
        0,
        "backing file should be gone once the reader closed",
    );
    Ok(())
}
