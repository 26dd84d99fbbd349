use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use streamcache::{Cache, DiskBackend, Haunter, MemoryBackend};

/// Polls `condition` until it holds or `deadline` elapses.
fn eventually(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[test]
fn reaper_waits_for_the_reader_to_close() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = Cache::with_backend(
        DiskBackend::new(dir.path())?,
        Some(Haunter::reaper(Duration::ZERO, Duration::from_millis(100))),
    )?;

    let (mut reader, writer) = cache.get("stream")?;
    let mut writer = writer.expect("fresh stream should yield the writer");
    writer.write_all(b"hello")?;
    writer.close()?;

    let mut seen = String::new();
    reader.read_to_string(&mut seen)?;
    assert_eq!(seen, "hello");

    // Several reap passes go by; the open reader keeps the stream alive.
    thread::sleep(Duration::from_millis(200));
    assert!(cache.exists("stream"), "a stream expired while in use");

    reader.close()?;
    assert!(
        eventually(Duration::from_secs(2), || !cache.exists("stream")),
        "stream should have been reaped after its reader closed",
    );
    assert!(eventually(Duration::from_secs(2), || {
        std::fs::read_dir(dir.path()).unwrap().count() == 0
    }));
    Ok(())
}

#[test]
fn janitor_keeps_the_most_recently_read_streams() -> Result<()> {
    let cache = Cache::with_backend(
        MemoryBackend::new(),
        Some(Haunter::janitor(3, 0, Duration::from_millis(400))),
    )?;

    for i in 0..5 {
        let name = format!("stream-{i}");
        let (mut reader, writer) = cache.get(&name)?;
        let mut writer = writer.expect("fresh stream should yield the writer");
        writer.write_all(b"hello")?;
        writer.close()?;
        reader.read_to_string(&mut String::new())?;

        assert!(cache.exists(&name));
        thread::sleep(Duration::from_millis(10));
        reader.close()?;
    }

    assert!(
        eventually(Duration::from_secs(2), || !cache.exists("stream-0")
            && !cache.exists("stream-1")),
        "the two oldest streams should have been scrubbed",
    );
    for i in 2..5 {
        assert!(cache.exists(&format!("stream-{i}")));
    }
    Ok(())
}
