//! Synchronisation primitives for a single stream.
//!
//! A [`Broadcaster`] combines the reader/writer lock guarding the backing
//! object, the one-shot closed flag, and the wait/notify rendezvous readers
//! park on at end-of-buffer. A [`WaitGroup`] lets `remove` block until every
//! outstanding handle has been closed.

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct BroadcastState {
    /// Bumped on every notify and on close. A waiter that captured a stale
    /// epoch before parking returns immediately instead of sleeping through
    /// the notification it raced.
    epoch: u64,
    closed: bool,
}

/// The per-stream signal hub.
///
/// The writer holds the exclusive side of [`guard`](Self::write_guard) for the
/// duration of each append; readers hold the shared side for the duration of
/// each read. While a reader holds the shared side, neither new bytes can
/// appear nor can the closed flag change what has already been observed, which
/// is what makes "read zero bytes while closed" a true end-of-stream.
#[derive(Debug)]
pub(crate) struct Broadcaster {
    data: RwLock<()>,
    state: Mutex<BroadcastState>,
    wakeup: Condvar,
}

impl Broadcaster {
    pub(crate) fn new() -> Self {
        Broadcaster {
            data: RwLock::new(()),
            state: Mutex::new(BroadcastState::default()),
            wakeup: Condvar::new(),
        }
    }

    /// A broadcaster that is already closed, for streams materialised from
    /// storage on reload. Their content is frozen and readers never park.
    pub(crate) fn closed() -> Self {
        let broadcaster = Self::new();
        broadcaster.state.lock().closed = true;
        broadcaster
    }

    pub(crate) fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.data.read()
    }

    pub(crate) fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.data.write()
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.state.lock().closed
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Wakes all parked readers after an append.
    pub(crate) fn notify(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        self.wakeup.notify_all();
    }

    /// Seals the stream. One-shot: the flag never reopens, and every parked or
    /// future waiter returns immediately.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.epoch = state.epoch.wrapping_add(1);
        self.wakeup.notify_all();
    }

    /// Parks until the next notify or close.
    ///
    /// `seen` is the epoch the caller observed before its last read attempt;
    /// if anything happened since, this returns without sleeping. Callers must
    /// not hold the data lock and must tolerate spurious wakeups by
    /// re-reading.
    pub(crate) fn wait(&self, seen: u64) {
        let mut state = self.state.lock();
        if state.closed || state.epoch != seen {
            return;
        }
        self.wakeup.wait(&mut state);
    }
}

/// Counts outstanding handles on a stream and lets removal wait for zero.
#[derive(Debug, Default)]
pub(crate) struct WaitGroup {
    count: Mutex<usize>,
    drained: Condvar,
}

impl WaitGroup {
    pub(crate) fn join(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn leave(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "unbalanced WaitGroup::leave");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    /// Blocks until the count reaches zero. Returns immediately if nothing has
    /// joined.
    pub(crate) fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait(&mut count);
        }
    }
}
