//! Terminal-response counter.
//!
//! Counts requests that reached a terminal response, not requests that
//! returned usable data; the handlers bump it once per response on every
//! path. The store is injected so the handlers depend only on the trait.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

pub trait CounterStore: Send + Sync {
    fn read(&self) -> u64;
    /// Bump by one and return the new value. Implementations serialize
    /// the read-modify-write so concurrent completions never lose updates.
    fn increment(&self) -> u64;
}

/// File-backed counter. The value survives restarts; a missing or
/// unparsable file reads as 0.
pub struct FileCounter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_file(&self) -> u64 {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }
}

impl CounterStore for FileCounter {
    fn read(&self) -> u64 {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_file()
    }

    fn increment(&self) -> u64 {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let next = self.read_file() + 1;
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, next.to_string()) {
            warn!("failed to persist counter: {}", e);
        }
        next
    }
}

/// In-memory counter for tests.
#[derive(Default)]
pub struct MemoryCounter {
    value: AtomicU64,
}

impl CounterStore for MemoryCounter {
    fn read(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }
}
