// ABOUTME: Persistence for the smoothed output-latency estimate
// ABOUTME: One floating-point microsecond value keyed by a session namespace

use std::path::PathBuf;

/// Store for the smoothed output latency, so the first scheduling pass after
/// a reconnect starts from a plausible value. Keys are session-scoped so
/// multiple sessions in one process do not clobber each other.
pub trait LatencyStore {
    /// Load the persisted value for `key`, if any.
    fn load(&self, key: &str) -> Option<f64>;
    /// Persist `value` under `key`. Failures are non-fatal.
    fn store(&self, key: &str, value: f64);
}

/// Store that remembers nothing.
#[derive(Debug, Default)]
pub struct NullLatencyStore;

impl LatencyStore for NullLatencyStore {
    fn load(&self, _key: &str) -> Option<f64> {
        None
    }

    fn store(&self, _key: &str, _value: f64) {}
}

/// File-backed store: one small text file per key under a directory.
#[derive(Debug)]
pub struct FileLatencyStore {
    dir: PathBuf,
}

impl FileLatencyStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys may carry separators from the namespace; flatten them.
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(name)
    }
}

impl LatencyStore for FileLatencyStore {
    fn load(&self, key: &str) -> Option<f64> {
        let text = std::fs::read_to_string(self.path_for(key)).ok()?;
        text.trim().parse().ok()
    }

    fn store(&self, key: &str, value: f64) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            log::warn!("latency store: cannot create {:?}: {}", self.dir, e);
            return;
        }
        if let Err(e) = std::fs::write(self.path_for(key), format!("{value}\n")) {
            log::warn!("latency store: write failed for {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_store_returns_nothing() {
        let store = NullLatencyStore;
        store.store("a", 1.0);
        assert!(store.load("a").is_none());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = std::env::temp_dir().join("sendspin-latency-test");
        let store = FileLatencyStore::new(&dir);
        store.store("output-latency:player-1", 12_345.5);
        assert_eq!(store.load("output-latency:player-1"), Some(12_345.5));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
