//! The four boundaries the router core is consumed through: sending and
//! receiving wire bytes, wall-clock time, randomness, and small
//! name-to-bytes persistence. Concrete transports (NTCP2/SSU2) and a real
//! on-disk store live outside this crate; these traits are what lets the
//! router talk to them without depending on their implementations.

use rand::RngCore;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hands complete, unframed messages to a remote peer and delivers
/// whatever a transport receives back into the router. `send` is
/// best-effort: the core never blocks or retries on a transport's
/// behalf, matching the "may fail silently" contract transports offer.
pub trait Transport: Send + Sync {
    fn send(&self, dest_hash: [u8; 32], messages: &[Vec<u8>]);
}

/// Wall-clock time, abstracted so tests can supply a fixed or
/// fast-forwarding clock instead of the real one.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
    fn now_millis(&self) -> u64;
}

/// A cryptographically secure source of randomness.
pub trait Csprng: Send + Sync {
    fn fill_bytes(&self, buf: &mut [u8]);

    /// A uniformly distributed value in `[lo, hi)`. Panics if `hi <= lo`.
    fn rand_in_range(&self, lo: u64, hi: u64) -> u64;
}

/// Durable storage for the local identity, the NetDB snapshot, and
/// (optionally) peer profiles. Callers name what they're saving; the
/// implementation decides where that lives on disk.
pub trait Persistence: Send + Sync {
    fn save(&self, name: &str, bytes: &[u8]) -> io::Result<()>;
    fn load(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    fn now_millis(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// [`Csprng`] backed by the `rand` crate's thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadCsprng;

impl Csprng for ThreadCsprng {
    fn fill_bytes(&self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf);
    }

    fn rand_in_range(&self, lo: u64, hi: u64) -> u64 {
        assert!(hi > lo, "rand_in_range: empty range");
        lo + rand::thread_rng().next_u64() % (hi - lo)
    }
}

/// [`Persistence`] backed by flat files under a single directory, one
/// file per named blob.
#[derive(Debug, Clone)]
pub struct FilesystemPersistence {
    root: PathBuf,
}

impl FilesystemPersistence {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Persistence for FilesystemPersistence {
    fn save(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.path_for(name), bytes)
    }

    fn load(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("garlicrouter-router-traits-test-{n}-{}", std::process::id()))
    }

    #[test]
    fn system_clock_millis_is_monotonic_with_secs() {
        let clock = SystemClock;
        let secs = clock.now_secs();
        let millis = clock.now_millis();
        assert!(millis / 1000 >= secs.saturating_sub(1));
    }

    #[test]
    fn thread_csprng_fills_distinct_buffers() {
        let csprng = ThreadCsprng;
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        csprng.fill_bytes(&mut a);
        csprng.fill_bytes(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn thread_csprng_rand_in_range_stays_in_bounds() {
        let csprng = ThreadCsprng;
        for _ in 0..50 {
            let v = csprng.rand_in_range(10, 20);
            assert!(v >= 10 && v < 20);
        }
    }

    #[test]
    fn filesystem_persistence_round_trips() {
        let dir = scratch_dir();
        let store = FilesystemPersistence::new(dir.clone());
        store.save("router.keys", b"secret bytes").unwrap();
        let loaded = store.load("router.keys").unwrap();
        assert_eq!(loaded, b"secret bytes");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn filesystem_persistence_missing_file_errors() {
        let dir = scratch_dir();
        let store = FilesystemPersistence::new(dir);
        assert!(store.load("nope").is_err());
    }
}
