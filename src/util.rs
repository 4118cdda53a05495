use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install the fmt subscriber once per process. Honours `RUST_LOG` (default `info`).
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

// -------- file operations with backoff (Windows/NAS friendly) --------

/// Transient errors seen on Windows when AV/backup filter drivers or
/// sharing violations hold a file for a moment.
fn is_retriable_io_error(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        // access denied, sharing/lock violation, AV block, device gone/not ready,
        // volume altered, I/O device error, user-mapped section open
        Some(5) | Some(32) | Some(33) | Some(225) | Some(433) | Some(1006) | Some(1117) | Some(1224) | Some(21)
    )
}

/// Run `op` up to `tries` times, sleeping `delay_ms * attempt` after each retriable failure.
fn with_backoff<T>(tries: usize, delay_ms: u64, what: &str, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, format!("{} failed", what))))
}

pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, "open", || File::open(path))
}

pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, "create", || File::create(path))
}

/// Remove a file; succeeds if it does not exist.
pub fn remove_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> Result<()> {
    with_backoff(tries, delay_ms, "remove", || match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    })
    .with_context(|| format!("remove {}", path.display()))
}

/// Replace `dest` with `tmp`. A direct rename swaps `dest` atomically where the
/// platform allows renaming over an existing file. If that is refused, `dest` is
/// removed and the rename retried, then copy+remove is the last resort (e.g. across
/// volumes). Neither fallback is atomic.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    let tries = 20usize;
    let delay_ms = 50u64;
    if with_backoff(tries, delay_ms, "rename", || fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    if dest.exists() {
        remove_with_backoff(dest, tries, delay_ms)?;
        if with_backoff(tries, delay_ms, "rename", || fs::rename(tmp, dest)).is_ok() {
            return Ok(());
        }
    }
    tracing::debug!(tmp = %tmp.display(), dest = %dest.display(), "rename refused; copying");
    with_backoff(tries, delay_ms, "copy", || fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    remove_with_backoff(tmp, tries, delay_ms)
}
