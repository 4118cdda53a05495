//! Cooperative memory backoff for the single-threaded sweep.

use std::sync::{Mutex, OnceLock};
use std::thread::sleep;
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

/// Below this available/total fraction the sweep starts yielding.
pub const LOW_MEMORY_THRESHOLD: f64 = 0.10;

const REFRESH_EVERY: Duration = Duration::from_millis(500);
const NAP: Duration = Duration::from_millis(25);
const MAX_CHECKPOINT_NAPS: u32 = 40;

struct Watch {
    sys: System,
    refreshed: Instant,
    available: f64,
}

static WATCH: OnceLock<Mutex<Watch>> = OnceLock::new();

/// Available/total RAM in `0.0..=1.0`, refreshed at most every 500ms.
pub fn available_memory_fraction() -> f64 {
    let cell = WATCH.get_or_init(|| {
        Mutex::new(Watch { sys: System::new(), refreshed: Instant::now() - REFRESH_EVERY * 2, available: 1.0 })
    });
    // poisoned only if a refresh panicked; last reading is still fine
    let mut w = cell.lock().unwrap_or_else(|p| p.into_inner());
    if w.refreshed.elapsed() >= REFRESH_EVERY {
        w.sys.refresh_memory();
        let total = w.sys.total_memory() as f64;
        w.available = if total > 0.0 { (w.sys.available_memory() as f64 / total).clamp(0.0, 1.0) } else { 1.0 };
        w.refreshed = Instant::now();
    }
    w.available
}

pub fn is_low_memory(threshold: f64) -> bool {
    available_memory_fraction() < threshold
}

/// Per-record yield while memory is tight.
pub fn maybe_throttle_low_memory(threshold: f64) {
    if is_low_memory(threshold) {
        sleep(NAP);
    }
}

/// Between windows: the previous window's buffers are gone, give the allocator
/// up to a second to return memory before the next query starts.
pub fn window_checkpoint(label: &str, threshold: f64) {
    let mut naps = 0u32;
    while naps < MAX_CHECKPOINT_NAPS && is_low_memory(threshold) {
        sleep(NAP);
        naps += 1;
    }
    if naps > 0 {
        tracing::info!(window = label, available = available_memory_fraction(), naps, "waited for memory");
    } else {
        tracing::debug!(window = label, "memory checkpoint");
    }
}
