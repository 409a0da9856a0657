//! Cooperative shutdown via a process-wide flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity of [`sleep_unless_shutdown`] polling
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Set by the SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Sleep for `total`, waking early on shutdown.
///
/// Returns `false` if shutdown was requested before the time elapsed.
pub fn sleep_unless_shutdown(total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if is_shutdown_requested() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
