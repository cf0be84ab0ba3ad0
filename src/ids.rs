use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

static PROCESS_START_SID: Lazy<String> = Lazy::new(|| {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    to_base36(secs)
});

static DOWNLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 digits are ascii")
}

/// Returns a new `"<SID>:<n>"` download id: `SID` is a base-36 encoding of
/// the process start time, `n` a process-wide monotonic counter. Purely for
/// log correlation, never parsed back or used as a cache key.
pub fn next_download_id() -> String {
    let n = DOWNLOAD_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}:{}", *PROCESS_START_SID, n)
}

/// Current wall-clock time; used for negative-cache timestamps and as the
/// publish-time fallback when an upstream response omits `Last-Modified`.
pub fn now() -> SystemTime {
    SystemTime::now()
}
