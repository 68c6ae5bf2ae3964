use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return millisecond since epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Epoch millisecond `ttl` from now, saturating instead of overflowing
pub(crate) fn millis_after(ttl: Duration) -> u64 {
    now_millis().saturating_add(ttl.as_millis().min(u64::MAX as u128) as u64)
}
