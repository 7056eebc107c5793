use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MILLIS_PER_MINUTE: u64 = 60_000;

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Whole minutes between two millisecond timestamps, zero if `then` is in the future
pub fn elapsed_minutes(then: u64, now: u64) -> u64 {
    now.saturating_sub(then) / MILLIS_PER_MINUTE
}

// Duration as whole milliseconds, saturating at u64::MAX
pub fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
