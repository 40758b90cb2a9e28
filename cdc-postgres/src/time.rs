use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of seconds between Unix epoch (1970-01-01) and Postgres epoch (2000-01-01).
const POSTGRES_EPOCH_OFFSET_SECONDS: u64 = 946_684_800;

/// Postgres epoch (2000-01-01 00:00:00 UTC) for timestamp calculations.
pub static POSTGRES_EPOCH: LazyLock<SystemTime> =
    LazyLock::new(|| UNIX_EPOCH + Duration::from_secs(POSTGRES_EPOCH_OFFSET_SECONDS));

/// Returns the number of microseconds elapsed since the Postgres epoch.
///
/// This is the timestamp format expected in standby status update messages. A clock set
/// before the Postgres epoch yields `0`.
pub fn postgres_now_micros() -> i64 {
    SystemTime::now()
        .duration_since(*POSTGRES_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_postgres_epoch() {
        // 2020-01-01 expressed in microseconds since 2000-01-01.
        assert!(postgres_now_micros() > 631_152_000_000_000);
    }
}
