use chrono::{DateTime, TimeZone, Utc};

/// Decode an epoch-seconds column without failing the whole row: a corrupted
/// timestamp degrades to the epoch and logs, it never blocks reads.
pub fn utc_from_epoch_seconds_lossy(ts: i64) -> DateTime<Utc> {
    if let Some(dt) = Utc.timestamp_opt(ts, 0).single() {
        return dt;
    }
    log::warn!("Invalid epoch seconds timestamp (ts={ts}); falling back to epoch");
    Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_timestamp_round_trips() {
        let now = Utc::now().timestamp();
        assert_eq!(utc_from_epoch_seconds_lossy(now).timestamp(), now);
    }

    #[test]
    fn out_of_range_timestamp_degrades_to_epoch() {
        assert_eq!(utc_from_epoch_seconds_lossy(i64::MAX).timestamp(), 0);
    }
}
