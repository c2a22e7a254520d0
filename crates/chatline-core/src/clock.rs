use chrono::{DateTime, Utc};

/// Current time truncated to millisecond precision, which is what the wire
/// format and the store keep. Values survive a JSON roundtrip unchanged.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
