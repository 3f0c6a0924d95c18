use chrono::Utc;

/// Current wall-clock time as fractional seconds since the Unix epoch.
///
/// Session timestamps are stored in this form; `0.0` is reserved to mean
/// "not set".
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
