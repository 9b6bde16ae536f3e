/// Current Unix time in nanoseconds.
///
/// The engine never calls this itself: timestamps are always supplied by the
/// caller. It exists for producers that have no clock of their own.
pub fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
