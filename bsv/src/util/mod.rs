use std::time::{SystemTime, UNIX_EPOCH};

/// Gets the time in seconds since UNIX_EPOCH, as an i64.
///
/// A clock set before the epoch reads as zero.
pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Gets the time in seconds since UNIX_EPOCH, as an u32. Block header timestamps use this form.
pub fn epoch_secs_u32() -> u32 {
    epoch_secs().clamp(0, u32::MAX as i64) as u32
}
