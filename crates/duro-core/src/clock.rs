//! Wall-clock access, isolated so the rest of the engine never calls
//! `SystemTime` directly.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_epoch_s() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}
