use std::time::{SystemTime, UNIX_EPOCH};
use chrono::Local;

/// Wall-clock label shown next to received messages and monitor points.
pub fn now_label() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_millis() as u64
}
