//! Wall-clock helper.
//!
//! Message ordering and presence liveness use millisecond Unix timestamps
//! on the wire, so everything that needs "now" goes through this one
//! function.

use chrono::Utc;

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
