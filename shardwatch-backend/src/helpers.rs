use chrono::{DateTime, TimeDelta, Utc};

/// Short human form of the time since `then`, e.g. "42s ago" or "3h 5m ago".
///
/// Times in the future (clock skew) read as "just now".
pub fn format_elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let elapsed = now.signed_duration_since(then);
  if elapsed < TimeDelta::seconds(1) {
    return "just now".to_string();
  }

  let secs = elapsed.num_seconds();
  let (days, hours, mins) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60);
  if days > 0 {
    format!("{days}d {hours}h ago")
  } else if hours > 0 {
    format!("{hours}h {mins}m ago")
  } else if mins > 0 {
    format!("{mins}m {}s ago", secs % 60)
  } else {
    format!("{secs}s ago")
  }
}
