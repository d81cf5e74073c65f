use super::event::CEF_TIME_FORMAT;
use chrono::{DateTime, Utc};

/// Frame a wire line for a syslog collector: `<time> <hostname> <CEF:...>`.
///
/// A line produced by [`CefEvent::wire_line`](super::CefEvent::wire_line)
/// carries its own `<time>|` prefix, which is lifted into the syslog header.
/// Lines without one are stamped with `now`.
pub fn frame_syslog_line(hostname: &str, line: &str, now: DateTime<Utc>) -> String {
    match split_time_prefix(line) {
        Some((timestamp, content)) => format!("{} {} {}", timestamp, hostname, content),
        None => format!("{} {} {}", now.format(CEF_TIME_FORMAT), hostname, line),
    }
}

fn split_time_prefix(line: &str) -> Option<(&str, &str)> {
    if line.starts_with("CEF:") {
        return None;
    }
    let (timestamp, content) = line.split_once('|')?;
    if timestamp.is_empty() || timestamp.contains('\n') {
        return None;
    }
    Some((timestamp, content))
}
