use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Compact timestamp prefixed to wire lines, e.g. `Jun 09 20:33:12`.
pub const CEF_TIME_FORMAT: &str = "%b %d %H:%M:%S";

pub const CEF_VERSION: u32 = 0;
pub const DEVICE_VENDOR: &str = "Microsoft";
pub const DEVICE_VERSION: &str = "1";

/// One Common Event Format event.
///
/// Extension keys live in a `BTreeMap`, so rendering always walks them in
/// lexicographic order regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CefEvent {
    pub cef_version: u32,
    pub device_vendor: String,
    pub device_product: String,
    pub device_version: String,
    pub device_event_class_id: String,
    pub name: String,
    pub severity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extension: BTreeMap<String, String>,
}

impl CefEvent {
    /// An event carrying the fixed vendor fields for `product`.
    pub fn skeleton(product: &str) -> Self {
        Self {
            cef_version: CEF_VERSION,
            device_vendor: DEVICE_VENDOR.to_string(),
            device_product: product.to_string(),
            device_version: DEVICE_VERSION.to_string(),
            device_event_class_id: String::new(),
            name: String::new(),
            severity: 0,
            time: None,
            extension: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.extension.insert(key.to_string(), value.into());
    }

    pub fn header(&self) -> String {
        format!(
            "CEF:{}|{}|{}|{}|{}|{}|{}",
            self.cef_version,
            self.device_vendor,
            self.device_product,
            self.device_version,
            self.device_event_class_id,
            self.name,
            self.severity
        )
    }

    /// Space-joined `key=value` pairs, sorted by key. Empty values are left out.
    pub fn extension_text(&self) -> String {
        self.extension
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{}={}", key, escape_value(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Header plus extension, without the time prefix.
    pub fn cef_text(&self) -> String {
        let extension = self.extension_text();
        if extension.is_empty() {
            self.header()
        } else {
            format!("{}|{}", self.header(), extension)
        }
    }

    /// The line handed to a transport: `<time>|CEF:...` when the event has a time.
    pub fn wire_line(&self) -> String {
        match self.time {
            Some(time) => format!("{}|{}", time.format(CEF_TIME_FORMAT), self.cef_text()),
            None => self.cef_text(),
        }
    }
}

impl fmt::Display for CefEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_line())
    }
}

/// Only `=` is escaped. Pipes, backslashes and newlines pass through as-is.
pub fn escape_value(value: &str) -> String {
    value.replace('=', "\\=")
}
