pub mod event;
pub mod framing;

pub use event::{escape_value, CefEvent, CEF_TIME_FORMAT};
pub use framing::frame_syslog_line;
