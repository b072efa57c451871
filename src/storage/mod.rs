pub mod alert_log;
pub mod session_export;

pub use alert_log::AlertLogger;
pub use session_export::{ExportSink, JsonSessionExporter};
