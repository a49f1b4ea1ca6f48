pub mod audio;
pub mod config;
mod logging;
mod telemetry;

pub use logging::{crash_log_path, init_logging, log_debug, log_file_path, log_panic};
pub use telemetry::init_tracing;
