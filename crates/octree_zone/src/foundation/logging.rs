//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// Only binaries should call this; the library itself just emits records
/// through the `log` facade.
pub fn init() {
    env_logger::init();
}
