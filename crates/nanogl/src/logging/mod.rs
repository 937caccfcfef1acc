//! Logging utilities.
//!
//! Logger initialization plus the diagnostics the object model emits when
//! the native compiler or linker rejects a program. Everything goes through
//! the `log` facade; `env_logger` is only installed by [`init_logging`].

mod diagnostics;
mod init;

pub use diagnostics::{log_numbered_source, numbered_lines};
pub use init::{init_logging, LoggingConfig};
