use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "nanogl=debug", "nanogl::draw_call=trace").
///
/// `write_style` controls ANSI coloring behavior.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
    /// Route output through the test harness capture instead of stderr.
    pub is_test: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
            is_test: false,
        }
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// Idempotent; later calls are ignored. A logger installed elsewhere first
/// is left in place.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            // Shader diagnostics are `error`, missing extensions `warn`.
            builder.filter_level(log::LevelFilter::Info);
        }

        builder.write_style(config.write_style);
        builder.is_test(config.is_test);

        if builder.try_init().is_err() {
            log::debug!("logger already installed; keeping it");
            return;
        }

        log::debug!("logging initialized");
    });
}
