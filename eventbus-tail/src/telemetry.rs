//! Log output for the tail binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing configuration.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter used when `RUST_LOG` is unset (e.g. "info", "eventbus=debug").
    pub log_level: String,
    /// Output logs as JSON.
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    pub fn with_json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries events.
pub fn init_tracing(config: &TracingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json_output {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact();
        registry.with(fmt_layer).init();
    }
}
