use tracing_subscriber::EnvFilter;

use crate::config::settings::Settings;

/// Maps the `LOG_LEVEL` names accepted by the service onto `tracing` directives.
pub fn level_directive(log_level: &str) -> &'static str {
    match log_level.trim().to_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `LOG_LEVEL` when set.
pub fn init(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level_directive(&settings.log_level);
        EnvFilter::new(format!("{level},tower_http={level},hyper=warn,reqwest=warn"))
    });

    let debug = level_directive(&settings.log_level) == "debug";

    // try_init: tests and repeated calls may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(debug)
        .with_line_number(debug)
        .try_init();
}
