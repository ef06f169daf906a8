use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_level`. With `json` set, each event is
/// written as one JSON object per line, request spans included.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("arcjet=debug")
        .with_test_writer()
        .try_init();
}
