use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` wins, otherwise `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// JSON structured logs on stdout.
pub fn get_subscriber(default_filter: &str) -> impl Subscriber + Send + Sync {
    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .json();

    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(formatting_layer)
}

/// Install the subscriber globally. `log` records from actix and the request
/// logger are forwarded into it as well.
pub fn init_telemetry(default_filter: &str) {
    get_subscriber(default_filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_used_without_rust_log() {
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(env_filter("warn").to_string(), "warn");
        }
    }

    #[test]
    fn test_subscriber_can_be_scoped() {
        let subscriber = get_subscriber("debug");
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(user_id = 1, "scoped event");
        });
    }
}
