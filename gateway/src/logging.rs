//! Tracing initialization, trimmed from the teacher's observability stack
//! down to the console layer — no OpenTelemetry exporter, per the spec's
//! "no metrics exporter is implemented" line. The `tracing` span/event
//! boundary this sets up is where one would attach an exporter later.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a process-wide `tracing` subscriber: an `EnvFilter` read from
/// `RUST_LOG` (defaulting to `"info"`) plus a plain console formatter.
///
/// Call once, before `Server::run`. Safe to skip in tests, which install
/// their own subscriber or run unsubscribed.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let _ = tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init();
}
