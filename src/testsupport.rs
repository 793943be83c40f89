//! Shared helpers for building SSE fixtures in tests.

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One SSE frame carrying `data` as its payload.
pub fn sse_data_block(data: &str) -> String {
    format!("data: {data}\n\n")
}

/// One SSE frame with an `event:` field ahead of the payload.
pub fn sse_event_block(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}
