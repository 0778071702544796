//! Test doubles for exercising the runner/interview machinery without a real
//! network adapter.

mod stub;

pub use stub::{ScriptedOutcome, StubLlmAdapter};

use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Installs a `tracing` subscriber for test output, controlled by `RUST_LOG`
/// (default `edsl_jobs=debug`). Idempotent — safe to call at the top of
/// every test.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edsl_jobs=debug")))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init();
    });
}
