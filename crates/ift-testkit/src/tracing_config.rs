//! Tracing for suite runs under `cargo test`.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Suite checks and mock server decisions at `debug`, everything else at `info`.
const DEFAULT_FILTER: &str = "info,ift_conformance=debug,ift_testkit=debug";

/// Route suite and mock server events to the test harness's captured output.
///
/// Only the first call in a test binary installs the subscriber. `RUST_LOG`
/// overrides the default filter, so `RUST_LOG=off` quiets misbehaving-server
/// runs.
///
/// ```rust,ignore
/// #[test]
/// fn conforming_server_passes() {
///     ift_testkit::init_test_tracing();
///     // ...
/// }
/// ```
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        // A subscriber installed elsewhere in the binary wins.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .compact(),
            )
            .try_init();
    });
}
