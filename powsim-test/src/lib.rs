//! Miscellaneous test code for the simulator workspace.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Common imports for simulator tests.
pub mod prelude {
    pub use color_eyre::eyre::{bail, eyre, Report, Result};
    pub use pretty_assertions::{assert_eq, assert_ne};
}

static INIT: Once = Once::new();

/// Initialize tracing and error reporting for a test.
///
/// Idempotent, so every test can (and should) call it first. Honors
/// `RUST_LOG`, defaulting to `info`.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(filter)
            .with(ErrorLayer::default())
            .init();

        color_eyre::install().expect("error reporting hooks install only once");
    })
}
