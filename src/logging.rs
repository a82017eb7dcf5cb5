//! Env-driven tracing setup, applied lazily from the client facade.
//!
//! `GOSSH_VERBOSITY` selects the level (0=error … 4+=trace), a non-empty
//! `GOSSH_DISABLE_COLOR` turns ANSI colour off. A subscriber installed by
//! the embedding application takes precedence; `RUST_LOG` overrides the
//! verbosity mapping.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

pub(crate) fn init_from_env() {
    INIT.call_once(|| {
        let verbosity: u8 = std::env::var("GOSSH_VERBOSITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let ansi = std::env::var("GOSSH_DISABLE_COLOR")
            .map(|v| v.is_empty())
            .unwrap_or(true);

        let level = match verbosity {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("sshcp={level}")));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(ansi).with_target(true))
            .try_init();
    });
}
