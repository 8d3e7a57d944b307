//! Structured logging setup.
//!
//! Binaries build a `Dispatch` and install it for the duration of their run
//! with `tracing::dispatcher::with_default`, so library code never relies on
//! a process-global subscriber.
use std::io::IsTerminal;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Log dispatcher writing compact lines to stderr, filtered by `RUST_LOG`.
///
/// Colors are only emitted when stderr is a terminal.
pub fn dispatch() -> Dispatch {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .finish();
    Dispatch::new(subscriber)
}

/// Run `f` with `dispatch` as the active subscriber.
pub fn scoped<T>(dispatch: &Dispatch, f: impl FnOnce() -> T) -> T {
    tracing::dispatcher::with_default(dispatch, f)
}
