mod backoff;
mod clock;
mod env;

pub use backoff::ExponentialBackoff;
pub use clock::{Clock, SharedClock, SystemClock, VirtualClock};
pub use env::{env_flag, env_or_default, env_parse};

/// Initialize the global tracing subscriber from `RUST_LOG` (default `info`).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
