//! Opt-in tracing setup for hosts embedding the pipeline.
//!
//! Library code only emits `tracing` events. Hosts either call
//! [`init_default_tracing`] or install their own subscriber.

/// Default directives when `RUST_LOG` is unset: pipeline stages at `info`,
/// dependencies at `warn`.
pub const DEFAULT_FILTER: &str = "warn,blasthole_qc=info";

/// Install an `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`]. Event targets are kept since they name the stage
/// (`blasthole_qc::normalize`, `blasthole_qc::metrics`, ...).
///
/// Returns `false` when the `telemetry` feature is disabled or a global
/// subscriber is already set.
#[must_use]
pub fn init_default_tracing() -> bool {
    #[cfg(feature = "telemetry")]
    {
        use tracing_subscriber::EnvFilter;

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok();
    }

    #[cfg(not(feature = "telemetry"))]
    {
        false
    }
}
