//! Single-server queue simulation under approximate SRPT scheduling.
//!
//! Each arriving job is ranked by its estimated remaining processing time
//! against a short window of recent arrivals, and that rank is its priority
//! class. The queue is kept ordered by class, with the last class served LCFS,
//! and the server always works on the head. Estimates carry a configurable
//! percent error, so the scheduler only ever sees approximate sizes.
//!
//! ```rust,ignore
//! let config = approx_srpt::config::load_from_file(Path::new("run.toml"))?;
//! let result = approx_srpt::configure(&config)?.run()?;
//! println!("E[N] = {}", result.average_number_in_system);
//! ```

pub mod classify;
pub mod config;
pub mod dist;
pub mod engine;
pub mod error;
pub mod formula;
pub mod job;
pub mod output;
pub mod queue;
pub mod stats;

use tracing_subscriber::EnvFilter;

pub use config::SimConfig;
pub use dist::{BoundedPareto, Dist, ErrorRange};
pub use engine::{
    ArrivalRecord, EngineParams, EventKind, EventRecord, LoadSample, Policy, RunHandle,
    RunObserver, RunResult, StopToken, TerminalOrder,
};
pub use error::{ConfigError, SimError};
pub use job::{Job, JobId};

/// Validates `config` and prepares a run. Nothing is simulated until
/// [`RunHandle::run`] is called.
pub fn configure(config: &SimConfig) -> Result<RunHandle, ConfigError> {
    RunHandle::new(config.resolve()?)
}

/// Installs the global tracing subscriber.
///
/// Filtering comes from `RUST_LOG`; set `LOG_FORMAT=json` for JSON lines.
/// Returns an error instead of panicking when a subscriber is already set.
pub fn init_tracing() -> Result<(), SimError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|e| SimError::Tracing(e.to_string()))
}
