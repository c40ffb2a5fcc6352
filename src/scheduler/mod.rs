//! Long-running tick scheduler.
//!
//! # Architecture
//!
//! ```text
//!   WaitingForData ──► RunningTick ──► Persisting ──► (Alerting)
//!         ▲                                               │
//!         └───────────────────────────────────────────────┘
//! ```
//!
//! - **Clock**: injectable time source, [`SystemClock`] in production
//! - **FailureCounter**: net failed ticks, reset after an alert
//! - **StateStore**: versioned JSON record of cursor and counter
//! - **Scheduler**: the loop itself
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use staff_runner::scheduler::{ScheduleSettings, Scheduler, StateStore, SystemClock};
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! let clock = Arc::new(SystemClock);
//! let mut scheduler = Scheduler::new(settings, locator, pipeline, runner, clock, notifier)
//!     .with_state_store(StateStore::new("/var/lib/staff-runner/state.json"));
//!
//! scheduler.run(shutdown_rx, None).await;
//! ```

pub mod clock;
mod engine;
mod failure;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    Phase, ScheduleSettings, Scheduler, TickOutcome, DEFAULT_AVAILABILITY_DELAY_SECS,
    DEFAULT_CADENCE_SECS, DEFAULT_FAILURE_THRESHOLD,
};
pub use failure::FailureCounter;
pub use state::{PersistedState, StateStore, STATE_VERSION};
