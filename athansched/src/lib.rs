//! Scheduling of athan and reminder broadcasts.
//!
//! [`AthanScheduler`] is the operational facade: it computes the day's
//! prayer times through `athantimes`, arms one timer job per enabled
//! broadcast, and dispatches fired jobs to the `athancast` broadcaster.
//! A daily refresh job re-arms everything shortly after midnight.

pub mod errors;
pub mod jobs;
pub mod scheduler;
pub mod settings;

pub use errors::ScheduleError;
pub use jobs::{ArmedJob, JobKind, fire_time, job_id};
pub use scheduler::AthanScheduler;
pub use settings::{EventPolicy, EventSettings, Timing};
