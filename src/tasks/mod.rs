//! Asynchronous task tracking shared by every importer and exporter.
//!
//! Flow: a submission yields a `task_id`, the `Poller` asks for its status
//! until it is terminal, `next_progress` drives the bar on every tick and
//! `resolve` decides what the operator sees. `ImportSession` wires these
//! together for one import dialog.

mod job;
pub mod outcome;
pub mod poller;
mod progress;
pub mod session;
pub mod status;

pub use job::{ImportJob, JobState, RowError};
pub(crate) use job::with_row;
pub use outcome::{resolve, ImportOutcome, Notice, Resolution, Severity};
pub use poller::{PollTick, Poller, PollerConfig, TaskStatusSource};
pub use progress::{next_progress, SYNTHETIC_PROGRESS_CAP};
pub use session::{ImportObserver, ImportReport, ImportSession, NoopObserver, TaskSubmitter};
pub use status::{classify_status, TaskStatus};
