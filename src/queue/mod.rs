//! Conversion job queue.
//!
//! Submit jobs with [`JobQueue::submit`], then [`JobQueue::start`] a worker
//! that converts them one at a time with ffmpeg. Job lifecycle:
//!
//! ```text
//! Pending -> Running -> Completed | Failed | Cancelled
//! Pending -> Cancelled            (remove / clear)
//! ```
//!
//! Every transition is mirrored into the [`StateStore`](crate::state::StateStore)
//! as a task with the same id, and published on the
//! [`EventBus`](crate::events::EventBus).
//!
//! Reported progress is an estimate advanced once per poll tick; see
//! [`ProgressSource`].

mod engine;
mod progress;
mod types;
mod worker;

pub use engine::{JobQueue, JobQueueBuilder, FFMPEG};
pub use progress::{ProgressFactory, ProgressSource, SimulatedProgress};
pub use types::*;
