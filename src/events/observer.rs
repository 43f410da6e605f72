use crate::queue::Job;

/// Typed view of the job lifecycle.
///
/// Every method has an empty default, so implementors only override what
/// they care about. Methods are called synchronously from the publishing
/// thread and should return quickly.
pub trait JobObserver: Send + Sync {
    fn on_job_started(&self, _job: &Job) {}

    /// `progress` is an estimate in `[0, 100]`, not a measurement.
    fn on_job_progress(&self, _job: &Job, _progress: f32) {}

    fn on_job_completed(&self, _job: &Job) {}

    fn on_job_failed(&self, _job: &Job, _error: &str) {}

    fn on_job_cancelled(&self, _job: &Job) {}

    /// The worker found the queue empty and exited.
    fn on_queue_drained(&self) {}
}
