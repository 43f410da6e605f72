//! Progress estimation for running jobs.
//!
//! The transcoder does not report a reliable machine-readable position in
//! this setup, so the default [`SimulatedProgress`] advances a fixed step
//! per poll tick and holds below 100 until the process exits successfully.

/// Produces the progress value for a running job on each poll tick.
pub trait ProgressSource: Send {
    /// Called once per poll tick while the process is running.
    ///
    /// `last_output` is the newest stderr line, if any. Returns the new
    /// progress in `[0, 100)`; the engine sets 100 itself on success.
    fn tick(&mut self, current: f32, last_output: Option<&str>) -> f32;
}

/// Creates a fresh [`ProgressSource`] for every job.
pub trait ProgressFactory: Send + Sync {
    fn create(&self) -> Box<dyn ProgressSource>;
}

impl<F> ProgressFactory for F
where
    F: Fn() -> Box<dyn ProgressSource> + Send + Sync,
{
    fn create(&self) -> Box<dyn ProgressSource> {
        self()
    }
}

/// Fixed increment per tick, capped at a ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedProgress {
    pub step: f32,
    pub ceiling: f32,
}

impl SimulatedProgress {
    pub fn new(step: f32, ceiling: f32) -> Self {
        Self { step, ceiling }
    }
}

impl Default for SimulatedProgress {
    fn default() -> Self {
        Self::new(5.0, 95.0)
    }
}

impl ProgressSource for SimulatedProgress {
    fn tick(&mut self, current: f32, _last_output: Option<&str>) -> f32 {
        (current + self.step).min(self.ceiling)
    }
}

impl ProgressFactory for SimulatedProgress {
    fn create(&self) -> Box<dyn ProgressSource> {
        Box::new(*self)
    }
}
