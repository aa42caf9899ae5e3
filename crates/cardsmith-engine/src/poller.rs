use std::thread;
use std::time::{Duration, Instant};

use cardsmith_contracts::prediction::{PredictionJob, PredictionStatus};
use tracing::debug;

use crate::error::PipelineError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Total time spent waiting when a job never reaches a terminal state.
    pub fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_ATTEMPTS)
    }
}

/// Anything that can report the current state of a prediction job.
///
/// `budget` is what remains of the polling deadline; a network-backed
/// source should not block for longer than that.
pub trait JobStatusSource {
    fn fetch_status(&self, job_id: &str, budget: Duration)
        -> Result<PredictionJob, PipelineError>;
}

impl<F> JobStatusSource for F
where
    F: Fn(&str, Duration) -> Result<PredictionJob, PipelineError>,
{
    fn fetch_status(
        &self,
        job_id: &str,
        budget: Duration,
    ) -> Result<PredictionJob, PipelineError> {
        self(job_id, budget)
    }
}

/// Fixed-interval, bounded polling of an asynchronous job.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionPoller {
    policy: PollPolicy,
}

impl PredictionPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Waits `interval`, fetches, and repeats until the job is terminal,
    /// `max_attempts` fetches have been made, or `ceiling()` has elapsed.
    /// A job that is already terminal is returned (or rejected) without
    /// polling. Transport errors abort the loop immediately.
    pub fn wait_for_completion(
        &self,
        provider: &str,
        job: PredictionJob,
        source: &dyn JobStatusSource,
    ) -> Result<PredictionJob, PipelineError> {
        let job = match settle(provider, job)? {
            Settled::Done(job) => return Ok(job),
            Settled::Pending(job) => job,
        };

        let deadline = Instant::now() + self.policy.ceiling();
        let mut attempts = 0;
        while attempts < self.policy.max_attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(self.policy.interval.min(remaining));

            let budget = deadline.saturating_duration_since(Instant::now());
            if budget.is_zero() {
                break;
            }
            attempts += 1;
            let polled = source.fetch_status(&job.id, budget)?;
            debug!(
                provider,
                job_id = %job.id,
                attempt = attempts,
                status = ?polled.status,
                "polled prediction"
            );
            if let Settled::Done(done) = settle(provider, polled)? {
                return Ok(done);
            }
        }

        Err(PipelineError::ProviderTimeout {
            provider: provider.to_string(),
            job_id: job.id,
            attempts,
        })
    }
}

enum Settled {
    Done(PredictionJob),
    Pending(PredictionJob),
}

fn settle(provider: &str, job: PredictionJob) -> Result<Settled, PipelineError> {
    if !job.status.is_terminal() {
        return Ok(Settled::Pending(job));
    }
    if job.status == PredictionStatus::Failed {
        return Err(PipelineError::PredictionFailed {
            provider: provider.to_string(),
            message: job
                .error
                .clone()
                .unwrap_or_else(|| "provider reported failure without detail".to_string()),
            job_id: job.id,
        });
    }
    Ok(Settled::Done(job))
}
