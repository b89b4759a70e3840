use crate::fetch::PageSession;
use crate::{FetchError, ScanError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// One unit of work retried against a shared page session.
#[async_trait::async_trait]
pub trait ScanTask: Send {
    type Output: Send;

    async fn attempt(&mut self, session: &mut dyn PageSession) -> Result<Self::Output, ScanError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub attempt: u32,
    pub error: ScanError,
    /// Set when the session could not be reset after the failure.
    pub reset_error: Option<FetchError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Completed { value: T, attempts: u32 },
    Abandoned { failures: Vec<AttemptFailure> },
}

/// Runs `task` until it succeeds or the policy's attempts are spent,
/// resetting the session after every failed attempt.
pub async fn retry_task<T: ScanTask>(
    policy: RetryPolicy,
    session: &mut dyn PageSession,
    task: &mut T,
) -> RetryOutcome<T::Output> {
    let mut failures = Vec::new();
    for attempt in 1..=policy.max_attempts.max(1) {
        match task.attempt(session).await {
            Ok(value) => {
                return RetryOutcome::Completed {
                    value,
                    attempts: attempt,
                }
            }
            Err(error) => {
                let reset_error = session.reset().await.err();
                failures.push(AttemptFailure {
                    attempt,
                    error,
                    reset_error,
                });
            }
        }
    }
    RetryOutcome::Abandoned { failures }
}
