use engine_core::{
    checker::CheckerContext,
    error::CheckerError,
    metrics::Metrics,
    retry::{RetryDisposition, RetryError, RetryPolicy},
};
use futures::future::BoxFuture;
use model::{ResultStatus, ValidationIssue, ValidationResult};
use std::{any::Any, sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub const TIMEOUT_CHECK: &str = "timeout";
pub const FAILURE_CHECK: &str = "checker_failure";
pub const PANIC_CHECK: &str = "checker_panic";
pub const CANCELLED_CHECK: &str = "cancelled";

/// Future returned by one checker call, detached from any borrow so it can be
/// spawned.
pub type CheckerCall = BoxFuture<'static, Result<ValidationResult, CheckerError>>;

/// Timeout and retry settings for one checker.
#[derive(Debug, Clone)]
pub struct InvocationPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Hard stop shared by every checker of a parallel stage.
    pub deadline: Option<Instant>,
}

#[derive(Debug)]
enum AttemptError {
    Failed(CheckerError),
    TimedOut { after: Duration, deadline: bool },
    Panicked(String),
    Cancelled,
}

impl AttemptError {
    fn disposition(&self) -> RetryDisposition {
        match self {
            AttemptError::Cancelled | AttemptError::TimedOut { deadline: true, .. } => {
                RetryDisposition::Stop
            }
            _ => RetryDisposition::Retry,
        }
    }
}

/// Aborts the spawned attempt if it is still running when dropped.
struct AttemptTask(JoinHandle<Result<ValidationResult, CheckerError>>);

impl Drop for AttemptTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs checker calls for one spec: each attempt on its own task, raced
/// against the timeout and run cancellation, retried per policy. Never fails;
/// errors, panics, timeouts and cancellation all come back as results.
#[derive(Debug, Clone)]
pub struct Invoker {
    name: Arc<str>,
    policy: InvocationPolicy,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl Invoker {
    pub fn new(
        name: impl Into<Arc<str>>,
        policy: InvocationPolicy,
        metrics: Metrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            metrics,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &InvocationPolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Invokes `call` until it succeeds or the policy gives up. `location`
    /// is used for any synthetic issue.
    pub async fn invoke<F>(&self, base: &CheckerContext, location: &str, call: F) -> ValidationResult
    where
        F: Fn(CheckerContext) -> CheckerCall,
    {
        let started = std::time::Instant::now();

        let outcome = self
            .policy
            .retry
            .run(
                |attempt| {
                    if attempt > 0 {
                        self.metrics.increment_retries(1);
                        warn!(checker = %self.name, attempt, "Retrying checker");
                    }
                    self.metrics.increment_invocations();

                    let token = self.cancel.child_token();
                    let ctx = base.for_attempt(attempt, token.clone());
                    self.attempt(call(ctx), token)
                },
                AttemptError::disposition,
            )
            .await;

        let elapsed = started.elapsed().as_millis() as u64;
        let session = base.context().session_id.clone();

        let mut result = match outcome {
            Ok(mut result) => {
                result.checker_name = self.name.to_string();
                result.session_id = session;
                let name = &self.name;
                result.for_each_issue_mut(|view| {
                    if view.issue().checker_name.is_empty() {
                        view.set_checker_name(name);
                    }
                });
                let status = if result.status.is_terminal() {
                    result.status
                } else {
                    ResultStatus::Completed
                };
                result.finish(status);
                result
            }
            Err(err) => self.synthetic_result(err, location, session),
        };
        result.execution_time_ms = elapsed;
        result
    }

    async fn attempt(
        &self,
        call: CheckerCall,
        token: CancellationToken,
    ) -> Result<ValidationResult, AttemptError> {
        let now = Instant::now();
        let mut limit = self.policy.timeout;
        let mut at = now + limit;
        let mut hit_deadline = false;
        if let Some(deadline) = self.policy.deadline
            && deadline <= at
        {
            at = deadline;
            limit = deadline.saturating_duration_since(now);
            hit_deadline = true;
        }

        let mut task = AttemptTask(tokio::spawn(call));

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AttemptError::Cancelled),
            joined = &mut task.0 => match joined {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(err)) => {
                    warn!(checker = %self.name, error = %err, "Checker returned an error");
                    Err(AttemptError::Failed(err))
                }
                Err(join) if join.is_panic() => {
                    let message = panic_message(join.into_panic());
                    error!(checker = %self.name, panic = %message, "Checker panicked");
                    self.metrics.increment_panics();
                    Err(AttemptError::Panicked(message))
                }
                Err(_) => Err(AttemptError::Cancelled),
            },
            _ = sleep_until(at) => {
                warn!(checker = %self.name, timeout_ms = limit.as_millis() as u64, "Checker timed out");
                self.metrics.increment_timeouts();
                Err(AttemptError::TimedOut { after: limit, deadline: hit_deadline })
            }
        };

        if outcome.is_err() {
            token.cancel();
        }
        outcome
    }

    fn synthetic_result(
        &self,
        err: RetryError<AttemptError>,
        location: &str,
        session: model::SessionId,
    ) -> ValidationResult {
        let attempts = err.attempts();
        let name = &self.name;

        let (issue, status) = match err.into_inner() {
            AttemptError::TimedOut { after, .. } => (
                ValidationIssue::critical(
                    TIMEOUT_CHECK,
                    format!("Checker '{name}' timed out after {} ms", after.as_millis()),
                    location,
                )
                .with_remediation("Raise the checker timeout or reduce the input size"),
                ResultStatus::Failed,
            ),
            AttemptError::Failed(e) => (
                ValidationIssue::critical(FAILURE_CHECK, format!("Checker '{name}' failed: {e}"), location),
                ResultStatus::Failed,
            ),
            AttemptError::Panicked(msg) => (
                ValidationIssue::critical(PANIC_CHECK, format!("Checker '{name}' panicked: {msg}"), location),
                ResultStatus::Failed,
            ),
            AttemptError::Cancelled => (
                ValidationIssue::critical(
                    CANCELLED_CHECK,
                    format!("Checker '{name}' was cancelled"),
                    location,
                ),
                ResultStatus::Cancelled,
            ),
        };

        if status == ResultStatus::Failed {
            self.metrics.increment_failures();
        }

        let issue = issue
            .with_checker(name.to_string())
            .with_detail("attempts", attempts as u64);
        let mut result = ValidationResult::failed(name.to_string(), session, issue);
        result.finish(status);
        result
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(s) => s.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}
