use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::Instrument;

use crate::{AdmissionController, AdmissionDecision, RealmName, RespectfulError};

/// How a dispatch behaves when admission is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Fail with [`RespectfulError::RateLimited`] on the first denial.
    NoWait,
    /// Retry every `poll_interval` until admitted.
    Wait {
        /// Delay between attempts. Must be greater than zero.
        poll_interval: Duration,
        /// Give up with [`RespectfulError::WaitTimedOut`] after this long.
        /// `None` retries until admitted.
        max_wait: Option<Duration>,
    },
}

/// Runs caller-supplied calls once their realms admit them.
///
/// The call is any zero-argument function returning a future; its output is
/// handed back unchanged, so a fallible call comes back as
/// `Ok(Err(call_error))`. Quota is consumed at admission whether or not the
/// call then succeeds.
///
/// A waiting dispatch holds its task, not a thread, for as long as it polls.
/// Dropping the returned future cancels the wait.
pub struct Dispatcher {
    admission: Arc<AdmissionController>,
    poll_interval: Duration,
    max_wait: Option<Duration>,
    call_module: Arc<str>,
}

impl Dispatcher {
    pub(crate) fn new(
        admission: Arc<AdmissionController>,
        poll_interval: Duration,
        max_wait: Option<Duration>,
        call_module: Arc<str>,
    ) -> Self {
        Self {
            admission,
            poll_interval,
            max_wait,
            call_module,
        }
    }

    /// The policy `dispatch(.., wait = true)` uses.
    pub fn default_wait_policy(&self) -> WaitPolicy {
        WaitPolicy::Wait {
            poll_interval: self.poll_interval,
            max_wait: self.max_wait,
        }
    }

    /// Run `call` once `realms` admit it.
    ///
    /// With `wait = false`, a denial fails immediately with
    /// [`RespectfulError::RateLimited`] and `call` is not run. With
    /// `wait = true`, admission is retried at the configured poll interval,
    /// bounded by the configured maximum wait if any.
    pub async fn dispatch<F, Fut, T>(
        &self,
        call: F,
        realms: &[RealmName],
        wait: bool,
    ) -> Result<T, RespectfulError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let policy = if wait {
            self.default_wait_policy()
        } else {
            WaitPolicy::NoWait
        };

        self.dispatch_with(call, realms, policy).await
    }

    /// Run `call` once `realms` admit it, waiting according to `policy`.
    ///
    /// A waiting policy with a zero poll interval is refused with
    /// [`RespectfulError::Config`] before any admission attempt.
    pub async fn dispatch_with<F, Fut, T>(
        &self,
        call: F,
        realms: &[RealmName],
        policy: WaitPolicy,
    ) -> Result<T, RespectfulError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let span = tracing::info_span!(
            "dispatch",
            call_module = %self.call_module,
            realms = ?realms,
        );

        async move {
            self.admit(realms, policy).await?;
            Ok(call().await)
        }
        .instrument(span)
        .await
    }

    async fn admit(&self, realms: &[RealmName], policy: WaitPolicy) -> Result<(), RespectfulError> {
        let (poll_interval, max_wait) = match policy {
            WaitPolicy::NoWait => {
                return match self.admission.try_admit(realms).await? {
                    AdmissionDecision::Admitted => Ok(()),
                    AdmissionDecision::Denied { realms } => {
                        tracing::warn!(realms = ?realms, "rate limited");
                        Err(RespectfulError::RateLimited { realms })
                    }
                };
            }
            WaitPolicy::Wait { poll_interval, .. } if poll_interval.is_zero() => {
                return Err(RespectfulError::Config(
                    "'poll_interval' must be greater than 0".to_string(),
                ));
            }
            WaitPolicy::Wait {
                poll_interval,
                max_wait,
            } => (poll_interval, max_wait),
        };

        let started = Instant::now();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;

            let denied = match self.admission.try_admit(realms).await? {
                AdmissionDecision::Admitted => {
                    if attempts > 1 {
                        tracing::debug!(attempts, waited = ?started.elapsed(), "admitted after waiting");
                    }
                    return Ok(());
                }
                AdmissionDecision::Denied { realms } => realms,
            };

            let waited = started.elapsed();
            let pause = match max_wait {
                Some(max_wait) if waited >= max_wait => {
                    tracing::warn!(realms = ?denied, ?waited, attempts, "gave up waiting for admission");
                    return Err(RespectfulError::WaitTimedOut {
                        realms: denied,
                        waited,
                    });
                }
                Some(max_wait) => poll_interval.min(max_wait - waited),
                None => poll_interval,
            };

            tracing::trace!(realms = ?denied, attempts, ?pause, "denied, retrying");
            tokio::time::sleep(pause).await;
        }
    }
}
