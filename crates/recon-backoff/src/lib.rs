//! Exponential backoff with jitter, wrapping each adapter call in a retry
//! policy keyed to that method's timeout class (spec §4.4, §9: "Backoff is a
//! cross-cutting concern").
//!
//! Adapted from the teacher pack's own `backoff` crate, with one behavioral
//! change: that crate retries forever, but spec §4.4 requires a wall-clock
//! cap after which the run is reported `PARTIAL_FAILURE`. `retry_with_cap`
//! adds that deadline.

use std::time::Duration;

use rand::prelude::*;

/// Which deadline class a backend call falls into (spec §4.4 / §5: "Deletes
/// get a longer cap than reads").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Reads and writes: default 120s wall-clock cap.
    ReadWrite,
    /// Deletes, whose server-side work scales with collection size: default
    /// 300s wall-clock cap.
    Delete,
}

impl TimeoutClass {
    pub fn default_cap(self) -> Duration {
        match self {
            TimeoutClass::ReadWrite => Duration::from_secs(120),
            TimeoutClass::Delete => Duration::from_secs(300),
        }
    }
}

/// Exponential backoff with jitter. See
/// <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            base: 2.,
        }
    }
}

/// Error raised once the wall-clock cap for a timeout class is exceeded.
#[derive(Debug, thiserror::Error)]
#[error("operation '{operation}' exceeded its {cap:?} backoff cap: {last_error}")]
pub struct DeadlineExceeded {
    pub operation: String,
    pub cap: Duration,
    pub last_error: String,
}

pub struct Backoff {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    rng: Option<Box<dyn RngCore + Sync + Send>>,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self::new_with_rng(config, None)
    }

    pub fn new_with_rng(config: &BackoffConfig, rng: Option<Box<dyn RngCore + Sync + Send>>) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();
        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            base: config.base,
            rng,
        }
    }

    fn next(&mut self) -> Duration {
        let range = self.init_backoff..(self.next_backoff_secs * self.base).max(self.init_backoff + 1e-9);
        let rand_backoff = match self.rng.as_mut() {
            Some(rng) => rng.gen_range(range),
            None => thread_rng().gen_range(range),
        };
        let next_backoff = self.max_backoff_secs.min(rand_backoff);
        Duration::from_secs_f64(std::mem::replace(&mut self.next_backoff_secs, next_backoff))
    }
}

/// Retry `do_stuff` with exponential backoff until it succeeds or the
/// timeout class's wall-clock cap elapses, whichever comes first.
pub async fn retry_with_cap<F, Fut, T, E>(
    operation: &str,
    class: TimeoutClass,
    config: &BackoffConfig,
    do_stuff: F,
) -> Result<T, DeadlineExceeded>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_deadline(operation, class.default_cap(), config, do_stuff).await
}

/// Same as [`retry_with_cap`] but with an explicit cap, for callers (and
/// tests) that need a deadline other than a `TimeoutClass` default.
pub async fn retry_with_deadline<F, Fut, T, E>(
    operation: &str,
    cap: Duration,
    config: &BackoffConfig,
    mut do_stuff: F,
) -> Result<T, DeadlineExceeded>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let deadline = tokio::time::Instant::now() + cap;
    let mut backoff = Backoff::new(config);
    let mut last_error = String::from("no attempt made");

    loop {
        match do_stuff().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                last_error = error.to_string();
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    return Err(DeadlineExceeded {
                        operation: operation.to_string(),
                        cap,
                        last_error,
                    });
                }
                let wait = backoff.next();
                let remaining = deadline.saturating_duration_since(now);
                let wait = wait.min(remaining);
                tracing::warn!(
                    operation,
                    error = %last_error,
                    wait_secs = wait.as_secs_f64(),
                    "backend call failed, retrying with backoff"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}
