//! Bounded retry with exponential backoff.
//!
//! Attempts are numbered from 0. After a retryable failure of attempt `k` the
//! driver sleeps `base_delay * 2^k`, bounded only by an explicit
//! `max_backoff`, unless the failure carried its own delay, e.g. a
//! server-provided `Retry-After`, which always wins. Once `max_retries` retries have been spent the last error is
//! returned unchanged.
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Configuration for the bounded retry strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay slept after attempt 0 fails; doubles with every further attempt
    pub base_delay: Duration,
    /// Optional upper bound for the exponential schedule; `Duration::MAX` leaves it uncapped.
    /// Server-provided delays are never capped.
    pub max_backoff: Duration,
    /// Minimum spacing between retry warnings for the same logical request
    pub log_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_backoff: Duration::MAX,
            log_interval: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Exponential delay to sleep after attempt `attempt` failed
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let delay = 2_u32.checked_pow(attempt).map_or(Duration::MAX, |factor| self.base_delay.saturating_mul(factor));
        delay.min(self.max_backoff)
    }
}

/// Result of a single attempt, as reported to the retry driver
#[derive(Debug)]
pub enum AttemptOutcome<T, E> {
    /// The attempt produced a value; the driver returns it immediately
    Success(T),
    /// The attempt failed but a later attempt may succeed
    Retryable {
        error: E,
        /// Delay requested by the remote side, overriding the exponential schedule
        retry_after: Option<Duration>,
    },
    /// The attempt failed and retrying cannot help
    Fatal(E),
}

/// Final result of a driven request together with what it cost
#[derive(Debug)]
pub struct RetryOutput<T, E> {
    pub result: Result<T, E>,
    /// Number of retries performed (0 when the first attempt settled it)
    pub retries: u32,
    /// Wall-clock time spent across all attempts and sleeps
    pub elapsed: Duration,
}

/// State tracker for the attempts of one logical request
pub struct RetryState {
    config: RetryConfig,
    start_time: Instant,
    last_log_time: Option<Instant>,
    retry_count: u32,
}

impl std::fmt::Debug for RetryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryState")
            .field("config", &self.config)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, start_time: Instant::now(), last_log_time: None, retry_count: 0 }
    }

    /// Index of the attempt about to run
    pub fn attempt(&self) -> u32 {
        self.retry_count
    }

    /// Whether the retry budget is spent
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.config.max_retries
    }

    /// Delay to sleep before the next attempt
    pub fn next_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.config.backoff_for(self.retry_count))
    }

    /// Check if we should log this retry attempt (throttled logging)
    pub fn should_log(&mut self) -> bool {
        match self.last_log_time {
            Some(last) if last.elapsed() < self.config.log_interval => false,
            _ => {
                self.last_log_time = Some(Instant::now());
                true
            }
        }
    }

    /// Increment retry counter and return current count
    pub fn increment_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Get current retry count
    pub fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Get elapsed time since the first attempt
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Drive `attempt` until it succeeds, fails fatally, or the retry budget is spent.
///
/// Attempts run strictly one after another. Backoff sleeps yield to the
/// runtime, so unrelated requests keep making progress while this one waits.
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, operation: &str, mut attempt: F) -> RetryOutput<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T, E>>,
    E: Display,
{
    let mut state = RetryState::new(config.clone());

    loop {
        let index = state.attempt();
        let result = match attempt(index).await {
            AttemptOutcome::Success(value) => Ok(value),
            AttemptOutcome::Fatal(error) => {
                tracing::debug!(operation, attempt = index, error = %error, "Attempt failed with non-retryable error");
                Err(error)
            }
            AttemptOutcome::Retryable { error, retry_after } => {
                if state.is_exhausted() {
                    tracing::warn!(
                        operation,
                        attempts = index + 1,
                        elapsed_ms = state.elapsed().as_millis() as u64,
                        error = %error,
                        "Retry budget exhausted"
                    );
                    Err(error)
                } else {
                    let delay = state.next_delay(retry_after);
                    if state.should_log() {
                        tracing::warn!(
                            operation,
                            attempt = index,
                            delay_ms = delay.as_millis() as u64,
                            server_delay = retry_after.is_some(),
                            error = %error,
                            "Transient failure, retrying"
                        );
                    } else {
                        tracing::debug!(operation, attempt = index, delay_ms = delay.as_millis() as u64, "Retrying");
                    }
                    tokio::time::sleep(delay).await;
                    state.increment_retry();
                    continue;
                }
            }
        };

        return RetryOutput { result, retries: state.get_retry_count(), elapsed: state.elapsed() };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig { max_retries, ..Default::default() }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::MAX);
    }

    #[rstest]
    #[case(0, 1_000)]
    #[case(1, 2_000)]
    #[case(2, 4_000)]
    #[case(5, 32_000)]
    #[case(6, 64_000)]
    #[case(9, 512_000)]
    fn test_backoff_schedule(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(RetryConfig::default().backoff_for(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_backoff_explicit_cap_and_saturation() {
        let capped = RetryConfig { max_backoff: Duration::from_secs(60), ..Default::default() };
        assert_eq!(capped.backoff_for(6), Duration::from_secs(60));
        assert_eq!(RetryConfig::default().backoff_for(40), Duration::MAX);
    }

    #[test]
    fn test_retry_count() {
        let mut state = RetryState::new(config(2));
        assert_eq!(state.get_retry_count(), 0);
        assert!(!state.is_exhausted());

        assert_eq!(state.increment_retry(), 1);
        assert_eq!(state.increment_retry(), 2);
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_server_delay_overrides_schedule() {
        let state = RetryState::new(config(3));
        assert_eq!(state.next_delay(None), Duration::from_secs(1));
        assert_eq!(state.next_delay(Some(Duration::from_secs(7))), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_throttling() {
        let mut state = RetryState::new(RetryConfig { log_interval: Duration::from_millis(100), ..Default::default() });

        assert!(state.should_log());
        assert!(!state.should_log());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(state.should_log());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_outcome_stops_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let started = Instant::now();

        let output: RetryOutput<(), String> = retry_with_backoff(&config(3), "test", |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                AttemptOutcome::Fatal("bad request".to_string())
            }
        })
        .await;

        assert_eq!(output.result.unwrap_err(), "bad request");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.retries, 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_outcome_backs_off_exponentially_until_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let started = Instant::now();

        let output: RetryOutput<(), String> = retry_with_backoff(&config(3), "test", |attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                AttemptOutcome::Retryable { error: format!("failure {attempt}"), retry_after: None }
            }
        })
        .await;

        assert_eq!(output.result.unwrap_err(), "failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(output.retries, 3);
        // 1s + 2s + 4s, nothing after the final attempt
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failures_returns_value() {
        let output: RetryOutput<u32, String> = retry_with_backoff(&config(3), "test", |attempt| async move {
            if attempt < 2 {
                AttemptOutcome::Retryable { error: "busy".to_string(), retry_after: None }
            } else {
                AttemptOutcome::Success(attempt)
            }
        })
        .await;

        assert_eq!(output.result.unwrap(), 2);
        assert_eq!(output.retries, 2);
        assert_eq!(output.elapsed, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_takes_precedence_over_backoff() {
        let started = Instant::now();
        let output: RetryOutput<(), String> = retry_with_backoff(&config(1), "test", |_| async move {
            AttemptOutcome::Retryable { error: "throttled".to_string(), retry_after: Some(Duration::from_secs(7)) }
        })
        .await;

        assert!(output.result.is_err());
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let output: RetryOutput<(), String> = retry_with_backoff(&config(0), "test", |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                AttemptOutcome::Retryable { error: "timeout".to_string(), retry_after: None }
            }
        })
        .await;

        assert!(output.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
