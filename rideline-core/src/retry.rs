use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry used while a dependency may still be starting up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// About a minute: 30 attempts, 2s apart.
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or the attempts run out. On exhaustion the
    /// last error is returned with the number of attempts made.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, (u32, E)>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err((attempt, e)),
                Err(e) => {
                    warn!("{} not ready (attempt {}/{}): {}", what, attempt, attempts, e);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(5, Duration::from_millis(1));

        let result = policy
            .run("broker", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("refused #{}", n))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(4, Duration::from_millis(1));

        let result: Result<(), _> = policy
            .run("broker", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("connection refused")
            })
            .await;

        let (attempts, reason) = result.unwrap_err();
        assert_eq!(attempts, 4);
        assert_eq!(reason, "connection refused");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_default_matches_startup_window() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.delay, Duration::from_secs(2));
    }
}
