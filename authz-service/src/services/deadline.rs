use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use super::AuthzError;

/// Point in time by which a request must have finished its storage work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// Run `fut` until the deadline. On expiry the future is dropped, which
    /// rolls back any transaction it holds.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, AuthzError>
    where
        F: Future<Output = Result<T, AuthzError>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Storage call exceeded request deadline");
                Err(AuthzError::DeadlineExceeded)
            }
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::after(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let value = deadline.run(async { Ok::<_, AuthzError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_yields_deadline_exceeded() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AuthzError>(())
            })
            .await;
        assert!(matches!(result, Err(AuthzError::DeadlineExceeded)));
    }
}
