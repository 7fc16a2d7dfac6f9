//! Time and cancellation budget for remote calls.

use std::future::Future;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::GuardConfig;
use crate::AppError;

/// Wraps every remote call made by the catalog reader and the reconciler.
///
/// A call fails with [`AppError::Timeout`] once it exceeds the per-call
/// timeout, with [`AppError::DeadlineExceeded`] once the run deadline has
/// passed, and with [`AppError::Cancelled`] as soon as the token is cancelled.
/// All three are connectivity errors.
#[derive(Debug, Clone)]
pub struct CallGuard {
    call_timeout: std::time::Duration,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallGuard {
    /// Starts the run clock now.
    pub fn new(config: &GuardConfig, cancel: CancellationToken) -> Self {
        Self {
            call_timeout: config.call_timeout,
            deadline: config.deadline.map(|d| Instant::now() + d),
            cancel,
        }
    }

    /// A guard with default limits that is never cancelled.
    pub fn unbounded() -> Self {
        Self::new(&GuardConfig::default(), CancellationToken::new())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails fast if the run is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), AppError> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(AppError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Runs `call` under the guard.
    pub async fn run<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        self.check()?;

        let (limit, hits_deadline) = match self.deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left < self.call_timeout {
                    (left, true)
                } else {
                    (self.call_timeout, false)
                }
            }
            None => (self.call_timeout, false),
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            outcome = tokio::time::timeout(limit, call) => match outcome {
                Ok(result) => result,
                Err(_) if hits_deadline => Err(AppError::DeadlineExceeded),
                Err(_) => Err(AppError::Timeout(self.call_timeout.as_secs())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn guard(call_timeout: Duration, deadline: Option<Duration>) -> CallGuard {
        CallGuard::new(
            &GuardConfig {
                call_timeout,
                deadline,
            },
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_passes_through_results() {
        let guard = CallGuard::unbounded();
        assert_eq!(guard.run(async { Ok::<_, AppError>(7) }).await.unwrap(), 7);

        let err = guard
            .run(async { Err::<(), _>(AppError::ClientError("HTTP 404".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ClientError(_)));
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let guard = guard(Duration::from_millis(50), None);
        let err = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_deadline_shortens_call() {
        let guard = guard(Duration::from_secs(300), Some(Duration::from_millis(50)));
        let err = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeadlineExceeded));

        assert!(matches!(guard.check(), Err(AppError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let guard = CallGuard::unbounded();
        guard.token().cancel();

        let err = guard.run(async { Ok::<_, AppError>(()) }).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_during_call() {
        let guard = CallGuard::unbounded();
        let token = guard.token().clone();

        let err = guard
            .run(async move {
                token.cancel();
                std::future::pending::<Result<(), AppError>>().await
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }
}
