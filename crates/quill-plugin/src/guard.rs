//! Bounded execution of extension-supplied code.
//!
//! Every callback and handler runs on its own task so that a panic is
//! contained and reported like any other failure. When the time bound
//! elapses the runtime stops waiting and the task is left detached; no
//! cancellation signal is sent, so its side effects may or may not
//! complete.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinError;

/// Why a supervised call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GuardFailure {
    /// The callback returned an error.
    Failed(String),
    /// The callback panicked.
    Panicked(String),
    /// The callback did not finish within the bound.
    TimedOut,
}

impl GuardFailure {
    /// Human-readable cause, used in `HookExecution`/`Callback` errors.
    pub(crate) fn cause(&self) -> String {
        match self {
            Self::Failed(message) => message.clone(),
            Self::Panicked(message) => format!("panicked: {message}"),
            Self::TimedOut => "timed out".to_string(),
        }
    }
}

/// Runs `task` on a separate task and waits at most `limit` for it.
pub(crate) async fn supervise<T, F>(limit: Duration, task: F) -> Result<T, GuardFailure>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(task);

    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(GuardFailure::Failed(format!("{e:#}"))),
        Ok(Err(join)) => Err(join_failure(join)),
        Err(_) => Err(GuardFailure::TimedOut),
    }
}

fn join_failure(join: JoinError) -> GuardFailure {
    if !join.is_panic() {
        return GuardFailure::Failed("task was cancelled".to_string());
    }

    let panic = join.into_panic();
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    GuardFailure::Panicked(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_value_through() {
        let value = supervise(Duration::from_secs(1), async { Ok(41 + 1) }).await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test]
    async fn test_error_is_captured_with_context_chain() {
        let result: Result<(), _> = supervise(Duration::from_secs(1), async {
            Err(anyhow::anyhow!("disk full").context("writing cache"))
        })
        .await;
        assert_eq!(
            result,
            Err(GuardFailure::Failed("writing cache: disk full".to_string()))
        );
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let explode = true;
        let result: Result<(), _> = supervise(Duration::from_secs(1), async move {
            if explode {
                panic!("handler exploded");
            }
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(GuardFailure::Panicked("handler exploded".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_waiting() {
        let result: Result<(), _> = supervise(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(GuardFailure::TimedOut));
        assert_eq!(GuardFailure::TimedOut.cause(), "timed out");
    }
}
