//! Cooperative cancellation for a run.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use crate::types::{DocError, Result};

/// Shared cancel flag. Clones observe the same signal.
#[derive(Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Fail fast if the run was cancelled before starting `what`.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(DocError::Cancelled(what.to_string()));
        }
        Ok(())
    }

    /// Race `future` against cancellation; the losing future is dropped.
    pub async fn race<T, F>(&self, what: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(DocError::Cancelled(what.to_string())),
            result = future => result,
        }
    }

    /// Cancel on the first Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing committed work and stopping");
                signal.cancel();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_race_returns_cancelled() {
        let signal = CancelSignal::new();
        let remote = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.cancel();
        });

        let result: Result<()> = signal
            .race("writer overview", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DocError::Cancelled(_))));
        assert!(signal.check("next").is_err());
    }

    #[tokio::test]
    async fn test_race_passes_through() {
        let signal = CancelSignal::new();
        let value = signal.race("scout", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(signal.check("next").is_ok());
    }
}
