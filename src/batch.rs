//! Locafoto Vault - Batch Operations
//!
//! Items are processed one at a time. A failure is recorded and the batch
//! moves on; cancellation is checked between items.

use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::Serialize;

use crate::error::VaultResult;

/// Cancellation token that can be cloned and shared across tasks
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation. Takes effect before the next item.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress after each processed item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    /// Label of the item just processed
    pub current: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub label: String,
    /// Error kind, see `VaultError::kind`
    pub kind: &'static str,
    pub message: String,
}

/// Outcome of a batch. Completed items stay completed when later ones fail.
#[derive(Debug, Clone)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
    /// Set when the batch stopped early on cancellation
    pub cancelled: bool,
    pub total: usize,
}

impl<T> BatchReport<T> {
    fn new(total: usize) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
            total,
        }
    }

    /// Items neither processed nor failed because of cancellation
    pub fn skipped(&self) -> usize {
        self.total - self.succeeded.len() - self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.failed.is_empty()
    }
}

/// Run `op` over `inputs` sequentially
pub async fn run_batch<I, T, L, P, F, Fut>(
    inputs: Vec<I>,
    label: L,
    cancel: &CancelToken,
    mut progress: P,
    mut op: F,
) -> BatchReport<T>
where
    L: Fn(&I) -> String,
    P: FnMut(&BatchProgress),
    F: FnMut(I) -> Fut,
    Fut: Future<Output = VaultResult<T>>,
{
    let total = inputs.len();
    let mut report = BatchReport::new(total);

    for (index, input) in inputs.into_iter().enumerate() {
        if cancel.is_cancelled() {
            log::info!("batch cancelled after {} of {} items", index, total);
            report.cancelled = true;
            break;
        }

        let current = label(&input);
        match op(input).await {
            Ok(value) => report.succeeded.push(value),
            Err(e) => {
                log::warn!("batch item {} failed: {}", current, e);
                report.failed.push(BatchFailure {
                    label: current.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }

        progress(&BatchProgress {
            completed: index + 1,
            total,
            current,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VaultError;

    #[tokio::test]
    async fn test_failures_do_not_abort() {
        let cancel = CancelToken::new();
        let mut seen = Vec::new();

        let report = run_batch(
            vec![1u32, 2, 3, 4],
            |n| format!("item-{}", n),
            &cancel,
            |p| seen.push(p.completed),
            |n| async move {
                if n == 2 {
                    Err(VaultError::Authentication)
                } else {
                    Ok(n * 10)
                }
            },
        )
        .await;

        assert_eq!(report.succeeded, vec![10, 30, 40]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].label, "item-2");
        assert_eq!(report.failed[0].kind, "authentication");
        assert!(!report.cancelled);
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_cancel_between_items() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();

        let report = run_batch(
            vec![1u32, 2, 3],
            |n| n.to_string(),
            &cancel,
            |_| {},
            |n| {
                if n == 2 {
                    trigger.cancel();
                }
                async move { Ok(n) }
            },
        )
        .await;

        // The item in flight finishes; the rest are skipped
        assert_eq!(report.succeeded, vec![1, 2]);
        assert!(report.cancelled);
        assert_eq!(report.skipped(), 1);
        assert!(!report.is_complete_success());
    }
}
