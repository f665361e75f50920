//! Bounded worker pool for independent requests.
//!
//! Items run concurrently on at most `max_workers` tasks. Each result is written into the slot
//! of its input position, so the returned vector lines up with the input regardless of the order
//! in which workers finish. A failing item produces a [`BatchOutcome::Failed`] marker and never
//! aborts the rest of the batch.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::retry::Retryable;

/// Result slot for one batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome<T> {
    /// The item produced a value.
    Completed(T),
    /// The item failed; the rest of the batch still ran.
    Failed {
        /// Rendered error.
        error: String,
        /// Whether the failure was transient (retries exhausted).
        transient: bool,
    },
}

impl<T> BatchOutcome<T> {
    /// Whether the item succeeded.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Borrow the value of a completed item.
    pub fn completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }
}

/// Run `task` over `items` with at most `max_workers` in flight, preserving input order.
///
/// `max_workers` below one is treated as one. The task receives the item's index alongside the
/// item; any shared state must be captured read-only.
pub async fn run_bounded<I, T, E, F, Fut>(
    items: Vec<I>,
    max_workers: usize,
    task: F,
) -> Vec<BatchOutcome<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    E: Retryable + Display + Send + 'static,
    F: Fn(usize, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let total = items.len();
    let workers = max_workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    let task = Arc::new(task);
    let mut slots: Vec<Option<BatchOutcome<T>>> = (0..total).map(|_| None).collect();
    let mut positions = HashMap::with_capacity(total);
    let mut set = JoinSet::new();

    tracing::info!(items = total, workers, "Starting batch");

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let task = task.clone();
        let handle = set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return BatchOutcome::Failed {
                    error: "worker pool closed".into(),
                    transient: false,
                };
            };
            match task(index, item).await {
                Ok(value) => BatchOutcome::Completed(value),
                Err(error) => {
                    let transient = error.is_transient();
                    tracing::error!(index, transient, error = %error, "Batch item failed");
                    BatchOutcome::Failed {
                        error: error.to_string(),
                        transient,
                    }
                }
            }
        });
        positions.insert(handle.id(), index);
    }

    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((id, outcome)) => {
                if let Some(&index) = positions.get(&id) {
                    slots[index] = Some(outcome);
                }
            }
            Err(join_error) => {
                let id = join_error.id();
                tracing::error!(error = %join_error, "Batch worker aborted");
                if let Some(&index) = positions.get(&id) {
                    slots[index] = Some(BatchOutcome::Failed {
                        error: format!("worker aborted: {join_error}"),
                        transient: false,
                    });
                }
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| BatchOutcome::Failed {
                error: "unknown failure".into(),
                transient: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, FatalKind, TransientKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn results_follow_input_order() {
        let items: Vec<u64> = vec![40, 5, 25, 1, 10];
        let outcomes = run_bounded(items.clone(), 3, |_, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, CompletionError>(delay * 2)
        })
        .await;

        let values: Vec<u64> = outcomes
            .iter()
            .map(|outcome| *outcome.completed().expect("completed"))
            .collect();
        assert_eq!(values, vec![80, 10, 50, 2, 20]);
    }

    #[tokio::test]
    async fn never_exceeds_worker_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (active_ref, peak_ref) = (active.clone(), peak.clone());

        let outcomes = run_bounded((0..12).collect::<Vec<u32>>(), 2, move |_, item| {
            let active = active_ref.clone();
            let peak = peak_ref.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, CompletionError>(item)
            }
        })
        .await;

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.iter().all(BatchOutcome::is_completed));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failures_are_recorded_per_item() {
        let items = vec!["ok", "fatal", "transient", "ok"];
        let outcomes = run_bounded(items, 2, |_, item| async move {
            match item {
                "fatal" => Err(CompletionError::fatal(FatalKind::Authentication, "401")),
                "transient" => Err(CompletionError::transient(TransientKind::RateLimited, "429")),
                other => Ok(other.to_uppercase()),
            }
        })
        .await;

        assert_eq!(outcomes[0], BatchOutcome::Completed("OK".to_string()));
        assert!(matches!(
            &outcomes[1],
            BatchOutcome::Failed { transient: false, error } if error.contains("401")
        ));
        assert!(matches!(
            &outcomes[2],
            BatchOutcome::Failed {
                transient: true,
                ..
            }
        ));
        assert_eq!(outcomes[3], BatchOutcome::Completed("OK".to_string()));
    }

    #[tokio::test]
    async fn panicking_worker_becomes_failure_marker() {
        let outcomes = run_bounded(vec![1u8, 2, 3], 1, |index, item| async move {
            if index == 1 {
                panic!("boom");
            }
            Ok::<_, CompletionError>(item)
        })
        .await;

        assert_eq!(outcomes[0], BatchOutcome::Completed(1));
        assert!(matches!(
            &outcomes[1],
            BatchOutcome::Failed { error, .. } if error.contains("worker aborted")
        ));
        assert_eq!(outcomes[2], BatchOutcome::Completed(3));
    }

    #[tokio::test]
    async fn empty_batch_returns_no_slots() {
        let outcomes = run_bounded(Vec::<u8>::new(), 4, |_, item| async move {
            Ok::<_, CompletionError>(item)
        })
        .await;
        assert!(outcomes.is_empty());
    }
}
