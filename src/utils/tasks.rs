//! Concurrent task-group helpers
//!
//! Fans a set of fallible async checks out concurrently and collects the
//! per-task outcomes, keeping partial-failure detail instead of flattening
//! everything into one settled array.

use futures::future::join_all;

/// Collected outcome of a task group
#[derive(Debug)]
pub struct TaskGroupOutcome<T, E> {
    pub succeeded: Vec<T>,
    pub failed: Vec<E>,
}

impl<T, E> TaskGroupOutcome<T, E> {
    /// True when no task failed
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run all tasks concurrently and partition their results
pub async fn join_settled<T, E, Fut>(tasks: Vec<Fut>) -> TaskGroupOutcome<T, E>
where
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut outcome = TaskGroupOutcome {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for result in join_all(tasks).await {
        match result {
            Ok(value) => outcome.succeeded.push(value),
            Err(error) => outcome.failed.push(error),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_partitions_results() {
        let tasks: Vec<_> = (0..4)
            .map(|i| async move {
                if i % 2 == 0 {
                    Ok::<_, String>(i)
                } else {
                    Err(format!("task {i} failed"))
                }
            })
            .collect();
        let outcome = join_settled(tasks).await;
        assert_eq!(outcome.succeeded, vec![0, 2]);
        assert_eq!(outcome.failed.len(), 2);
        assert!(!outcome.all_succeeded());
    }
}
