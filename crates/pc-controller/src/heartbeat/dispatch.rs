//! Task dispatch

use std::sync::Arc;

use pc_core::traits::TaskHandler;
use pc_core::types::Task;

use crate::guard::isolate;

/// Outcome of dispatching one heartbeat's tasks
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub handled: usize,
    pub failed: usize,
}

/// Hands tasks to the task handler one at a time, in the order received.
///
/// Every task runs in its own recovered scope: an error or panic while
/// handling one task is logged and the next task still runs.
#[derive(Clone)]
pub struct TaskDispatcher {
    handler: Arc<dyn TaskHandler>,
}

impl TaskDispatcher {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        Self { handler }
    }

    pub async fn dispatch(&self, tasks: &[Task]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for task in tasks {
            tracing::info!(task_id = %task.id, "Handling task {}", task);
            match isolate("task dispatch", self.handler.handle(task)).await {
                Some(Ok(())) => summary.handled += 1,
                Some(Err(e)) => {
                    tracing::error!(task_id = %task.id, error = %e, "Task failed");
                    summary.failed += 1;
                }
                None => summary.failed += 1,
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHandler;
    use async_trait::async_trait;
    use pc_core::error::TaskError;

    fn tasks(ids: &[&str]) -> Vec<Task> {
        ids.iter().map(|id| Task::new(*id, "kill_session", "s")).collect()
    }

    #[tokio::test]
    async fn test_tasks_run_in_order() {
        let handler = Arc::new(RecordingHandler::new());
        let dispatcher = TaskDispatcher::new(handler.clone());

        let summary = dispatcher.dispatch(&tasks(&["t1", "t2", "t3"])).await;

        assert_eq!(summary, DispatchSummary { handled: 3, failed: 0 });
        assert_eq!(handler.handled(), vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_failed_task_does_not_block_the_rest() {
        let handler = Arc::new(RecordingHandler::new());
        handler.fail_on("t2");
        let dispatcher = TaskDispatcher::new(handler.clone());

        let summary = dispatcher.dispatch(&tasks(&["t1", "t2", "t3"])).await;

        assert_eq!(summary, DispatchSummary { handled: 2, failed: 1 });
        assert_eq!(handler.handled(), vec!["t1", "t2", "t3"]);
    }

    struct PanicsOnFirst(RecordingHandler);

    #[async_trait]
    impl TaskHandler for PanicsOnFirst {
        async fn handle(&self, task: &Task) -> Result<(), TaskError> {
            if task.id == "t1" {
                panic!("handler bug");
            }
            self.0.handle(task).await
        }
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let handler = Arc::new(PanicsOnFirst(RecordingHandler::new()));
        let dispatcher = TaskDispatcher::new(handler.clone());

        let summary = dispatcher.dispatch(&tasks(&["t1", "t2"])).await;

        assert_eq!(summary, DispatchSummary { handled: 1, failed: 1 });
        assert_eq!(handler.0.handled(), vec!["t2"]);
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let dispatcher = TaskDispatcher::new(Arc::new(RecordingHandler::new()));
        assert_eq!(dispatcher.dispatch(&[]).await, DispatchSummary::default());
    }
}
