//! Detached background tasks.
//!
//! Refreshes run after the response has already been handed back, so their
//! failures can only be logged. Every spawn goes through [`BackgroundTasks`],
//! which swallows errors and panics and lets shutdown wait for stragglers.

use std::future::Future;
use std::sync::Mutex;

use offcache_core::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` detached. An `Err` is logged under `label` and dropped.
    pub fn spawn<F>(&self, label: &'static str, target: String, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::warn!(task = label, target = %target, error = %e, "background task failed");
            }
        });

        let mut handles = self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Tasks spawned and not yet finished.
    pub fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every outstanding task, including ones spawned while waiting.
    pub async fn settle(&self) {
        loop {
            let batch = {
                let mut handles = self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *handles)
            };
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "background task aborted");
                }
            }
        }
    }
}
