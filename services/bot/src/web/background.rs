//! services/bot/src/web/background.rs
//!
//! Detached task submission for side effects that must not block or fail the
//! main response flow, such as recording user profile details.

use shelfbot_core::ports::PortResult;
use std::future::Future;
use tracing::warn;

/// Submits fire-and-forget work. The contract is explicit: the caller is
/// never joined on the task, and errors end in the log, not in the caller's
/// control flow.
#[derive(Clone, Default)]
pub struct BackgroundTasks;

impl BackgroundTasks {
    pub fn new() -> Self {
        Self
    }

    pub fn submit<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = PortResult<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(error) = task.await {
                warn!(task = label, %error, "Background task failed");
            }
        });
    }
}
