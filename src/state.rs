use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::services::pipeline::Pipeline;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    /// Cancelled on shutdown; batches derive child tokens from it so that
    /// records not yet started are abandoned.
    pub shutdown: CancellationToken,
    /// Background batches accepted with `202`, awaited by [`AppState::drain`].
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(pipeline: Pipeline, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            shutdown,
            tasks: TaskTracker::new(),
        }
    }

    /// Stop starting new records and wait for every background batch to
    /// return its report. Records already in flight run to completion.
    pub async fn drain(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}
