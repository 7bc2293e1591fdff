use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::repository::RepositoryState;

pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// ViewCounter
///
/// Best-effort view counting. Reads enqueue a post id and return immediately; one
/// worker task drains the queue and issues the increments. A full queue drops the
/// increment, and storage errors are logged and swallowed.
///
/// The worker stops once every `ViewCounter` clone is dropped and the queue is empty.
#[derive(Clone)]
pub struct ViewCounter {
    sender: mpsc::Sender<Uuid>,
}

impl ViewCounter {
    pub fn start(repo: RepositoryState, depth: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Uuid>(depth.max(1));

        let worker = tokio::spawn(async move {
            while let Some(post_id) = receiver.recv().await {
                if let Err(e) = repo.increment_view_count(post_id).await {
                    tracing::warn!(post_id = %post_id, error = %e, "view count increment failed");
                }
            }
            tracing::debug!("view counter queue closed");
        });

        (Self { sender }, worker)
    }

    /// Enqueues one view. Returns `false` if the increment was dropped.
    pub fn record(&self, post_id: Uuid) -> bool {
        match self.sender.try_send(post_id) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(post_id = %post_id, "view queue full, increment dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(post_id = %post_id, "view counter worker is gone");
                false
            }
        }
    }
}
