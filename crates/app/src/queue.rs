//! In-process queue fan-out
//!
//! Creates queued entries, records a message id for each, then lets a pool
//! of workers drain a tokio channel and resume the entries. Message ids are
//! written before anything is sent, so a worker never races the handshake.

use std::sync::Arc;

use tidemark_core::SyncService;
use tidemark_domain::{QueueBehavior, Result, SyncTriggerType, TidemarkError};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::context::AppContext;

/// One message on the in-process queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub entry_id: String,
}

/// What the workers did with the queued entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueReport {
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
    /// Entries already leased, finished, or rejected by eligibility
    pub skipped: usize,
}

impl QueueReport {
    fn absorb(&mut self, other: Self) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<QueueMessage>>>;

/// Fan out every entity and drain the queue with `workers` workers.
///
/// # Errors
/// Returns an error when entries cannot be created or their message ids
/// cannot be recorded. Per-entry failures are counted, not returned.
#[instrument(skip(ctx, cancel))]
pub async fn run_queue_fan_out(
    ctx: &AppContext,
    trigger_type: SyncTriggerType,
    behavior: QueueBehavior,
    workers: usize,
    cancel: &CancellationToken,
) -> Result<QueueReport> {
    let entries =
        ctx.queue_service.create_all_queued_sync_entries(trigger_type, behavior, cancel).await?;

    let mut messages = Vec::with_capacity(entries.len());
    for entry in &entries {
        let message_id = format!("msg_{}", Uuid::new_v4().simple());
        ctx.queue_service.record_queue_message_id(&entry.id, &message_id, cancel).await?;
        messages.push(QueueMessage { message_id, entry_id: entry.id.clone() });
    }

    let (tx, rx) = mpsc::channel(messages.len().max(1));
    for message in messages {
        debug!(message_id = %message.message_id, entry_id = %message.entry_id, "Enqueued");
        tx.send(message)
            .await
            .map_err(|e| TidemarkError::Internal(format!("queue channel closed: {e}")))?;
    }
    drop(tx);

    let rx: SharedReceiver = Arc::new(Mutex::new(rx));
    let handles: Vec<_> = (0..workers.max(1))
        .map(|worker| {
            tokio::spawn(worker_loop(
                worker,
                Arc::clone(&ctx.sync_service),
                Arc::clone(&rx),
                cancel.clone(),
            ))
        })
        .collect();

    let mut report = QueueReport { queued: entries.len(), ..QueueReport::default() };
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| TidemarkError::Internal(format!("queue worker failed: {e}")))?;
        report.absorb(outcome);
    }

    info!(
        queued = report.queued,
        completed = report.completed,
        failed = report.failed,
        skipped = report.skipped,
        "Queue drained"
    );
    Ok(report)
}

async fn worker_loop(
    worker: usize,
    service: Arc<SyncService>,
    rx: SharedReceiver,
    cancel: CancellationToken,
) -> QueueReport {
    let mut report = QueueReport::default();

    loop {
        if cancel.is_cancelled() {
            warn!(worker, "Queue worker cancelled");
            break;
        }

        let Some(message) = rx.lock().await.recv().await else {
            break;
        };

        match service.sync_queued_entry(&message.entry_id, &cancel).await {
            Ok(Some(result)) if result.success => report.completed += 1,
            Ok(Some(_)) => report.failed += 1,
            Ok(None) => report.skipped += 1,
            Err(err) => {
                error!(worker, message_id = %message.message_id, error = %err, "Queued sync failed");
                report.failed += 1;
            }
        }
    }

    report
}
