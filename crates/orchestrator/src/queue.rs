//! Asynchronous retry queue. Tickets carry the reset counter they observed
//! when scheduled; the consumer re-checks it against the live pipeline and
//! discards stale work instead of running it, leaving an audit event behind.

use std::sync::Arc;

use events::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::context::ExecutorContext;
use crate::error::OrchestratorError;
use crate::executor::{self, RunOptions};
use crate::retry::RetryTicket;

const QUEUE_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct RetryQueue {
    tx: mpsc::Sender<RetryTicket>,
}

impl RetryQueue {
    /// Spawns the consumer worker. Dropping every queue handle ends the
    /// worker once the channel drains.
    pub fn start(ctx: Arc<ExecutorContext>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let queue = Self { tx: tx.clone() };
        let handle = tokio::spawn(worker(ctx, tx, rx));
        (queue, handle)
    }

    /// Queues a retry ticket. Returns false when the worker is gone.
    pub async fn enqueue(&self, ticket: RetryTicket) -> bool {
        self.tx.send(ticket).await.is_ok()
    }
}

async fn worker(
    ctx: Arc<ExecutorContext>,
    tx: mpsc::Sender<RetryTicket>,
    mut rx: mpsc::Receiver<RetryTicket>,
) {
    while let Some(ticket) = rx.recv().await {
        // Fence before doing any work: a rollback or competing retry moves
        // the counter and invalidates this ticket.
        match ctx.pipelines.get(ticket.pipeline_id).await {
            Ok(pipeline) if pipeline.total_retry_count != ticket.observed_reset_counter => {
                discard(&ctx, &ticket, pipeline.total_retry_count).await;
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    pipeline_id = %ticket.pipeline_id,
                    error = %e,
                    "Dropping retry ticket, pipeline unavailable"
                );
                continue;
            }
        }

        let opts = RunOptions {
            candidates: None,
            delta: Some(ticket.delta.clone()),
            observed_reset_counter: Some(ticket.observed_reset_counter),
        };
        match executor::run_step(&ctx, ticket.pipeline_id, &ticket.owner, ticket.step, opts).await
        {
            Ok(outcome) => {
                info!(
                    pipeline_id = %ticket.pipeline_id,
                    step = ticket.step.number(),
                    verdict = outcome.verdict.as_str(),
                    "Auto-retry completed"
                );
                if let Some(next) = outcome.scheduled_retry {
                    if tx.send(next).await.is_err() {
                        break;
                    }
                }
            }
            // The counter moved between our check and the run's own check.
            Err(OrchestratorError::StaleRetry { current, .. }) => {
                discard(&ctx, &ticket, current).await;
            }
            Err(e) => {
                error!(
                    pipeline_id = %ticket.pipeline_id,
                    step = ticket.step.number(),
                    code = e.code(),
                    error = %e,
                    "Auto-retry failed"
                );
            }
        }
    }
}

async fn discard(ctx: &ExecutorContext, ticket: &RetryTicket, current: u32) {
    warn!(
        pipeline_id = %ticket.pipeline_id,
        step = ticket.step.number(),
        observed = ticket.observed_reset_counter,
        current,
        "Discarding stale retry ticket"
    );
    ctx.emit(Event::RetryDiscarded {
        pipeline_id: ticket.pipeline_id,
        step: ticket.step.number(),
        observed_counter: ticket.observed_reset_counter,
        current_counter: current,
    })
    .await;
}
