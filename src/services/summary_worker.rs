use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    db::RecommendationStore,
    error::AppResult,
    services::summary::{SummaryEnricher, SummaryEvidence},
};

/// Places refreshed per queued request.
const PLACES_PER_TASK: i64 = 20;

/// A request whose board should get summaries backfilled.
#[derive(Debug, Clone)]
pub struct SummaryTask {
    pub slug: String,
}

/// Queue feeding the background summary worker.
///
/// Enqueuing happens after a submission commits, so the worker only ever
/// sees durable state; a dropped task is re-derived by the next
/// submission to the same board.
#[derive(Clone)]
pub struct SummaryQueue {
    task_tx: mpsc::UnboundedSender<SummaryTask>,
}

/// Handle for gracefully shutting down the summary worker.
pub struct SummaryWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SummaryWorkerHandle {
    /// Signals the worker to drain queued tasks and stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Summary worker shutdown signal sent");
    }
}

impl SummaryQueue {
    /// Spawns the background worker and returns the queue plus its
    /// shutdown handle.
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        summaries: Arc<dyn SummaryEnricher>,
    ) -> (Self, SummaryWorkerHandle) {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            summary_worker_task(store, summaries, task_rx, shutdown_rx).await;
        });

        (Self { task_tx }, SummaryWorkerHandle { shutdown_tx })
    }

    /// Queues a board for summary backfill without blocking the caller.
    pub fn enqueue(&self, slug: &str) {
        let task = SummaryTask {
            slug: slug.to_string(),
        };
        if let Err(e) = self.task_tx.send(task) {
            tracing::error!(error = %e, "Failed to enqueue summary task");
        }
    }
}

/// Background task that backfills summaries for queued boards.
///
/// On shutdown signal, drains all remaining tasks before exiting.
async fn summary_worker_task(
    store: Arc<dyn RecommendationStore>,
    summaries: Arc<dyn SummaryEnricher>,
    mut task_rx: mpsc::UnboundedReceiver<SummaryTask>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    tracing::info!("Summary worker task started");

    loop {
        tokio::select! {
            Some(task) = task_rx.recv() => {
                if let Err(e) = process_task(store.as_ref(), summaries.as_ref(), &task).await {
                    tracing::error!(error = %e, slug = %task.slug, "Summary task failed");
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Summary worker shutting down, draining remaining tasks");

                while let Ok(task) = task_rx.try_recv() {
                    if let Err(e) = process_task(store.as_ref(), summaries.as_ref(), &task).await {
                        tracing::error!(error = %e, slug = %task.slug, "Summary task failed during drain");
                    }
                }

                tracing::info!("Summary worker task stopped");
                break;
            }
        }
    }
}

/// Generates and stores a summary for each board place that lacks one.
/// A failed generation is skipped; the next enqueue retries it.
async fn process_task(
    store: &dyn RecommendationStore,
    summaries: &dyn SummaryEnricher,
    task: &SummaryTask,
) -> AppResult<()> {
    let aggregated = store.list_aggregated(&task.slug, PLACES_PER_TASK).await?;
    if aggregated.is_empty() {
        return Ok(());
    }

    let external_ids: Vec<String> = aggregated
        .iter()
        .map(|a| a.place.external_id.clone())
        .collect();
    let mut enrichment = store.enrichment_for(&external_ids).await?;
    let mut user_tags = store.user_tags(&task.slug, &external_ids).await?;

    let mut generated = 0usize;
    for aggregate in &aggregated {
        let place = &aggregate.place;
        if store.has_summary(&place.external_id).await? {
            continue;
        }

        let place_enrichment = enrichment.remove(&place.external_id);
        let evidence = SummaryEvidence {
            place_name: place.place_name.clone(),
            category_name: place.category_name.clone(),
            rating: place_enrichment.as_ref().and_then(|e| e.rating),
            rating_count: place_enrichment.as_ref().and_then(|e| e.rating_count),
            review_snippets: place_enrichment.and_then(|e| e.review_snippets),
            user_tags: user_tags.remove(&place.external_id),
        };

        let Some(summary_text) = summaries.summarize(&evidence).await else {
            continue;
        };

        store
            .save_summary(&place.external_id, &summary_text, &evidence.to_json())
            .await?;
        generated += 1;
    }

    if generated > 0 {
        tracing::info!(slug = %task.slug, generated, "Summaries backfilled");
    }

    Ok(())
}
