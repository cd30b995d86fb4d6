use std::sync::Arc;

use common::work_file_path;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::finish::{blocking, finish_item, FinishError, FinishJob, FinishOutcome};
use super::queue::WorkQueue;
use crate::resolver::Resolution;
use crate::retry::{retry, RetryError};
use crate::state::SyncState;

#[derive(Debug, Default)]
pub struct ProcessReport {
    pub published: Vec<String>,
    pub unchanged: Vec<String>,
    /// Working file vanished before processing.
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ProcessReport {
    fn merge(&mut self, other: ProcessReport) {
        self.published.extend(other.published);
        self.unchanged.extend(other.unchanged);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

enum ItemOutcome {
    Finished(FinishOutcome),
    Missing,
    Cancelled,
}

/// Processes every downloaded identifier with `process_workers` concurrent
/// workers. Failures stay with their item.
pub async fn process_all(
    state: &SyncState,
    downloaded: Vec<String>,
    snapshot: Arc<[String]>,
    cancel: &CancellationToken,
) -> ProcessReport {
    let queue = Arc::new(WorkQueue::new(downloaded));
    let workers = state.settings.process_workers.max(1).min(queue.len().max(1));
    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let state = state.clone();
        let queue = Arc::clone(&queue);
        let snapshot = Arc::clone(&snapshot);
        let cancel = cancel.clone();
        tasks.spawn(async move { process_worker(worker, state, queue, snapshot, cancel).await });
    }

    let mut report = ProcessReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(part) => report.merge(part),
            Err(err) => error!("Process worker crashed: {}", err),
        }
    }
    report
}

async fn process_worker(
    worker: usize,
    state: SyncState,
    queue: Arc<WorkQueue>,
    snapshot: Arc<[String]>,
    cancel: CancellationToken,
) -> ProcessReport {
    let mut report = ProcessReport::default();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let id = match queue.pop() {
            Some(id) => id,
            None => break,
        };
        let position = snapshot
            .iter()
            .position(|candidate| *candidate == id)
            .map(|index| index + 1)
            .unwrap_or(0);
        info!("[worker {}] Processing {} ({}/{})", worker, id, position, snapshot.len());
        match process_item(&state, &id, position as u32, snapshot.len() as u32, &cancel).await {
            Ok(ItemOutcome::Finished(FinishOutcome::Published { .. })) => report.published.push(id),
            Ok(ItemOutcome::Finished(FinishOutcome::Unchanged { .. })) => {
                info!("Skip {}: archive copy is identical", id);
                report.unchanged.push(id);
            }
            Ok(ItemOutcome::Missing) => {
                warn!("Working file for {} is gone; skipping", id);
                report.skipped.push(id);
            }
            Ok(ItemOutcome::Cancelled) => {
                report.failed.push((id, "cancelled".to_string()));
                break;
            }
            Err(err) => {
                error!("Failed to process {}: {}", id, err);
                report.failed.push((id, err.to_string()));
            }
        }
    }
    report
}

async fn process_item(
    state: &SyncState,
    id: &str,
    track_no: u32,
    track_total: u32,
    cancel: &CancellationToken,
) -> Result<ItemOutcome, FinishError> {
    let work_path = work_file_path(&state.settings.work_dir, id);
    if !tokio::fs::try_exists(&work_path).await? {
        return Ok(ItemOutcome::Missing);
    }

    let label = format!("metadata lookup for {}", id);
    let resolution = match retry(state.settings.lookup_retry, cancel, &label, |_| {
        state.resolver.resolve(id)
    })
    .await
    {
        Ok(resolution) => resolution,
        Err(RetryError::Exhausted(err)) => {
            warn!("Metadata for {} unavailable: {}", id, err);
            Resolution::Unresolved
        }
        Err(RetryError::Cancelled) => return Ok(ItemOutcome::Cancelled),
    };
    if let Resolution::Resolved { source, .. } = &resolution {
        debug!("Metadata for {} resolved from {:?}", id, source);
    }

    let record = {
        let store = state.store.clone();
        let key = id.to_string();
        let title = resolution.title().map(str::to_string);
        blocking(move || store.seed_title(&key, title.as_deref())).await?
    };

    let outcome = finish_item(
        state,
        FinishJob {
            id,
            work_path: &work_path,
            record: &record,
            resolution: &resolution,
            track_no,
            track_total,
        },
    )
    .await?;
    Ok(ItemOutcome::Finished(outcome))
}
