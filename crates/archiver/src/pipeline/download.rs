use std::sync::Arc;

use common::work_file_path;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::queue::WorkQueue;
use crate::retry::{retry, RetryError};
use crate::state::SyncState;

#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Identifiers with a confirmed working file, in completion order.
    pub downloaded: Vec<String>,
    pub failed: Vec<String>,
}

/// Fetches every identifier of the snapshot with `download_workers`
/// concurrent workers. A failed item never aborts the others.
pub async fn download_all(
    state: &SyncState,
    snapshot: Arc<[String]>,
    cancel: &CancellationToken,
) -> DownloadReport {
    let queue = Arc::new(WorkQueue::new(snapshot.iter().cloned()));
    let workers = state.settings.download_workers.max(1).min(queue.len().max(1));
    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let state = state.clone();
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        tasks.spawn(async move { download_worker(worker, state, queue, cancel).await });
    }

    let mut report = DownloadReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(part) => {
                report.downloaded.extend(part.downloaded);
                report.failed.extend(part.failed);
            }
            Err(err) => error!("Download worker crashed: {}", err),
        }
    }
    report
}

async fn download_worker(
    worker: usize,
    state: SyncState,
    queue: Arc<WorkQueue>,
    cancel: CancellationToken,
) -> DownloadReport {
    let mut report = DownloadReport::default();
    let settings = &state.settings;
    let fetcher = &state.tools.fetcher;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let id = match queue.pop() {
            Some(id) => id,
            None => break,
        };
        let label = format!("download of {}", id);
        match retry(settings.fetch_retry, &cancel, &label, |_| {
            fetcher.fetch(&id, &settings.work_dir)
        })
        .await
        {
            Ok(()) => info!("[worker {}] Downloaded {}", worker, id),
            Err(RetryError::Exhausted(err)) => {
                warn!("[worker {}] Giving up on {}: {}", worker, id, err)
            }
            Err(RetryError::Cancelled) => {
                report.failed.push(id);
                break;
            }
        }

        let work_path = work_file_path(&settings.work_dir, &id);
        match tokio::fs::try_exists(&work_path).await {
            Ok(true) => report.downloaded.push(id),
            Ok(false) => {
                warn!("No working file for {}; excluding it from this run", id);
                report.failed.push(id);
            }
            Err(err) => {
                warn!("Unable to check {:?}: {}", work_path, err);
                report.failed.push(id);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::Harness;
    use crate::retry::RetryPolicy;
    use std::time::Duration;
    use tokio::time::Instant;

    fn snapshot(ids: &[&str]) -> Arc<[String]> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn downloads_every_item() {
        let harness = Harness::new();
        let report = download_all(
            &harness.state,
            snapshot(&["a", "b", "c", "d"]),
            &CancellationToken::new(),
        )
        .await;

        let mut downloaded = report.downloaded.clone();
        downloaded.sort();
        assert_eq!(downloaded, vec!["a", "b", "c", "d"]);
        assert!(report.failed.is_empty());
        assert!(work_file_path(harness.work_dir(), "c").exists());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let harness = Harness::new();
        harness.fetcher.fail("a", 2);

        let report = download_all(&harness.state, snapshot(&["a"]), &CancellationToken::new()).await;

        assert_eq!(report.downloaded, vec!["a"]);
        assert_eq!(harness.fetcher.attempts("a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_item_is_tried_three_times_and_excluded() {
        let mut harness = Harness::with_workers(1);
        let settings = Arc::make_mut(&mut harness.state.settings);
        settings.fetch_retry = RetryPolicy::FETCH;
        harness.fetcher.fail("bad", u32::MAX);

        let started = Instant::now();
        let report = download_all(
            &harness.state,
            snapshot(&["bad", "good"]),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(harness.fetcher.attempts("bad"), 3);
        assert_eq!(report.failed, vec!["bad"]);
        assert_eq!(report.downloaded, vec!["good"]);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn cancelled_run_stops_claiming_work() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = download_all(&harness.state, snapshot(&["a", "b"]), &cancel).await;

        assert!(report.downloaded.is_empty());
        assert_eq!(harness.fetcher.attempts("a"), 0);
    }
}
