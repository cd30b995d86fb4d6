use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::command::ToolError;
use crate::notify::Notification;
use crate::pipeline::download::download_all;
use crate::pipeline::process::process_all;
use crate::pipeline::reconcile::{prune_orphans, rebuild_index, IndexOutcome};
use crate::state::{RunReport, SyncState};

#[derive(Debug)]
pub enum RunError {
    Config(String),
    WorkDir(io::Error),
    Enumerate(ToolError),
    Archive(io::Error),
    Task(String),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(message) => write!(f, "invalid configuration: {}", message),
            RunError::WorkDir(err) => write!(f, "unable to reset working directory: {}", err),
            RunError::Enumerate(err) => write!(f, "unable to enumerate playlist: {}", err),
            RunError::Archive(err) => write!(f, "archive directory error: {}", err),
            RunError::Task(err) => write!(f, "background task failed: {}", err),
        }
    }
}

impl std::error::Error for RunError {}

/// One synchronization pass. Item failures end up in the report; only
/// orchestration failures are returned as errors.
pub async fn run_once(state: &SyncState, cancel: &CancellationToken) -> Result<RunReport, RunError> {
    let settings = &state.settings;
    if settings.playlist_id.is_empty() {
        return Err(RunError::Config("playlist_id is not set".to_string()));
    }
    if settings.work_dir == settings.archive_dir {
        return Err(RunError::Config(
            "work_dir and archive_dir must be different directories".to_string(),
        ));
    }

    reset_work_dir(&settings.work_dir)
        .await
        .map_err(RunError::WorkDir)?;
    tokio::fs::create_dir_all(&settings.archive_dir)
        .await
        .map_err(RunError::Archive)?;

    let ids = state
        .tools
        .fetcher
        .list_playlist(&settings.playlist_id)
        .await
        .map_err(RunError::Enumerate)?;
    let snapshot: Arc<[String]> = ids.into();
    let mut report = RunReport {
        playlist_len: snapshot.len(),
        ..RunReport::default()
    };
    info!("Found {} items. Downloading...", snapshot.len());

    let downloads = download_all(state, Arc::clone(&snapshot), cancel).await;
    report.downloaded = downloads.downloaded.len();
    report.download_failures = downloads.failed;
    if downloads.downloaded.is_empty() {
        warn!("Nothing was downloaded; skipping processing and reconciliation");
        return Ok(report);
    }
    if cancel.is_cancelled() {
        info!("Run cancelled after downloads");
        return Ok(report);
    }

    let processed = process_all(state, downloads.downloaded, Arc::clone(&snapshot), cancel).await;
    report.published = processed.published;
    report.unchanged = processed.unchanged;
    report.skipped = processed.skipped;
    report.item_failures = processed.failed;
    if cancel.is_cancelled() {
        info!("Run cancelled before reconciliation");
        return Ok(report);
    }

    info!("Deleting tracks removed from the playlist...");
    let archive_dir = settings.archive_dir.clone();
    let index_path = settings.index_path.clone();
    let tagger = Arc::clone(&state.tools.tagger);
    let allowed = Arc::clone(&snapshot);
    let (pruned, index) = tokio::task::spawn_blocking(move || -> io::Result<_> {
        let pruned = prune_orphans(&archive_dir, &allowed, tagger.as_ref())?;
        let index = rebuild_index(&archive_dir, &index_path)?;
        Ok((pruned, index))
    })
    .await
    .map_err(|err| RunError::Task(err.to_string()))?
    .map_err(RunError::Archive)?;

    report.pruned = pruned
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    report.index_written = index == IndexOutcome::Written;

    info!(
        "Done: {} published, {} unchanged, {} skipped, {} failed, {} removed",
        report.published.len(),
        report.unchanged.len(),
        report.skipped.len(),
        report.download_failures.len() + report.item_failures.len(),
        report.pruned.len()
    );
    Ok(report)
}

/// Runs once and reports to the notification sink: a red embed for a failed
/// run, a summary when the archive changed.
pub async fn sync_and_report(
    state: &SyncState,
    cancel: &CancellationToken,
) -> Result<RunReport, RunError> {
    match run_once(state, cancel).await {
        Ok(report) => {
            if report.changed() {
                let summary = Notification::summary(&report);
                if let Err(err) = state.tools.notifier.notify(&summary).await {
                    warn!("Failed to send run summary: {}", err);
                }
            }
            Ok(report)
        }
        Err(err) => {
            error!("Sync failed: {}", err);
            let notification = Notification::run_failed(&err.to_string());
            if let Err(notify_err) = state.tools.notifier.notify(&notification).await {
                warn!("Failed to report sync failure: {}", notify_err);
            }
            Err(err)
        }
    }
}

async fn reset_work_dir(work_dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(work_dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    tokio::fs::create_dir_all(work_dir).await
}
