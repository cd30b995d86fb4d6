use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{archive_filename, origin_url, tag_artist, TrackRecord};
use metadata::{MetadataError, TagUpdate};
use tracing::{debug, info, warn};
use tracks::TrackStoreError;

use super::archive::{publish_file, stale_files};
use super::Tagger;
use crate::command::ToolError;
use crate::notify::Notification;
use crate::resolver::Resolution;
use crate::state::SyncState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishOutcome {
    Published { file_name: String },
    /// The archive already holds the same audio under the target name.
    Unchanged { file_name: String },
}

#[derive(Debug)]
pub enum FinishError {
    Normalize(ToolError),
    Trim(ToolError),
    Fingerprint(ToolError),
    Tag(MetadataError),
    Store(TrackStoreError),
    Io(std::io::Error),
    Task(String),
}

impl std::fmt::Display for FinishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishError::Normalize(err) => write!(f, "normalize failed: {}", err),
            FinishError::Trim(err) => write!(f, "silence trim failed: {}", err),
            FinishError::Fingerprint(err) => write!(f, "fingerprint failed: {}", err),
            FinishError::Tag(err) => write!(f, "tagging failed: {}", err),
            FinishError::Store(err) => write!(f, "track store error: {}", err),
            FinishError::Io(err) => write!(f, "io error: {}", err),
            FinishError::Task(err) => write!(f, "worker task failed: {}", err),
        }
    }
}

impl std::error::Error for FinishError {}

impl From<MetadataError> for FinishError {
    fn from(err: MetadataError) -> Self {
        FinishError::Tag(err)
    }
}

impl From<TrackStoreError> for FinishError {
    fn from(err: TrackStoreError) -> Self {
        FinishError::Store(err)
    }
}

impl From<std::io::Error> for FinishError {
    fn from(err: std::io::Error) -> Self {
        FinishError::Io(err)
    }
}

pub struct FinishJob<'a> {
    pub id: &'a str,
    pub work_path: &'a Path,
    pub record: &'a TrackRecord,
    pub resolution: &'a Resolution,
    pub track_no: u32,
    pub track_total: u32,
}

pub(crate) async fn blocking<T, E, F>(op: F) -> Result<T, FinishError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<FinishError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| FinishError::Task(err.to_string()))?
        .map_err(Into::into)
}

async fn with_tagger<T, F>(tagger: &Arc<dyn Tagger>, path: &Path, op: F) -> Result<T, FinishError>
where
    F: FnOnce(&dyn Tagger, &Path) -> Result<T, MetadataError> + Send + 'static,
    T: Send + 'static,
{
    let tagger = Arc::clone(tagger);
    let path = path.to_path_buf();
    blocking(move || op(tagger.as_ref(), &path)).await
}

/// Turns a downloaded working file into a published archive file.
pub async fn finish_item(state: &SyncState, job: FinishJob<'_>) -> Result<FinishOutcome, FinishError> {
    let settings = &state.settings;
    let tools = &state.tools;
    let id = job.id;
    let work_path = job.work_path;

    tools
        .audio
        .normalize(work_path)
        .await
        .map_err(FinishError::Normalize)?;
    tools
        .audio
        .trim_silence(work_path)
        .await
        .map_err(FinishError::Trim)?;

    let update = TagUpdate {
        title_artist: job
            .record
            .title_and_artist()
            .map(|(title, artist)| (title.to_string(), tag_artist(artist))),
        origin_url: origin_url(id),
        track_no: job.track_no,
        track_total: job.track_total,
    };
    with_tagger(&tools.tagger, work_path, move |tagger, path| {
        tagger.write_tags(path, &update)
    })
    .await?;

    attach_artwork(state, id, work_path, job.resolution).await;

    let file_name = archive_filename(
        id,
        job.record.title(),
        job.record.artist(),
        &settings.forbidden,
    );

    let archive_dir = settings.archive_dir.clone();
    let stale = {
        let tagger = Arc::clone(&tools.tagger);
        let id = id.to_string();
        let keep = file_name.clone();
        blocking(move || stale_files(&archive_dir, &id, &keep, tagger.as_ref())).await?
    };
    for path in stale {
        info!("Removing {:?}, superseded by {}", path, file_name);
        tokio::fs::remove_file(&path).await?;
    }

    let target = settings.archive_dir.join(&file_name);
    if tokio::fs::try_exists(&target).await? {
        let archived = tools
            .fingerprinter
            .fingerprint(&target)
            .await
            .map_err(FinishError::Fingerprint)?;
        let fresh = tools
            .fingerprinter
            .fingerprint(work_path)
            .await
            .map_err(FinishError::Fingerprint)?;
        if archived == fresh {
            debug!("{} is unchanged", file_name);
            tokio::fs::remove_file(work_path).await?;
            return Ok(FinishOutcome::Unchanged { file_name });
        }
    }

    let src: PathBuf = work_path.to_path_buf();
    let dest = target.clone();
    blocking(move || publish_file(&src, &dest)).await?;
    tokio::fs::remove_file(work_path).await?;
    info!("Published {}", file_name);

    let notification = Notification::published(id, job.record, &file_name);
    if let Err(err) = tools.notifier.notify(&notification).await {
        warn!("Failed to send notification for {}: {}", id, err);
    }

    Ok(FinishOutcome::Published { file_name })
}

/// Compilation uploads get a square crop replacing whatever is embedded;
/// anything else only gets the plain thumbnail when no artwork is present.
async fn attach_artwork(state: &SyncState, id: &str, work_path: &Path, resolution: &Resolution) {
    let suffix = state.settings.compilation_suffix.as_str();
    let square = !suffix.is_empty()
        && resolution
            .artist()
            .map(|artist| artist.ends_with(suffix))
            .unwrap_or(false);

    if !square {
        match with_tagger(&state.tools.tagger, work_path, |tagger, path| tagger.has_cover(path)).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(err) => {
                warn!("Unable to inspect artwork of {}: {}", id, err);
                return;
            }
        }
    }

    let cover = match state.tools.artwork.thumbnail(id, square).await {
        Ok(cover) => cover,
        Err(err) => {
            warn!("Thumbnail for {} unavailable: {}", id, err);
            return;
        }
    };
    if let Err(err) = with_tagger(&state.tools.tagger, work_path, move |tagger, path| {
        tagger.replace_cover(path, &cover)
    })
    .await
    {
        warn!("Failed to embed artwork for {}: {}", id, err);
    }
}
