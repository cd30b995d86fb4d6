use std::path::PathBuf;
use std::sync::Arc;

use common::ForbiddenChars;
use tracks::TrackStore;

use crate::pipeline::{ArtworkSource, AudioProcessor, Fetcher, Fingerprinter, Notifier, Tagger};
use crate::resolver::Resolver;
use crate::retry::RetryPolicy;

/// External tools and services used by a run.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub audio: Arc<dyn AudioProcessor>,
    pub fingerprinter: Arc<dyn Fingerprinter>,
    pub artwork: Arc<dyn ArtworkSource>,
    pub notifier: Arc<dyn Notifier>,
    pub tagger: Arc<dyn Tagger>,
}

#[derive(Clone, Debug)]
pub struct SyncSettings {
    pub playlist_id: String,
    pub archive_dir: PathBuf,
    pub work_dir: PathBuf,
    pub index_path: PathBuf,
    pub forbidden: ForbiddenChars,
    pub compilation_suffix: String,
    pub download_workers: usize,
    pub process_workers: usize,
    pub fetch_retry: RetryPolicy,
    pub lookup_retry: RetryPolicy,
}

#[derive(Clone)]
pub struct SyncState {
    pub settings: Arc<SyncSettings>,
    pub tools: Collaborators,
    pub store: TrackStore,
    pub resolver: Resolver,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub playlist_len: usize,
    pub downloaded: usize,
    pub download_failures: Vec<String>,
    pub published: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<String>,
    pub item_failures: Vec<(String, String)>,
    pub pruned: Vec<String>,
    pub index_written: bool,
}

impl RunReport {
    /// Whether the archive was touched.
    pub fn changed(&self) -> bool {
        !self.published.is_empty() || !self.pruned.is_empty() || self.index_written
    }
}
