//! In-memory collaborators for coordinator tests.
//!
//! Fake audio files are text files of sorted `key=value` lines. The fetcher
//! writes an `audio` line, the fake tools add marker lines and the fake tagger
//! stores tags as further lines, so the whole file content doubles as its
//! fingerprint.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{id_from_origin_url, work_file_path, ForbiddenChars, TrackRecord};
use metadata::{CoverArt, MetadataError, TagUpdate};
use parking_lot::Mutex;
use tempfile::TempDir;
use tracks::TrackStore;

use super::{
    ArtworkSource, AudioProcessor, Fetcher, Fingerprinter, MetadataLookup, Notifier, Tagger,
};
use crate::command::ToolError;
use crate::notify::Notification;
use crate::resolver::{Resolution, ResolutionSource, Resolver};
use crate::retry::RetryPolicy;
use crate::state::{Collaborators, SyncSettings, SyncState};

pub fn read_fields(path: &Path) -> io::Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect())
}

pub fn write_fields(path: &Path, fields: &BTreeMap<String, String>) -> io::Result<()> {
    let text: String = fields
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();
    fs::write(path, text)
}

fn tool_failure(program: &str, message: &str) -> ToolError {
    ToolError::Failed {
        program: program.to_string(),
        code: Some(1),
        stderr: message.to_string(),
    }
}

fn file_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Default)]
pub struct FakeFetcher {
    playlist: Mutex<Vec<String>>,
    list_error: Mutex<Option<String>>,
    failures: Mutex<HashMap<String, u32>>,
    payloads: Mutex<HashMap<String, String>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl FakeFetcher {
    pub fn set_playlist(&self, ids: &[&str]) {
        *self.playlist.lock() = ids.iter().map(|id| id.to_string()).collect();
    }

    pub fn fail_listing(&self, message: &str) {
        *self.list_error.lock() = Some(message.to_string());
    }

    /// The next `times` fetches of `id` fail.
    pub fn fail(&self, id: &str, times: u32) {
        self.failures.lock().insert(id.to_string(), times);
    }

    pub fn set_payload(&self, id: &str, payload: &str) {
        self.payloads.lock().insert(id.to_string(), payload.to_string());
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.attempts.lock().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn list_playlist(&self, _playlist_id: &str) -> Result<Vec<String>, ToolError> {
        if let Some(message) = self.list_error.lock().clone() {
            return Err(tool_failure("fake-list", &message));
        }
        Ok(self.playlist.lock().clone())
    }

    async fn fetch(&self, id: &str, work_dir: &Path) -> Result<(), ToolError> {
        *self.attempts.lock().entry(id.to_string()).or_insert(0) += 1;
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(tool_failure("fake-fetch", "unavailable"));
                }
            }
        }
        let payload = self
            .payloads
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("audio of {}", id));
        let mut fields = BTreeMap::new();
        fields.insert("audio".to_string(), payload);
        write_fields(&work_file_path(work_dir, id), &fields)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAudio {
    fail_normalize: Mutex<Vec<String>>,
    normalized: Mutex<Vec<String>>,
}

impl FakeAudio {
    pub fn fail_normalize(&self, id: &str) {
        self.fail_normalize.lock().push(id.to_string());
    }

    pub fn normalized(&self) -> Vec<String> {
        self.normalized.lock().clone()
    }

    fn mark(path: &Path, key: &str) -> Result<(), ToolError> {
        let mut fields = read_fields(path)?;
        fields.insert(key.to_string(), "yes".to_string());
        write_fields(path, &fields)?;
        Ok(())
    }
}

#[async_trait]
impl AudioProcessor for FakeAudio {
    async fn normalize(&self, path: &Path) -> Result<(), ToolError> {
        let id = file_id(path);
        if self.fail_normalize.lock().contains(&id) {
            return Err(tool_failure("fake-gain", "corrupt stream"));
        }
        self.normalized.lock().push(id);
        Self::mark(path, "normalized")
    }

    async fn trim_silence(&self, path: &Path) -> Result<(), ToolError> {
        Self::mark(path, "trimmed")
    }
}

#[derive(Default)]
pub struct FakeFingerprinter;

#[async_trait]
impl Fingerprinter for FakeFingerprinter {
    async fn fingerprint(&self, path: &Path) -> Result<String, ToolError> {
        Ok(fs::read_to_string(path)?)
    }
}

#[derive(Default)]
pub struct FakeLookup {
    answers: Mutex<HashMap<String, Resolution>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl FakeLookup {
    pub fn resolve_as(&self, id: &str, title: &str, artist: Option<&str>) {
        self.answers.lock().insert(
            id.to_string(),
            Resolution::Resolved {
                title: title.to_string(),
                artist: artist.map(|artist| artist.to_string()),
                source: ResolutionSource::OEmbed,
            },
        );
    }

    pub fn fail(&self, id: &str, times: u32) {
        self.failures.lock().insert(id.to_string(), times);
    }

    pub fn calls(&self, id: &str) -> u32 {
        self.calls.lock().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MetadataLookup for FakeLookup {
    async fn lookup(&self, id: &str) -> Result<Resolution, String> {
        *self.calls.lock().entry(id.to_string()).or_insert(0) += 1;
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err("connection reset".to_string());
                }
            }
        }
        Ok(self
            .answers
            .lock()
            .get(id)
            .cloned()
            .unwrap_or(Resolution::Unresolved))
    }
}

#[derive(Default)]
pub struct FakeArtwork {
    failing: Mutex<bool>,
    requests: Mutex<Vec<(String, bool)>>,
}

impl FakeArtwork {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn requests(&self) -> Vec<(String, bool)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ArtworkSource for FakeArtwork {
    async fn thumbnail(&self, id: &str, square: bool) -> Result<CoverArt, String> {
        self.requests.lock().push((id.to_string(), square));
        if *self.failing.lock() {
            return Err("http 404".to_string());
        }
        let kind = if square { "square" } else { "wide" };
        Ok(CoverArt {
            data: format!("{} thumbnail of {}", kind, id).into_bytes(),
            mime: Some("image/jpeg".to_string()),
        })
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    failing: Mutex<bool>,
    sent: Mutex<Vec<Notification>>,
}

impl FakeNotifier {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), String> {
        self.sent.lock().push(notification.clone());
        if *self.failing.lock() {
            return Err("webhook unreachable".to_string());
        }
        Ok(())
    }
}

pub struct FakeTagger;

impl Tagger for FakeTagger {
    fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<(), MetadataError> {
        let mut fields = read_fields(path)?;
        match &update.title_artist {
            Some((title, artist)) => {
                fields.insert("title".to_string(), title.clone());
                fields.insert("artist".to_string(), artist.clone());
            }
            None => {
                fields.remove("title");
                fields.remove("artist");
            }
        }
        fields.insert("origin".to_string(), update.origin_url.clone());
        fields.insert(
            "track".to_string(),
            format!("{}/{}", update.track_no, update.track_total),
        );
        write_fields(path, &fields)?;
        Ok(())
    }

    fn has_cover(&self, path: &Path) -> Result<bool, MetadataError> {
        Ok(read_fields(path)?.contains_key("cover"))
    }

    fn replace_cover(&self, path: &Path, cover: &CoverArt) -> Result<(), MetadataError> {
        let mut fields = read_fields(path)?;
        fields.insert(
            "cover".to_string(),
            String::from_utf8_lossy(&cover.data).into_owned(),
        );
        write_fields(path, &fields)?;
        Ok(())
    }

    fn origin_id(&self, path: &Path) -> Result<Option<String>, MetadataError> {
        Ok(read_fields(path)?
            .get("origin")
            .and_then(|url| id_from_origin_url(url)))
    }
}

/// A sync state over a temporary directory wired to fakes.
pub struct Harness {
    _dir: TempDir,
    pub fetcher: Arc<FakeFetcher>,
    pub audio: Arc<FakeAudio>,
    pub lookup: Arc<FakeLookup>,
    pub artwork: Arc<FakeArtwork>,
    pub notifier: Arc<FakeNotifier>,
    pub state: SyncState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_workers(3)
    }

    pub fn with_workers(workers: usize) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = SyncSettings {
            playlist_id: "PLtest".to_string(),
            archive_dir: dir.path().join("archive"),
            work_dir: dir.path().join("work"),
            index_path: dir.path().join("archive").join("playlist.m3u"),
            forbidden: ForbiddenChars::default(),
            compilation_suffix: " - Topic".to_string(),
            download_workers: workers,
            process_workers: workers,
            fetch_retry: RetryPolicy {
                attempts: 3,
                delay: Duration::ZERO,
            },
            lookup_retry: RetryPolicy {
                attempts: 2,
                delay: Duration::ZERO,
            },
        };
        fs::create_dir_all(&settings.archive_dir).expect("archive dir");
        fs::create_dir_all(&settings.work_dir).expect("work dir");

        let store = TrackStore::open(dir.path().join("tracks.json")).expect("track store");
        let fetcher = Arc::new(FakeFetcher::default());
        let audio = Arc::new(FakeAudio::default());
        let lookup = Arc::new(FakeLookup::default());
        let artwork = Arc::new(FakeArtwork::default());
        let notifier = Arc::new(FakeNotifier::default());
        let tools = Collaborators {
            fetcher: fetcher.clone(),
            audio: audio.clone(),
            fingerprinter: Arc::new(FakeFingerprinter),
            artwork: artwork.clone(),
            notifier: notifier.clone(),
            tagger: Arc::new(FakeTagger),
        };
        let resolver = Resolver::new(store.clone(), lookup.clone());
        let state = SyncState {
            settings: Arc::new(settings),
            tools,
            store,
            resolver,
        };
        Self {
            _dir: dir,
            fetcher,
            audio,
            lookup,
            artwork,
            notifier,
            state,
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.state.settings.archive_dir
    }

    pub fn work_dir(&self) -> &Path {
        &self.state.settings.work_dir
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.archive_dir().join(name)
    }

    /// Archive file names, sorted.
    pub fn archive_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.archive_dir())
            .expect("archive listing")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".mp3"))
            .collect();
        names.sort();
        names
    }

    pub fn curate(&self, id: &str, title: &str, artist: &str) {
        self.state
            .store
            .set(
                id,
                TrackRecord {
                    track: Some(title.to_string()),
                    artist: Some(artist.to_string()),
                    ..TrackRecord::default()
                },
            )
            .expect("curate");
    }

    /// Drops a fake downloaded file into the work directory.
    pub fn stage_download(&self, id: &str) {
        let mut fields = BTreeMap::new();
        fields.insert("audio".to_string(), format!("audio of {}", id));
        write_fields(&work_file_path(self.work_dir(), id), &fields).expect("stage");
    }
}
