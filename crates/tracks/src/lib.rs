use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::TrackRecord;
use parking_lot::Mutex;
use tracing::{debug, info};

pub type TrackFile = BTreeMap<String, TrackRecord>;

/// JSON file of curated track records keyed by identifier.
///
/// Every mutation re-reads the file, applies the change and writes the whole
/// file back. All access goes through one mutex so concurrent writers for
/// different identifiers cannot drop each other's updates. Clones share the
/// mutex.
#[derive(Clone)]
pub struct TrackStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl TrackStore {
    pub fn open(path: PathBuf) -> Result<Self, TrackStoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if path.exists() {
            info!("Using track file {:?}", path);
        } else {
            info!("Track file {:?} not found; it will be created on first write", path);
        }
        Ok(Self {
            path,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<TrackFile, TrackStoreError> {
        let _guard = self.lock.lock();
        read_file(&self.path)
    }

    pub fn get(&self, id: &str) -> Result<Option<TrackRecord>, TrackStoreError> {
        let _guard = self.lock.lock();
        let mut tracks = read_file(&self.path)?;
        Ok(tracks.remove(id))
    }

    pub fn set(&self, id: &str, record: TrackRecord) -> Result<(), TrackStoreError> {
        let _guard = self.lock.lock();
        let mut tracks = read_file(&self.path)?;
        tracks.insert(id.to_string(), record);
        write_file(&self.path, &tracks)
    }

    /// Makes sure `id` has a record. A missing record is created from
    /// `title`; an existing record without a title only gets `track` filled
    /// in, so curated artist and album values are kept. Returns the stored
    /// record.
    pub fn seed_title(&self, id: &str, title: Option<&str>) -> Result<TrackRecord, TrackStoreError> {
        let _guard = self.lock.lock();
        let mut tracks = read_file(&self.path)?;
        let title = title.map(str::trim).filter(|value| !value.is_empty());
        let record = match tracks.get_mut(id) {
            Some(record) => match title {
                Some(title) if record.title().is_none() => {
                    record.track = Some(title.to_string());
                    record.clone()
                }
                _ => return Ok(record.clone()),
            },
            None => {
                let record = TrackRecord::seeded(title.map(str::to_string));
                tracks.insert(id.to_string(), record.clone());
                record
            }
        };
        write_file(&self.path, &tracks)?;
        debug!("Seeded track record for {}", id);
        Ok(record)
    }
}

#[derive(Debug)]
pub enum TrackStoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for TrackStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackStoreError::Io(err) => write!(f, "io error: {}", err),
            TrackStoreError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for TrackStoreError {}

impl From<std::io::Error> for TrackStoreError {
    fn from(err: std::io::Error) -> Self {
        TrackStoreError::Io(err)
    }
}

impl From<serde_json::Error> for TrackStoreError {
    fn from(err: serde_json::Error) -> Self {
        TrackStoreError::Json(err)
    }
}

fn read_file(path: &Path) -> Result<TrackFile, TrackStoreError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(TrackFile::new()),
        Err(err) => return Err(err.into()),
    };
    if data.trim().is_empty() {
        return Ok(TrackFile::new());
    }
    Ok(serde_json::from_str(&data)?)
}

fn write_file(path: &Path, tracks: &TrackFile) -> Result<(), TrackStoreError> {
    let contents = serde_json::to_string_pretty(tracks)?;
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
