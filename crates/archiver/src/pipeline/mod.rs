//! Download and process coordinators plus the collaborator seams they drive.
//!
//! Every external tool and service sits behind one of the traits below so the
//! coordinators can be exercised with in-memory fakes.

pub mod archive;
pub mod download;
pub mod finish;
pub mod process;
pub mod queue;
pub mod reconcile;
#[cfg(test)]
pub mod testing;

use std::path::Path;

use async_trait::async_trait;
use metadata::{CoverArt, MetadataError, TagUpdate};

use crate::command::ToolError;
use crate::notify::Notification;
use crate::resolver::Resolution;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Identifiers of the playlist, in playlist order.
    async fn list_playlist(&self, playlist_id: &str) -> Result<Vec<String>, ToolError>;

    /// Materializes `<work_dir>/<id>.mp3`.
    async fn fetch(&self, id: &str, work_dir: &Path) -> Result<(), ToolError>;
}

#[async_trait]
pub trait AudioProcessor: Send + Sync {
    async fn normalize(&self, path: &Path) -> Result<(), ToolError>;

    /// Strips leading and trailing silence, then pads both ends.
    async fn trim_silence(&self, path: &Path) -> Result<(), ToolError>;
}

#[async_trait]
pub trait Fingerprinter: Send + Sync {
    async fn fingerprint(&self, path: &Path) -> Result<String, ToolError>;
}

/// Remote metadata sources. Only transport failures are errors.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup(&self, id: &str) -> Result<Resolution, String>;
}

#[async_trait]
pub trait ArtworkSource: Send + Sync {
    /// Video thumbnail, cropped to a centered square when `square` is set.
    async fn thumbnail(&self, id: &str, square: bool) -> Result<CoverArt, String>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), String>;
}

/// Tag access. Implementations block; callers run them off the async workers.
pub trait Tagger: Send + Sync {
    fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<(), MetadataError>;
    fn has_cover(&self, path: &Path) -> Result<bool, MetadataError>;
    fn replace_cover(&self, path: &Path, cover: &CoverArt) -> Result<(), MetadataError>;
    /// Identifier carried by the file's origin URL tag, if any.
    fn origin_id(&self, path: &Path) -> Result<Option<String>, MetadataError>;
}
