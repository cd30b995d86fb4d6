use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const AUDIO_EXT: &str = "mp3";
pub const ORIGIN_URL_PREFIX: &str = "https://youtu.be/";
pub const DEFAULT_FORBIDDEN_CHARS: &str = "/\\?%*:|\"<>";

/// Curated metadata for one playlist item, as stored in the track file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, rename = "albumArtist")]
    pub album_artist: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrackRecord {
    /// First-seen default: only the title is known.
    pub fn seeded(title: Option<String>) -> Self {
        Self {
            track: title.and_then(non_empty),
            ..Self::default()
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.track.as_deref().filter(|value| !value.trim().is_empty())
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref().filter(|value| !value.trim().is_empty())
    }

    /// Title and artist, only when both are set.
    pub fn title_and_artist(&self) -> Option<(&str, &str)> {
        Some((self.title()?, self.artist()?))
    }
}

pub fn origin_url(id: &str) -> String {
    format!("{}{}", ORIGIN_URL_PREFIX, id)
}

/// Identifier carried by an origin URL: its trailing path segment.
pub fn id_from_origin_url(url: &str) -> Option<String> {
    let segment = url.trim().rsplit('/').next()?;
    non_empty(segment.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForbiddenChars {
    chars: Vec<char>,
}

impl ForbiddenChars {
    pub fn new(chars: impl IntoIterator<Item = char>) -> Self {
        let mut chars: Vec<char> = chars.into_iter().collect();
        chars.sort_unstable();
        chars.dedup();
        Self { chars }
    }

    pub fn contains(&self, ch: char) -> bool {
        self.chars.binary_search(&ch).is_ok()
    }

    pub fn strip(&self, value: &str) -> String {
        value.chars().filter(|ch| !self.contains(*ch)).collect()
    }
}

impl Default for ForbiddenChars {
    fn default() -> Self {
        Self::from(DEFAULT_FORBIDDEN_CHARS)
    }
}

impl From<&str> for ForbiddenChars {
    fn from(value: &str) -> Self {
        Self::new(value.chars())
    }
}

/// `"{title} - {artist} ({id}).mp3"` when both survive sanitizing, else `"{id}.mp3"`.
pub fn archive_filename(
    id: &str,
    title: Option<&str>,
    artist: Option<&str>,
    forbidden: &ForbiddenChars,
) -> String {
    let title = title.map(|value| forbidden.strip(value)).unwrap_or_default();
    let artist = artist.map(|value| forbidden.strip(value)).unwrap_or_default();
    if !title.is_empty() && !artist.is_empty() {
        format!("{} - {} ({}).{}", title, artist, id, AUDIO_EXT)
    } else {
        work_file_name(id)
    }
}

pub fn work_file_name(id: &str) -> String {
    format!("{}.{}", id, AUDIO_EXT)
}

pub fn work_file_path(work_dir: &Path, id: &str) -> PathBuf {
    work_dir.join(work_file_name(id))
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(AUDIO_EXT))
        .unwrap_or(false)
}

/// Comma separated artist credits become a `/` separated tag value.
pub fn tag_artist(artist: &str) -> String {
    let parts: Vec<&str> = artist
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect();
    parts.join("/")
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
