use std::path::Path;

use lofty::config::{ParseOptions, WriteOptions};
use lofty::error::LoftyError;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::{Accessor, AudioFile, ItemKey, TagExt, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{ItemValue, Tag, TagItem};

#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub origin_url: Option<String>,
    pub track_no: Option<u32>,
    pub track_total: Option<u32>,
    pub duration_ms: Option<u32>,
    pub has_embedded_cover: bool,
}

/// Tags written onto a finished item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
    /// Both or neither; a lone title or artist is never written.
    pub title_artist: Option<(String, String)>,
    pub origin_url: String,
    pub track_no: u32,
    pub track_total: u32,
}

#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
    NoTag,
    /// The file's tag type has no field for this value.
    Unsupported(&'static str),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
            MetadataError::NoTag => write!(f, "file has no writable tag"),
            MetadataError::Unsupported(field) => write!(f, "tag type cannot store the {}", field),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo::default();

    let duration_ms = properties.duration().as_millis();
    if duration_ms > 0 {
        let clamped = duration_ms.min(u128::from(u32::MAX)) as u32;
        info.duration_ms = Some(clamped);
    }

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.title().map(|v| v.to_string());
        info.artist = tag.artist().map(|v| v.to_string());
        info.origin_url = origin_url_of(tag);
        info.track_no = tag.track();
        info.track_total = tag.track_total();
        info.has_embedded_cover = !tag.pictures().is_empty();
    }

    Ok(info)
}

/// Reads only the origin URL, skipping audio properties.
pub fn read_origin_url(path: &Path) -> Result<Option<String>, MetadataError> {
    let options = ParseOptions::new().read_properties(false);
    let tagged_file = Probe::open(path)?.options(options).read()?;
    Ok(tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .and_then(origin_url_of))
}

/// ID3v2 keeps the URL in a WOAF locator frame; other tag types may hand it
/// back as text.
fn origin_url_of(tag: &Tag) -> Option<String> {
    tag.get_items(&ItemKey::AudioFileUrl)
        .find_map(|item| match item.value() {
            ItemValue::Locator(url) | ItemValue::Text(url) => Some(url.trim()),
            _ => None,
        })
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

pub fn write_tags(path: &Path, update: &TagUpdate) -> Result<(), MetadataError> {
    let mut tagged_file = lofty::read_from_path(path)?;
    ensure_primary_tag(&mut tagged_file);
    let tag = tagged_file.primary_tag_mut().ok_or(MetadataError::NoTag)?;

    match &update.title_artist {
        Some((title, artist)) => {
            tag.set_title(title.clone());
            tag.set_artist(artist.clone());
        }
        None => {
            tag.remove_title();
            tag.remove_artist();
        }
    }
    let stored = tag.insert(TagItem::new(
        ItemKey::AudioFileUrl,
        ItemValue::Locator(update.origin_url.clone()),
    ));
    if !stored {
        return Err(MetadataError::Unsupported("origin url"));
    }
    tag.set_track(update.track_no);
    tag.set_track_total(update.track_total);

    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

/// Drops every embedded picture and stores `cover` as the front cover.
pub fn replace_cover(path: &Path, cover: &CoverArt) -> Result<(), MetadataError> {
    let mut tagged_file = lofty::read_from_path(path)?;
    ensure_primary_tag(&mut tagged_file);
    let tag = tagged_file.primary_tag_mut().ok_or(MetadataError::NoTag)?;

    while !tag.pictures().is_empty() {
        tag.remove_picture(0);
    }
    let mime = cover
        .mime
        .as_deref()
        .map(mime_type)
        .or_else(|| guess_mime(&cover.data).map(mime_type));
    let picture = Picture::new_unchecked(PictureType::CoverFront, mime, None, cover.data.clone());
    tag.push_picture(picture);

    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

fn ensure_primary_tag(tagged_file: &mut lofty::file::TaggedFile) {
    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        let _ = tagged_file.insert_tag(Tag::new(tag_type));
    }
}

fn mime_type(mime: &str) -> MimeType {
    match mime {
        "image/jpeg" | "image/jpg" => MimeType::Jpeg,
        "image/png" => MimeType::Png,
        "image/gif" => MimeType::Gif,
        "image/bmp" => MimeType::Bmp,
        "image/tiff" => MimeType::Tiff,
        other => MimeType::Unknown(other.to_string()),
    }
}

pub fn guess_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png")
    } else {
        None
    }
}
