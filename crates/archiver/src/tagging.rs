use std::path::Path;

use common::id_from_origin_url;
use metadata::{CoverArt, MetadataError, TagUpdate};

use crate::pipeline::Tagger;

/// ID3 tagging through lofty.
pub struct LoftyTagger;

impl Tagger for LoftyTagger {
    fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<(), MetadataError> {
        metadata::write_tags(path, update)
    }

    fn has_cover(&self, path: &Path) -> Result<bool, MetadataError> {
        Ok(metadata::read_tags(path)?.has_embedded_cover)
    }

    fn replace_cover(&self, path: &Path, cover: &CoverArt) -> Result<(), MetadataError> {
        metadata::replace_cover(path, cover)
    }

    fn origin_id(&self, path: &Path) -> Result<Option<String>, MetadataError> {
        Ok(metadata::read_origin_url(path)?.and_then(|url| id_from_origin_url(&url)))
    }
}
