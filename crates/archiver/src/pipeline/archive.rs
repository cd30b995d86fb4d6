use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use common::is_audio_file;
use tracing::debug;
use walkdir::WalkDir;

use super::Tagger;

/// Audio files directly inside `dir`, sorted by file name.
pub fn list_audio_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() && is_audio_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Every archive file with the identifier from its origin tag. Files whose
/// tags cannot be read count as untagged.
pub fn scan_origins(dir: &Path, tagger: &dyn Tagger) -> io::Result<Vec<(PathBuf, Option<String>)>> {
    let mut out = Vec::new();
    for path in list_audio_files(dir)? {
        let id = match tagger.origin_id(&path) {
            Ok(id) => id,
            Err(err) => {
                debug!("Unable to read tags of {:?}: {}", path, err);
                None
            }
        };
        out.push((path, id));
    }
    Ok(out)
}

/// Files tagged with `id` whose name is not `keep_name`.
pub fn stale_files(
    dir: &Path,
    id: &str,
    keep_name: &str,
    tagger: &dyn Tagger,
) -> io::Result<Vec<PathBuf>> {
    Ok(scan_origins(dir, tagger)?
        .into_iter()
        .filter(|(path, origin)| {
            origin.as_deref() == Some(id)
                && path.file_name().and_then(|name| name.to_str()) != Some(keep_name)
        })
        .map(|(path, _)| path)
        .collect())
}

/// Copies `src` over `dest` through a hidden sibling file, so readers see
/// either the old or the new content.
pub fn publish_file(src: &Path, dest: &Path) -> io::Result<()> {
    let tmp = part_path(dest)?;
    let result = fs::copy(src, &tmp)
        .and_then(|_| fs::File::open(&tmp)?.sync_all())
        .and_then(|_| fs::rename(&tmp, dest));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result?;
    sync_parent(dest);
    Ok(())
}

pub fn write_atomic(dest: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = part_path(dest)?;
    let result = fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp, dest));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result?;
    sync_parent(dest);
    Ok(())
}

fn part_path(dest: &Path) -> io::Result<PathBuf> {
    let name = dest.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("no file name in {:?}", dest))
    })?;
    Ok(dest.with_file_name(format!(".{}.part", name.to_string_lossy())))
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
