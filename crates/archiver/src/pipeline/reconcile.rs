use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::archive::{list_audio_files, scan_origins, write_atomic};
use super::Tagger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Unchanged,
    Written,
}

/// Deletes archive files tagged with an identifier missing from `snapshot`.
/// Untagged or unreadable files are kept.
pub fn prune_orphans(
    archive_dir: &Path,
    snapshot: &[String],
    tagger: &dyn Tagger,
) -> io::Result<Vec<PathBuf>> {
    let allowed: HashSet<&str> = snapshot.iter().map(String::as_str).collect();
    let mut removed = Vec::new();
    for (path, origin) in scan_origins(archive_dir, tagger)? {
        let id = match origin {
            Some(id) => id,
            None => {
                debug!("Keeping untagged {:?}", path);
                continue;
            }
        };
        if allowed.contains(id.as_str()) {
            continue;
        }
        info!("Deleting {:?}: {} left the playlist", path, id);
        fs::remove_file(&path)?;
        removed.push(path);
    }
    Ok(removed)
}

/// Newline-joined audio file names of the archive, sorted.
pub fn index_contents(archive_dir: &Path) -> io::Result<String> {
    let names: Vec<String> = list_audio_files(archive_dir)?
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    Ok(names.join("\n"))
}

/// Rewrites the playlist index only when its content would change.
pub fn rebuild_index(archive_dir: &Path, index_path: &Path) -> io::Result<IndexOutcome> {
    let contents = index_contents(archive_dir)?;
    match fs::read_to_string(index_path) {
        Ok(existing) if existing == contents => return Ok(IndexOutcome::Unchanged),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    if let Some(parent) = index_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    write_atomic(index_path, contents.as_bytes())?;
    info!("Wrote playlist index {:?}", index_path);
    Ok(IndexOutcome::Written)
}
