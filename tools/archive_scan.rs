use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use common::{id_from_origin_url, is_audio_file};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let archive_dir = env::args()
        .nth(1)
        .or_else(|| env::var("ARCHIVE_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/tracks"));

    let mut by_id: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut untagged = Vec::new();
    for entry in WalkDir::new(&archive_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match metadata::read_tags(entry.path()) {
            Ok(info) => {
                let id = info.origin_url.as_deref().and_then(id_from_origin_url);
                match id {
                    Some(id) => {
                        let title = info.title.unwrap_or_default();
                        let artist = info.artist.unwrap_or_default();
                        let cover = if info.has_embedded_cover { "cover" } else { "no cover" };
                        println!("{}\t{}\t{} / {}\t{}", id, name, title, artist, cover);
                        by_id.entry(id).or_default().push(name);
                    }
                    None => untagged.push(name),
                }
            }
            Err(err) => {
                warn!("Unreadable tags in {}: {}", name, err);
                untagged.push(name);
            }
        }
    }

    let duplicates: Vec<_> = by_id.iter().filter(|(_, names)| names.len() > 1).collect();
    for (id, names) in &duplicates {
        println!("duplicate {}: {}", id, names.join(", "));
    }
    for name in &untagged {
        println!("untagged: {}", name);
    }
    println!(
        "Scanned {:?}: {} items, {} untagged, {} duplicated ids",
        archive_dir,
        by_id.len(),
        untagged.len(),
        duplicates.len()
    );
    Ok(())
}
