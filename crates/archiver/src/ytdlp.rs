use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use common::origin_url;
use tracing::info;

use crate::command::{run_tool, ToolError};
use crate::pipeline::Fetcher;

const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";

/// Playlist enumeration and audio download through yt-dlp.
pub struct YtDlp {
    program: String,
    proxy: Option<String>,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            program: program.into(),
            proxy,
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--ignore-config".to_string()];
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args
    }

    fn list_args(&self, playlist_id: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(["--flat-playlist", "--print", "id"].map(String::from));
        args.push(playlist_url(playlist_id));
        args
    }

    fn fetch_args(&self, id: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["-f", "ba", "-x", "--audio-format", "mp3", "--embed-thumbnail", "-o", OUTPUT_TEMPLATE]
                .map(String::from),
        );
        args.push(origin_url(id));
        args
    }
}

#[async_trait]
impl Fetcher for YtDlp {
    async fn list_playlist(&self, playlist_id: &str) -> Result<Vec<String>, ToolError> {
        let stdout = run_tool(&self.program, self.list_args(playlist_id), None).await?;
        let ids = parse_ids(&stdout);
        info!("Playlist {} has {} items", playlist_id, ids.len());
        Ok(ids)
    }

    async fn fetch(&self, id: &str, work_dir: &Path) -> Result<(), ToolError> {
        run_tool(&self.program, self.fetch_args(id), Some(work_dir)).await?;
        Ok(())
    }
}

/// Accepts either a bare playlist id or a full URL.
pub fn playlist_url(playlist_id: &str) -> String {
    let trimmed = playlist_id.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://www.youtube.com/playlist?list={}", trimmed)
    }
}

/// One identifier per line; repeated entries keep their first position.
pub fn parse_ids(stdout: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}
