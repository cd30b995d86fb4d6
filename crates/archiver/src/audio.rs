use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::command::{run_tool, ToolError};
use crate::config::Normalizer;
use crate::pipeline::AudioProcessor;

const SILENCE_EFFECTS: [&str; 13] = [
    "silence", "1", "0.1", "1%", "reverse", "silence", "1", "0.1", "1%", "reverse", "pad", "2",
    "2",
];

/// Loudness normalization (mp3gain or ffmpeg) and silence trimming (sox).
pub struct ExternalAudio {
    normalizer: Normalizer,
    mp3gain: String,
    ffmpeg: String,
    sox: String,
}

impl ExternalAudio {
    pub fn new(normalizer: Normalizer, mp3gain: String, ffmpeg: String, sox: String) -> Self {
        Self {
            normalizer,
            mp3gain,
            ffmpeg,
            sox,
        }
    }
}

#[async_trait]
impl AudioProcessor for ExternalAudio {
    async fn normalize(&self, path: &Path) -> Result<(), ToolError> {
        debug!("Normalizing volume of {:?}", path);
        match self.normalizer {
            Normalizer::Mp3gain => {
                let args: Vec<OsString> = vec!["-r".into(), "-c".into(), "-p".into(), path.into()];
                run_tool(&self.mp3gain, args, None).await?;
                Ok(())
            }
            Normalizer::Ffmpeg => {
                let tmp = sibling_temp(path, "norm")?;
                let args = ffmpeg_args(path, &tmp);
                let result = run_tool(&self.ffmpeg, args, None).await;
                replace_with(result, &tmp, path).await
            }
        }
    }

    async fn trim_silence(&self, path: &Path) -> Result<(), ToolError> {
        debug!("Trimming silence of {:?}", path);
        let tmp = sibling_temp(path, "trim")?;
        let args = sox_args(path, &tmp);
        let result = run_tool(&self.sox, args, None).await;
        replace_with(result, &tmp, path).await
    }
}

fn ffmpeg_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(input.into());
    args.extend(
        ["-af", "loudnorm", "-map_metadata", "0", "-id3v2_version", "3"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.into());
    args
}

fn sox_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![input.into(), output.into()];
    args.extend(SILENCE_EFFECTS.iter().map(OsString::from));
    args
}

/// Hidden file next to `path` keeping the audio extension so the tools pick
/// the right format.
fn sibling_temp(path: &Path, tag: &str) -> Result<PathBuf, ToolError> {
    let name = path.file_name().ok_or_else(|| {
        ToolError::Output(format!("no file name in {:?}", path))
    })?;
    Ok(path.with_file_name(format!(".{}.{}", tag, name.to_string_lossy())))
}

async fn replace_with(
    result: Result<String, ToolError>,
    tmp: &Path,
    path: &Path,
) -> Result<(), ToolError> {
    match result {
        Ok(_) => {
            tokio::fs::rename(tmp, path).await?;
            Ok(())
        }
        Err(err) => {
            let _ = tokio::fs::remove_file(tmp).await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sox_trims_both_ends_and_pads() {
        let args = sox_args(Path::new("/w/v1.mp3"), Path::new("/w/.trim.v1.mp3"));
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args.join(" "),
            "/w/v1.mp3 /w/.trim.v1.mp3 silence 1 0.1 1% reverse silence 1 0.1 1% reverse pad 2 2"
        );
    }

    #[test]
    fn temp_file_keeps_mp3_extension() {
        let tmp = sibling_temp(Path::new("/w/v1.mp3"), "norm").unwrap();
        assert_eq!(tmp, PathBuf::from("/w/.norm.v1.mp3"));
    }

    #[test]
    fn ffmpeg_writes_loudnorm_output_to_temp() {
        let args = ffmpeg_args(Path::new("in.mp3"), Path::new(".norm.in.mp3"));
        assert_eq!(
            args.last().map(|arg| arg.to_string_lossy().into_owned()),
            Some(".norm.in.mp3".to_string())
        );
        assert!(args.iter().any(|arg| arg == "loudnorm"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_tool_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1.mp3");
        std::fs::write(&path, b"original").unwrap();
        let audio = ExternalAudio::new(
            Normalizer::Mp3gain,
            "mp3gain".to_string(),
            "ffmpeg".to_string(),
            "false".to_string(),
        );

        assert!(audio.trim_silence(&path).await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
        assert!(!dir.path().join(".trim.v1.mp3").exists());
    }
}
