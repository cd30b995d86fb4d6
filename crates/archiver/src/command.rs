use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

#[derive(Debug)]
pub enum ToolError {
    Spawn { program: String, source: std::io::Error },
    Failed { program: String, code: Option<i32>, stderr: String },
    Output(String),
    Io(std::io::Error),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::Spawn { program, source } => {
                write!(f, "failed to start {}: {}", program, source)
            }
            ToolError::Failed { program, code, stderr } => match code {
                Some(code) => write!(f, "{} exited with status {}: {}", program, code, stderr),
                None => write!(f, "{} was terminated by a signal: {}", program, stderr),
            },
            ToolError::Output(message) => write!(f, "unexpected tool output: {}", message),
            ToolError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::Io(err)
    }
}

/// Runs an external program to completion and returns its stdout. A non-zero
/// exit status is an error carrying the tail of stderr.
pub async fn run_tool<I, S>(program: &str, args: I, cwd: Option<&Path>) -> Result<String, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    debug!("Running {:?}", command.as_std());
    let output = command.output().await.map_err(|source| ToolError::Spawn {
        program: program.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}
