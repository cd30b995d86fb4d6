use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::command::{run_tool, ToolError};
use crate::pipeline::Fingerprinter;

/// Content fingerprints from `echoprint-codegen`.
pub struct Echoprint {
    program: String,
}

impl Echoprint {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Fingerprinter for Echoprint {
    async fn fingerprint(&self, path: &Path) -> Result<String, ToolError> {
        let stdout = run_tool(&self.program, [path.as_os_str()], None).await?;
        parse_code(&stdout)
    }
}

/// The `code` field of the generator's JSON, which is either an object or an
/// array whose first element is the object.
pub fn parse_code(stdout: &str) -> Result<String, ToolError> {
    let value: Value = serde_json::from_str(stdout.trim())
        .map_err(|err| ToolError::Output(format!("invalid fingerprint json: {}", err)))?;
    let object = match &value {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let object = object.ok_or_else(|| ToolError::Output("empty fingerprint list".to_string()))?;
    if let Some(code) = object.get("code").and_then(Value::as_str) {
        return Ok(code.to_string());
    }
    match object.get("error").and_then(Value::as_str) {
        Some(error) => Err(ToolError::Output(format!("fingerprint error: {}", error))),
        None => Err(ToolError::Output("fingerprint has no code".to_string())),
    }
}
