//! Directory-backed catalog of the agent's scripts

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use memento_core::AgentError;
use tempfile::NamedTempFile;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::script;
use super::ExecutionResult;

/// Longest accepted tool name, in bytes
const MAX_NAME_LEN: usize = 255;

/// Registry of stored scripts
///
/// Every tool is one regular file directly inside `dir`; the file name is the
/// tool name. Nothing is cached, each call scans or touches the directory.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    dir: PathBuf,
    exec_timeout: Duration,
    max_output_len: usize,
}

impl ToolRegistry {
    pub fn new(dir: impl Into<PathBuf>, exec_timeout: Duration, max_output_len: usize) -> Self {
        Self {
            dir: dir.into(),
            exec_timeout,
            max_output_len,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exec_timeout(&self) -> Duration {
        self.exec_timeout
    }

    /// Names of all stored tools, sorted
    pub fn list_tools(&self) -> Result<Vec<String>, AgentError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AgentError::storage(&self.dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AgentError::storage(&self.dir, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => names.push(name),
                Ok(_) => {}
                Err(raw) => debug!(name = ?raw, "Skipping non UTF-8 tool name"),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Store `source` under `name`, replacing any existing script
    pub fn write_script(&self, name: &str, source: &str) -> Result<PathBuf, AgentError> {
        let name = sanitize_name(name)?;

        std::fs::create_dir_all(&self.dir).map_err(|e| AgentError::storage(&self.dir, e))?;

        let path = self.dir.join(name);
        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|e| AgentError::storage(&self.dir, e))?;
        tmp.write_all(source.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| AgentError::storage(tmp.path(), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o755))
                .map_err(|e| AgentError::storage(tmp.path(), e))?;
        }

        tmp.persist(&path)
            .map_err(|e| AgentError::storage(&path, e.error))?;

        info!(tool = %name, bytes = source.len(), "Tool saved");
        Ok(path)
    }

    /// Run a stored script; never fails, problems are reported in the result
    pub async fn execute_script(&self, name: &str) -> ExecutionResult {
        let name = match sanitize_name(name) {
            Ok(name) => name,
            Err(e) => return ExecutionResult::failed(e.to_string()),
        };

        let path = self.dir.join(name);
        if !path.is_file() {
            return ExecutionResult::failed(format!("tool not found: {}", name));
        }

        let (script, working_dir) = match (path.canonicalize(), self.dir.canonicalize()) {
            (Ok(script), Ok(dir)) => (script, dir),
            (Err(e), _) | (_, Err(e)) => {
                return ExecutionResult::failed(format!("cannot resolve {}: {}", name, e));
            }
        };
        if !script.starts_with(&working_dir) {
            warn!(
                tool = %name,
                target = %script.display(),
                "Tool resolves outside the tool directory"
            );
            return ExecutionResult::failed(format!(
                "invalid tool name: {} resolves outside the tool directory",
                name
            ));
        }

        info!(tool = %name, timeout_secs = self.exec_timeout.as_secs(), "Executing tool");
        let result =
            script::run(&script, &working_dir, self.exec_timeout, self.max_output_len).await;

        if result.timed_out {
            warn!(tool = %name, "Tool timed out");
        } else {
            debug!(
                tool = %name,
                exit_code = ?result.exit_code,
                success = result.success,
                "Tool finished"
            );
        }
        result
    }
}

/// Accept only a single plain file name inside the tool directory
pub fn sanitize_name(name: &str) -> Result<&str, AgentError> {
    let reject = |reason: &str| {
        Err(AgentError::Protocol(format!(
            "invalid tool name {:?}: {}",
            name, reason
        )))
    };

    if name.is_empty() {
        return reject("empty");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("too long");
    }
    if name.starts_with('.') {
        return reject("must not start with '.'");
    }
    if name.contains(|c: char| matches!(c, '/' | '\\' | ':' | '\0')) {
        return reject("must not contain path separators");
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(name),
        _ => reject("must be a plain file name"),
    }
}
