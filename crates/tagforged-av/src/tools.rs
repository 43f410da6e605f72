//! External tool detection.
//!
//! The transcoder is probed once, when the job queue is built: the version
//! command must exit successfully within a short timeout. The result is
//! cached in a [`ToolInfo`] for the lifetime of the queue.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tagforged_common::{Error, Result};
use tokio::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool answered its version probe.
    pub available: bool,
    /// First line of the version output, if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
    /// Why the probe failed, when it did.
    pub error: Option<String>,
}

impl ToolInfo {
    /// A tool that is known to be present, without probing it.
    pub fn available(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            available: true,
            version: None,
            path: Some(path.into()),
            error: None,
        }
    }

    /// A tool that failed its probe for the given reason.
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: false,
            version: None,
            path: None,
            error: Some(reason.into()),
        }
    }

    /// Return the executable path, or [`Error::ToolUnavailable`].
    pub fn require(&self) -> Result<&Path> {
        match (&self.path, self.available) {
            (Some(path), true) => Ok(path.as_path()),
            _ => Err(Error::tool_unavailable(
                &self.name,
                self.error.as_deref().unwrap_or("not available"),
            )),
        }
    }
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
pub fn resolve_tool_path(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "Configured path for {} does not exist: {}; falling back to PATH",
            name,
            path.display()
        );
    }

    which::which(name)
        .map_err(|_| Error::tool_unavailable(name, format!("{name} not found in PATH")))
}

/// Check that a tool is installed and answers `version_arg` within `timeout`.
///
/// Never fails: problems are reported through [`ToolInfo::available`] and
/// [`ToolInfo::error`].
pub async fn probe_tool(
    name: &str,
    configured: Option<&Path>,
    version_arg: &str,
    timeout: Duration,
) -> ToolInfo {
    let path = match resolve_tool_path(name, configured) {
        Ok(path) => path,
        Err(e) => return ToolInfo::unavailable(name, e.to_string()),
    };

    let child = Command::new(&path)
        .arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => return ToolInfo::unavailable(name, format!("failed to spawn: {e}")),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.trim().to_string());

            tracing::debug!("{} probe ok: {:?}", name, version);

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path: Some(path),
                error: None,
            }
        }
        Ok(Ok(output)) => ToolInfo::unavailable(
            name,
            format!("version probe exited with status {}", output.status),
        ),
        Ok(Err(e)) => ToolInfo::unavailable(name, format!("version probe failed: {e}")),
        Err(_elapsed) => {
            ToolInfo::unavailable(name, format!("version probe timed out after {timeout:?}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_missing_tool() {
        let info = probe_tool(
            "nonexistent_tool_12345",
            None,
            "--version",
            Duration::from_secs(1),
        )
        .await;
        assert!(!info.available);
        assert!(info.version.is_none());
        assert!(info.path.is_none());
        assert!(info.error.is_some());
        assert!(matches!(info.require(), Err(Error::ToolUnavailable { .. })));
    }

    #[test]
    fn test_resolve_missing_tool() {
        let result = resolve_tool_path("nonexistent_tool_12345", None);
        assert!(matches!(result, Err(Error::ToolUnavailable { .. })));
    }

    #[test]
    fn test_resolve_prefers_existing_configured_path() {
        let exe = std::env::current_exe().unwrap();
        let resolved = resolve_tool_path("nonexistent_tool_12345", Some(&exe)).unwrap();
        assert_eq!(resolved, exe);
    }

    #[test]
    fn test_available_requires_path() {
        let info = ToolInfo::available("ffmpeg", "/usr/bin/ffmpeg");
        assert_eq!(info.require().unwrap(), Path::new("/usr/bin/ffmpeg"));

        let info = ToolInfo::unavailable("ffmpeg", "missing");
        let err = info.require().unwrap_err();
        assert_eq!(err.to_string(), "Tool unavailable: ffmpeg: missing");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_nonzero_exit_is_unavailable() {
        let info = probe_tool("false", None, "--version", Duration::from_secs(2)).await;
        if info.path.is_none() && info.error.as_deref().is_some_and(|e| e.contains("PATH")) {
            // `false` is not installed here; nothing to check.
            return;
        }
        assert!(!info.available);
    }
}
