//! Agent self-update.
//!
//! When the control plane expects a different agent version, the agent
//! downloads the published binary, swaps it in place and exits with
//! [`RESTART_EXIT_CODE`] so its supervisor starts the new one.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::client::ControlApi;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

/// Exit code asking the supervisor to restart the agent (`EX_TEMPFAIL`).
pub const RESTART_EXIT_CODE: i32 = 75;

/// Write `binary` over `target` atomically, executable.
///
/// # Errors
///
/// Returns `AgentError::State` if the file cannot be written or renamed.
pub fn install_binary(binary: &[u8], target: &Path) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| AgentError::State(format!("{} has no parent", target.display())))?;
    let io = |e: std::io::Error| AgentError::State(format!("install {}: {e}", target.display()));

    let mut tmp = NamedTempFile::new_in(dir).map_err(io)?;
    tmp.write_all(binary).map_err(io)?;
    tmp.as_file().sync_all().map_err(io)?;
    std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o755)).map_err(io)?;
    tmp.persist(target).map_err(|e| io(e.error))?;
    Ok(())
}

/// Replace `executable` with the published agent and record `version`.
///
/// # Errors
///
/// Returns an error if the download, install or config update fails. The
/// running binary is untouched unless the install step succeeded.
pub async fn self_update(
    api: &dyn ControlApi,
    executable: &Path,
    config: &mut AgentConfig,
    config_path: &Path,
    version: &str,
) -> Result<()> {
    tracing::warn!(from = %config.version, to = %version, "Upgrading agent");
    let binary = api.download_agent().await?;
    if binary.is_empty() {
        return Err(AgentError::State("downloaded agent binary is empty".to_string()));
    }

    install_binary(&binary, executable)?;
    config.version = version.to_string();
    config.save(config_path)?;
    tracing::info!(path = %executable.display(), bytes = binary.len(), "Agent binary replaced");
    Ok(())
}
