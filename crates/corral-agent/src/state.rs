//! Agent state persisted between cycles.
//!
//! Stored as CBOR in `<state_dir>/agent.state`. A missing or unreadable
//! file starts the agent from scratch, which at worst re-sends facts,
//! container reports and log output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use corral_core::Name;

use crate::error::{AgentError, Result};
use crate::types::HostFacts;

const STATE_FILE: &str = "agent.state";

/// What the agent remembers across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Host facts last pushed to the control plane.
    #[serde(default)]
    pub facts: Option<HostFacts>,
    /// Console log bytes already relayed, per container.
    #[serde(default)]
    pub log_offsets: BTreeMap<Name, u64>,
    /// Addresses last reported, per container.
    #[serde(default)]
    pub ips: BTreeMap<Name, Vec<String>>,
}

impl AgentState {
    /// Path of the state file inside `dir`.
    #[must_use]
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(STATE_FILE)
    }

    /// Load state from `dir`, or start empty.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let path = Self::path(dir);
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unable to open agent state, starting fresh");
                return Self::default();
            }
        };
        ciborium::from_reader(std::io::BufReader::new(file)).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable agent state");
            Self::default()
        })
    }

    /// Atomically write state to `dir`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::State` if the file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .map_err(|e| AgentError::State(format!("create {}: {e}", dir.display())))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AgentError::State(e.to_string()))?;
        ciborium::into_writer(self, &mut tmp).map_err(|e| AgentError::State(e.to_string()))?;
        tmp.persist(Self::path(dir))
            .map_err(|e| AgentError::State(e.error.to_string()))?;
        Ok(())
    }

    /// Drop everything remembered about containers not in `keep`.
    pub fn retain_containers<'a>(&mut self, keep: impl IntoIterator<Item = &'a Name>) {
        let keep: std::collections::BTreeSet<&Name> = keep.into_iter().collect();
        self.log_offsets.retain(|name, _| keep.contains(name));
        self.ips.retain(|name, _| keep.contains(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn missing_or_corrupt_state_starts_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(AgentState::load(dir.path()), AgentState::default());

        std::fs::write(AgentState::path(dir.path()), b"\xff\x00garbage").unwrap();
        assert_eq!(AgentState::load(dir.path()), AgentState::default());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut state = AgentState::default();
        state.log_offsets.insert(name("c"), 42);
        state.ips.insert(name("c"), vec!["10.0.3.2".into()]);
        state.facts = Some(HostFacts {
            distro_id: "debian".into(),
            distro_release: "8".into(),
            distro_codename: "jessie".into(),
            mem_total: 1 << 30,
            cpu_total: 2,
            cpu_type: "arm".into(),
        });

        state.save(dir.path()).unwrap();
        assert_eq!(AgentState::load(dir.path()), state);
    }

    #[test]
    fn retain_drops_forgotten_containers() {
        let mut state = AgentState::default();
        state.log_offsets.insert(name("a"), 1);
        state.log_offsets.insert(name("b"), 2);
        state.ips.insert(name("b"), vec![]);

        state.retain_containers([&name("a")]);
        assert_eq!(state.log_offsets.len(), 1);
        assert!(state.ips.is_empty());
    }
}
