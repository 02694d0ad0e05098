//! Host facts reported to the control plane.

use sysinfo::System;

use crate::types::HostFacts;

const OS_RELEASE: &str = "/etc/os-release";

/// Gather facts about this host.
#[must_use]
pub fn collect() -> HostFacts {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu();

    let os_release = std::fs::read_to_string(OS_RELEASE).unwrap_or_default();
    let (distro_id, distro_release, distro_codename) = parse_os_release(&os_release);

    HostFacts {
        distro_id: distro_id.unwrap_or_else(System::distribution_id),
        distro_release: distro_release.or_else(System::os_version).unwrap_or_default(),
        distro_codename: distro_codename.unwrap_or_default(),
        mem_total: sys.total_memory(),
        cpu_total: sys.cpus().len() as u64,
        cpu_type: sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| std::env::consts::ARCH.to_string()),
    }
}

/// Pull `ID`, `VERSION_ID` and `VERSION_CODENAME` out of an os-release file.
fn parse_os_release(raw: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut id = None;
    let mut version = None;
    let mut codename = None;
    for line in raw.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        if value.is_empty() {
            continue;
        }
        match key {
            "ID" => id = Some(value),
            "VERSION_ID" => version = Some(value),
            "VERSION_CODENAME" => codename = Some(value),
            _ => {}
        }
    }
    (id, version, codename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_os_release() {
        let raw = r#"
NAME="Ubuntu"
VERSION="14.04.5 LTS, Trusty Tahr"
ID=ubuntu
VERSION_ID="14.04"
VERSION_CODENAME=trusty
# comment
"#;
        assert_eq!(
            parse_os_release(raw),
            (
                Some("ubuntu".into()),
                Some("14.04".into()),
                Some("trusty".into())
            )
        );
        assert_eq!(parse_os_release("VERSION_CODENAME=\n"), (None, None, None));
    }

    #[test]
    fn collects_live_facts() {
        let facts = collect();
        assert!(facts.cpu_total >= 1);
        assert!(facts.mem_total > 0);
        assert!(!facts.cpu_type.is_empty());
    }
}
