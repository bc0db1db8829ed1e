use std::path::Path;

/// Resolve the node name an agent reports.
///
/// A non-blank `override_name` wins. Otherwise the host's own name is used.
/// Called once at startup; the result is passed into the agent service.
pub fn resolve_node_name(override_name: Option<&str>) -> String {
    if let Some(name) = override_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    host_name()
}

fn host_name() -> String {
    for path in ["/proc/sys/kernel/hostname", "/etc/hostname"] {
        if let Some(name) = read_trimmed(Path::new(path)) {
            return name;
        }
    }
    std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn read_trimmed(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let trimmed = contents.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_takes_precedence() {
        assert_eq!(resolve_node_name(Some("worker-7")), "worker-7");
        assert_eq!(resolve_node_name(Some("  worker-7\n")), "worker-7");
    }

    #[test]
    fn blank_override_falls_back_to_host_name() {
        let fallback = resolve_node_name(None);
        assert!(!fallback.is_empty());
        assert_eq!(resolve_node_name(Some("   ")), fallback);
    }

    #[test]
    fn read_trimmed_ignores_missing_and_blank_files() {
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank");
        std::fs::write(&blank, "\n").unwrap();
        let named = dir.path().join("named");
        std::fs::write(&named, "node-a\n").unwrap();

        assert_eq!(read_trimmed(&dir.path().join("missing")), None);
        assert_eq!(read_trimmed(&blank), None);
        assert_eq!(read_trimmed(&named).as_deref(), Some("node-a"));
    }
}
