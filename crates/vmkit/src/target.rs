//! Target resolution: turn user input into an ordered list of VM names.
//!
//! Accepted forms:
//! - empty or `all` (any case): the full inventory, in host order
//! - a path to a file listing VM names
//! - an inline list
//!
//! Lists are split on newlines, commas and semicolons. Order is preserved and
//! duplicates are kept.

use crate::backend::Hypervisor;
use crate::error::Result;
use std::fs;
use std::path::Path;

const SEPARATORS: [char; 3] = ['\n', ',', ';'];

/// Resolve a raw target spec to VM names.
///
/// Named entries are not checked against the inventory here; the batch
/// executor looks each one up right before acting on it so that a missing
/// VM fails only its own entry.
pub fn resolve(raw: &str, hypervisor: &dyn Hypervisor) -> Result<Vec<String>> {
    let trimmed = raw.trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        let vms = hypervisor.list_vms()?;
        log::debug!("resolved all to {} machines", vms.len());
        return Ok(vms.into_iter().map(|vm| vm.name).collect());
    }

    let expanded = shellexpand::tilde(trimmed);
    let path = Path::new(expanded.as_ref());
    if path.is_file() {
        let content = fs::read_to_string(path)?;
        let names = split_targets(&content);
        log::debug!("read {} targets from {}", names.len(), path.display());
        return Ok(names);
    }

    Ok(split_targets(trimmed))
}

/// Split on newline/comma/semicolon, trim, drop empty tokens.
pub fn split_targets(text: &str) -> Vec<String> {
    text.split(SEPARATORS.as_slice())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, SimVm};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lab() -> MemoryBackend {
        MemoryBackend::new()
            .with_vm(SimVm::new("web01"))
            .with_vm(SimVm::new("db01"))
            .with_vm(SimVm::new("cache01"))
    }

    #[test]
    fn test_all_returns_inventory_order() {
        let backend = lab();
        assert_eq!(
            resolve("all", &backend).unwrap(),
            ["web01", "db01", "cache01"]
        );
        assert_eq!(resolve("ALL", &backend).unwrap().len(), 3);
        assert_eq!(resolve("  ", &backend).unwrap().len(), 3);
    }

    #[test]
    fn test_file_with_mixed_separators() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "vm1,vm2; vm3\nvm4").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert_eq!(
            resolve(&path, &lab()).unwrap(),
            ["vm1", "vm2", "vm3", "vm4"]
        );
    }

    #[test]
    fn test_inline_list() {
        assert_eq!(resolve("vm1;vm2", &lab()).unwrap(), ["vm1", "vm2"]);
        assert_eq!(resolve("web01", &lab()).unwrap(), ["web01"]);
    }

    #[test]
    fn test_duplicates_and_empty_tokens() {
        assert_eq!(
            split_targets("a,,a ; ;\n\nb"),
            ["a", "a", "b"]
        );
    }

    #[test]
    fn test_empty_file_resolves_to_nothing() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(resolve(&path, &lab()).unwrap().is_empty());
    }

    #[test]
    fn test_crlf_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "vm1\r\nvm2\r\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert_eq!(resolve(&path, &lab()).unwrap(), ["vm1", "vm2"]);
    }
}
