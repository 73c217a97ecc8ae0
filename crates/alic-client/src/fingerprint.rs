//! Device fingerprint

use std::env::consts::{ARCH, OS};

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

fn read_trimmed(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| read_trimmed("/etc/hostname"))
        .unwrap_or_default()
}

/// Stable identifier for this machine and OS install.
///
/// Joins hostname, architecture, OS and machine id with `#`. Missing parts
/// are left empty so the shape stays the same everywhere.
pub fn machine_fingerprint() -> String {
    let machine_id = MACHINE_ID_PATHS
        .iter()
        .find_map(|p| read_trimmed(p))
        .unwrap_or_default();

    [hostname(), ARCH.to_string(), OS.to_string(), machine_id].join("#")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(machine_fingerprint(), machine_fingerprint());
    }

    #[test]
    fn fingerprint_has_four_parts() {
        let fp = machine_fingerprint();
        assert_eq!(fp.split('#').count(), 4);
        assert!(fp.contains(ARCH));
    }
}
