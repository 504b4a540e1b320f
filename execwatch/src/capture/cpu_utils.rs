//! CPU utility functions
//!
//! Utilities for querying CPU information from /sys filesystem.

use std::fs;
use std::io;

use crate::domain::CpuId;

const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// Returns a vector of CPU IDs (e.g., [0, 1, 2, 3] for a 4-core system).
///
/// # Errors
/// Returns an error if the file cannot be read or has an unexpected format
pub fn online_cpus() -> io::Result<Vec<CpuId>> {
    let content = fs::read_to_string(ONLINE_CPUS_PATH)?;
    parse_cpu_list(&content).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("{ONLINE_CPUS_PATH}: {e}"))
    })
}

/// Parse a kernel CPU list like "0-3" or "0-3,8-11" (NUMA systems)
///
/// # Errors
/// Returns an error if any entry is not a number or a range of numbers
pub fn parse_cpu_list(content: &str) -> Result<Vec<CpuId>, std::num::ParseIntError> {
    let mut cpus = Vec::new();

    for range in content.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse()?;
            let end: u32 = end.parse()?;
            cpus.extend((start..=end).map(CpuId));
        } else {
            cpus.push(CpuId(range.parse()?));
        }
    }

    Ok(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        let cpus = parse_cpu_list("0-3,8-9,12\n").unwrap();
        let ids: Vec<u32> = cpus.iter().map(|c| c.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 8, 9, 12]);
    }

    #[test]
    fn test_parse_cpu_list_rejects_garbage() {
        assert!(parse_cpu_list("0-x").is_err());
    }

    #[test]
    fn test_online_cpus() {
        // This test relies on /sys being available (Linux only)
        let result = online_cpus();

        #[cfg(target_os = "linux")]
        {
            let cpus = result.expect("Failed to read online CPUs");
            assert!(!cpus.is_empty(), "Should have at least one CPU");
            for pair in cpus.windows(2) {
                assert!(pair[1] > pair[0]);
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            assert!(result.is_err());
        }
    }
}
