//! Newtype wrappers for kernel identifiers
//!
//! Keeps process ids, CPU ids and tracepoint names from being mixed up in
//! function signatures.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Process ID (TGID in Linux terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Logical CPU index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU:{}", self.0)
    }
}

/// Kernel tracepoint, e.g. `sched/sched_process_exec`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tracepoint {
    pub category: String,
    pub name: String,
}

impl Tracepoint {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self { category: category.into(), name: name.into() }
    }
}

impl fmt::Display for Tracepoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid tracepoint '{0}', expected CATEGORY/NAME")]
pub struct ParseTracepointError(String);

impl FromStr for Tracepoint {
    type Err = ParseTracepointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((category, name))
                if !category.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(category, name))
            }
            _ => Err(ParseTracepointError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tracepoint() {
        let tp: Tracepoint = "syscalls/sys_enter_execve".parse().unwrap();
        assert_eq!(tp, Tracepoint::new("syscalls", "sys_enter_execve"));
        assert_eq!(tp.to_string(), "syscalls/sys_enter_execve");
    }

    #[test]
    fn test_parse_tracepoint_rejects_malformed() {
        for bad in ["sched", "/sched_process_exec", "sched/", "a/b/c"] {
            assert!(bad.parse::<Tracepoint>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(4242).to_string(), "PID:4242");
    }
}
