//! CPU selection and pinning for worker threads.
//!
//! CPU sets use the taskset/numactl list syntax: `"0"`, `"0-7"`, `"0-3,8,10-11"`.

use std::sync::atomic::{AtomicUsize, Ordering};

use core_affinity::CoreId;
use tracing::debug;

use crate::error::{Result, SchedError};

/// Pin the current thread to `cpu_id`.
///
/// # Errors
///
/// Returns `SchedError::AffinityFailed` if the OS refuses.
pub fn pin_to_cpu(cpu_id: usize) -> Result<()> {
    if core_affinity::set_for_current(CoreId { id: cpu_id }) {
        debug!(cpu_id, "pinned thread to CPU");
        Ok(())
    } else {
        Err(SchedError::AffinityFailed(cpu_id))
    }
}

/// Logical CPUs visible to this process.
pub fn available_cpus() -> Vec<usize> {
    core_affinity::get_core_ids()
        .map(|ids| ids.into_iter().map(|core| core.id).collect())
        .unwrap_or_default()
}

/// Highest CPU id accepted in a CPU list (Linux caps `NR_CPUS` at 8192).
pub const MAX_CPU_ID: usize = 8191;

/// Parse a CPU list into sorted, deduplicated CPU ids.
///
/// # Errors
///
/// Returns `SchedError::InvalidConfig` on malformed input, an empty list, or
/// an id above [`MAX_CPU_ID`].
pub fn parse_cpuset(s: &str) -> Result<Vec<usize>> {
    let invalid = |what: String| SchedError::InvalidConfig(format!("cpuset `{s}`: {what}"));
    let parse_id = |tok: &str| -> Result<usize> {
        let tok = tok.trim();
        let id = tok
            .parse::<usize>()
            .map_err(|_| invalid(format!("`{tok}` is not a CPU id")))?;
        if id > MAX_CPU_ID {
            return Err(invalid(format!("CPU {id} exceeds the maximum id {MAX_CPU_ID}")));
        }
        Ok(id)
    };

    let mut cpus = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse_id(lo)?, parse_id(hi)?);
                if lo > hi {
                    return Err(invalid(format!("range {lo}-{hi} is reversed")));
                }
                cpus.extend(lo..=hi);
            }
            None => cpus.push(parse_id(part)?),
        }
    }
    if cpus.is_empty() {
        return Err(invalid("no CPUs listed".to_string()));
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

/// CPUs the workers may use: the configured set (checked against what the
/// system reports) or every available CPU.
pub fn resolve_cpus(cpuset: Option<&str>) -> Result<Vec<usize>> {
    let available = available_cpus();
    match cpuset {
        Some(s) => {
            let cpus = parse_cpuset(s)?;
            if let Some(missing) = cpus.iter().find(|c| !available.contains(c)) {
                return Err(SchedError::InvalidConfig(format!(
                    "CPU {missing} is not available"
                )));
            }
            Ok(cpus)
        }
        None if available.is_empty() => Err(SchedError::InvalidConfig(
            "no CPUs reported by the system".to_string(),
        )),
        None => Ok(available),
    }
}

/// Hands out CPUs to threads in round-robin order.
#[derive(Debug)]
pub struct CpuAllocator {
    cpus: Vec<usize>,
    next: AtomicUsize,
}

impl CpuAllocator {
    /// Create an allocator over `cpus`.
    ///
    /// # Panics
    ///
    /// Panics if `cpus` is empty.
    pub fn new(cpus: Vec<usize>) -> Self {
        assert!(!cpus.is_empty(), "CPU allocator requires at least one CPU");
        Self {
            cpus,
            next: AtomicUsize::new(0),
        }
    }

    /// Next CPU in round-robin order. Thread-safe.
    pub fn allocate(&self) -> usize {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.cpus.len();
        self.cpus[i]
    }

    /// CPUs in rotation.
    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }
}

/// Render a CPU list compactly, collapsing runs into ranges.
pub fn format_cpuset(cpus: &[usize]) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut iter = cpus.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        out.push(if start == end {
            start.to_string()
        } else {
            format!("{start}-{end}")
        });
    }
    out.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpuset() {
        assert_eq!(parse_cpuset("3").unwrap(), vec![3]);
        assert_eq!(parse_cpuset("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpuset(" 8-9, 0 ,2").unwrap(), vec![0, 2, 8, 9]);
        assert_eq!(parse_cpuset("0-2,1-3").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_parse_cpuset_errors() {
        assert!(parse_cpuset("").is_err());
        assert!(parse_cpuset(" , ").is_err());
        assert!(parse_cpuset("x").is_err());
        assert!(parse_cpuset("5-3").is_err());
        assert!(parse_cpuset("-1").is_err());
    }

    #[test]
    fn test_parse_cpuset_rejects_huge_ids() {
        for input in ["0-18446744073709551615", "0-4000000000", "8192", "1,9000-9001"] {
            match parse_cpuset(input) {
                Err(SchedError::InvalidConfig(msg)) => assert!(msg.contains("exceeds"), "{msg}"),
                other => panic!("{input} accepted: {other:?}"),
            }
        }
        assert_eq!(parse_cpuset("8190-8191").unwrap(), vec![8190, 8191]);
    }

    #[test]
    fn test_builder_rejects_huge_cpuset() {
        let err = crate::SchedulerBuilder::new()
            .cpuset("0-18446744073709551615")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchedError::InvalidConfig(_)));
    }

    #[test]
    fn test_format_cpuset() {
        assert_eq!(format_cpuset(&[0, 1, 2, 3, 8, 10, 11]), "0-3,8,10-11");
        assert_eq!(format_cpuset(&[5]), "5");
        assert_eq!(format_cpuset(&[]), "");
    }

    #[test]
    fn test_allocator_round_robin() {
        let alloc = CpuAllocator::new(vec![1, 3]);
        assert_eq!(alloc.allocate(), 1);
        assert_eq!(alloc.allocate(), 3);
        assert_eq!(alloc.allocate(), 1);
    }

    #[test]
    #[should_panic(expected = "CPU allocator requires at least one CPU")]
    fn test_allocator_empty_panics() {
        let _ = CpuAllocator::new(vec![]);
    }

    #[test]
    fn test_resolve_rejects_missing_cpu() {
        assert!(resolve_cpus(Some("99999")).is_err());
        assert!(!resolve_cpus(None).unwrap().is_empty());
    }
}
