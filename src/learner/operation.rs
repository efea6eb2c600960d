//! The operation log: one audit record per learner step, plus the process
//! resource measurements attached to it.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// What a learner step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    NewDemonstration,
    NewNegativeExample,
}

/// Audit record of one learner step. The history of operations is linear and
/// is the only mechanism for undo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: u64,
    pub kind: OperationKind,
    /// Library entries inserted by this step.
    pub added: Vec<String>,
    /// Library entries evicted by this step.
    pub removed: Vec<String>,
    /// For demonstrations: whether the library gained information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<bool>,
    /// For demonstrations: the library entry explaining the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Filter level the step finished at.
    pub filter_level: usize,
    pub wall_time_ms: f64,
    pub cpu_time_ms: f64,
    /// Peak resident set size of the process, in KiB.
    pub peak_memory_kib: u64,
}

/// Wall-clock and process CPU timer.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    wall: Instant,
    cpu: Duration,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            wall: Instant::now(),
            cpu: process_cpu_time(),
        }
    }

    /// `(wall, cpu)` time since [`Stopwatch::start`].
    pub fn elapsed(&self) -> (Duration, Duration) {
        (
            self.wall.elapsed(),
            process_cpu_time().saturating_sub(self.cpu),
        )
    }
}

#[cfg(unix)]
pub fn process_cpu_time() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: clock_gettime only writes into the timespec we own.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return Duration::ZERO;
    }
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

#[cfg(not(unix))]
pub fn process_cpu_time() -> Duration {
    Duration::ZERO
}

#[cfg(unix)]
pub fn peak_memory_kib() -> u64 {
    // SAFETY: an all-zero rusage is a valid value, and getrusage only writes
    // into the struct we own.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return 0;
    }
    // ru_maxrss is reported in KiB on Linux and in bytes on macOS.
    if cfg!(target_os = "macos") {
        usage.ru_maxrss as u64 / 1024
    } else {
        usage.ru_maxrss as u64
    }
}

#[cfg(not(unix))]
pub fn peak_memory_kib() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwatch_is_monotonic() {
        let sw = Stopwatch::start();
        let mut acc = 0u64;
        for i in 0..10_000u64 {
            acc = acc.wrapping_add(i * i);
        }
        assert!(acc > 0);
        let (wall, cpu) = sw.elapsed();
        assert!(wall >= Duration::ZERO);
        assert!(cpu >= Duration::ZERO);
    }

    #[cfg(unix)]
    #[test]
    fn peak_memory_is_reported() {
        assert!(peak_memory_kib() > 0);
    }

    #[test]
    fn operation_json_omits_demonstration_fields_when_absent() {
        let op = Operation {
            id: 3,
            kind: OperationKind::NewNegativeExample,
            added: vec![],
            removed: vec!["action-1".into()],
            updated: None,
            schema: None,
            filter_level: 0,
            wall_time_ms: 1.5,
            cpu_time_ms: 1.0,
            peak_memory_kib: 1024,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"kind\":\"new_negative_example\""));
        assert!(!json.contains("updated"));
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
