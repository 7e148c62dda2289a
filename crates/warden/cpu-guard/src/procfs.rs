//! OS process-information sources.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GuardError, GuardResult};

const CPUS_ALLOWED_LIST: &str = "Cpus_allowed_list";

/// Default `USER_HZ` on Linux.
pub const DEFAULT_CLOCK_TICKS_PER_SEC: u64 = 100;

/// Cumulative CPU time consumed by a process.
pub trait CpuTimeSource: Send {
    fn process_cpu_time(&self, pid: u32) -> GuardResult<Duration>;
}

/// Raw CPU-affinity listing for a process, e.g. `"0-3,7"`.
pub trait AffinitySource: Send {
    fn cpus_allowed_list(&self, pid: u32) -> GuardResult<String>;
}

/// Reads `/proc/<pid>/stat` and `/proc/<pid>/status`.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    clock_ticks_per_sec: u64,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Use an alternative proc mount, mostly for tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            clock_ticks_per_sec: DEFAULT_CLOCK_TICKS_PER_SEC,
        }
    }

    pub fn with_clock_ticks(mut self, ticks_per_sec: u64) -> Self {
        self.clock_ticks_per_sec = ticks_per_sec.max(1);
        self
    }

    fn read(&self, pid: u32, file: &str) -> GuardResult<String> {
        let path = self.root.join(pid.to_string()).join(file);
        read_to_string(&path)
    }
}

fn read_to_string(path: &Path) -> GuardResult<String> {
    fs::read_to_string(path).map_err(|e| GuardError::unavailable(path.display().to_string(), e))
}

impl CpuTimeSource for ProcFs {
    fn process_cpu_time(&self, pid: u32) -> GuardResult<Duration> {
        let stat = self.read(pid, "stat")?;
        let ticks = parse_stat_cpu_ticks(&stat)?;
        let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(self.clock_ticks_per_sec);
        Ok(Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64))
    }
}

impl AffinitySource for ProcFs {
    fn cpus_allowed_list(&self, pid: u32) -> GuardResult<String> {
        let status = self.read(pid, "status")?;
        parse_status_affinity(&status)
            .map(str::to_string)
            .ok_or_else(|| GuardError::parse("process status", CPUS_ALLOWED_LIST))
    }
}

/// utime + stime, in clock ticks, from a `/proc/<pid>/stat` line.
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
pub fn parse_stat_cpu_ticks(stat: &str) -> GuardResult<u64> {
    let rest = stat
        .rfind(')')
        .map(|idx| &stat[idx + 1..])
        .ok_or_else(|| GuardError::parse("process stat", stat.trim()))?;

    // Field 3 (state) is index 0 here; utime is field 14, stime field 15.
    let mut fields = rest.split_whitespace().skip(11);
    let utime = fields.next().and_then(|f| f.parse::<u64>().ok());
    let stime = fields.next().and_then(|f| f.parse::<u64>().ok());
    match (utime, stime) {
        (Some(u), Some(s)) => Ok(u.saturating_add(s)),
        _ => Err(GuardError::parse("process stat", stat.trim())),
    }
}

/// Value of the `Cpus_allowed_list` line of `/proc/<pid>/status`.
pub fn parse_status_affinity(status: &str) -> Option<&str> {
    status
        .lines()
        .find(|line| line.starts_with(CPUS_ALLOWED_LIST))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "4242 (java (main)) S 1 4242 4242 0 -1 4194560 181 0 0 0 250 75 0 0 20 0 30 0 8812 3 4 5";

    #[test]
    fn stat_ticks_skip_tricky_comm() {
        assert_eq!(parse_stat_cpu_ticks(STAT).unwrap(), 325);
    }

    #[test]
    fn stat_truncated_is_error() {
        assert!(parse_stat_cpu_ticks("4242 (java) S 1 2 3").is_err());
        assert!(parse_stat_cpu_ticks("no parens at all").is_err());
    }

    #[test]
    fn status_affinity_line() {
        let status = "Name:\tjava\nCpus_allowed:\tff\nCpus_allowed_list:\t0-3,7\nMems_allowed_list:\t0\n";
        assert_eq!(parse_status_affinity(status), Some("0-3,7"));
        assert_eq!(parse_status_affinity("Name:\tjava\n"), None);
    }

    #[test]
    fn reads_from_alternate_root() {
        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path().join("4242");
        fs::create_dir_all(&proc_dir).unwrap();
        fs::write(proc_dir.join("stat"), STAT).unwrap();
        fs::write(proc_dir.join("status"), "Cpus_allowed_list:\t0-1\n").unwrap();

        let procfs = ProcFs::with_root(dir.path());
        assert_eq!(
            procfs.process_cpu_time(4242).unwrap(),
            Duration::from_millis(3250)
        );
        assert_eq!(procfs.cpus_allowed_list(4242).unwrap(), "0-1");

        let err = procfs.process_cpu_time(1).unwrap_err();
        assert!(matches!(err, GuardError::ResourceUnavailable { .. }));
    }

    #[test]
    fn clock_ticks_scale_cpu_time() {
        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path().join("7");
        fs::create_dir_all(&proc_dir).unwrap();
        fs::write(proc_dir.join("stat"), STAT).unwrap();

        let procfs = ProcFs::with_root(dir.path()).with_clock_ticks(1000);
        assert_eq!(procfs.process_cpu_time(7).unwrap(), Duration::from_millis(325));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reads_own_process() {
        let procfs = ProcFs::new();
        assert!(procfs.process_cpu_time(std::process::id()).is_ok());
        assert!(!procfs.cpus_allowed_list(std::process::id()).unwrap().is_empty());
    }
}
