//! Process CPU usage since the previous sample.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::GuardResult;
use crate::procfs::CpuTimeSource;

/// Percentage points contributed by one fully busy core.
const PERCENT_PER_CORE: f64 = 100.0;

/// CPU time and wall time elapsed between two ticks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpuSample {
    pub cpu_delta: Duration,
    pub wall_delta: Duration,
}

impl CpuSample {
    /// Usage on a 100-per-core scale: two busy cores read 200.
    pub fn usage_percent(&self) -> f64 {
        if self.wall_delta.is_zero() {
            return 0.0;
        }
        self.cpu_delta.as_secs_f64() * PERCENT_PER_CORE / self.wall_delta.as_secs_f64()
    }
}

/// Samples a process's CPU consumption against wall-clock time.
///
/// The first successful read only seeds the baseline.
pub struct CpuSampler<S> {
    source: S,
    pid: u32,
    baseline: Option<(Duration, Instant)>,
}

impl<S: CpuTimeSource> CpuSampler<S> {
    pub fn new(source: S, pid: u32) -> Self {
        Self {
            source,
            pid,
            baseline: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Drop the baseline so the next call seeds again.
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// Usage percent since the previous call, `None` while seeding.
    pub fn sample(&mut self) -> GuardResult<Option<f64>> {
        self.sample_at(Instant::now())
    }

    pub fn sample_at(&mut self, now: Instant) -> GuardResult<Option<f64>> {
        Ok(self.observe_at(now)?.map(|s| s.usage_percent()))
    }

    /// Raw deltas since the previous call. A failed read keeps the old
    /// baseline so the next good read spans the gap.
    pub fn observe_at(&mut self, now: Instant) -> GuardResult<Option<CpuSample>> {
        let cpu = self.source.process_cpu_time(self.pid)?;
        let Some((prev_cpu, prev_wall)) = self.baseline.replace((cpu, now)) else {
            return Ok(None);
        };

        let wall_delta = now.saturating_duration_since(prev_wall);
        if wall_delta.is_zero() {
            return Ok(None);
        }
        Ok(Some(CpuSample {
            cpu_delta: cpu.saturating_sub(prev_cpu),
            wall_delta,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted CPU times; `None` simulates an unreadable source.
    struct Scripted(Mutex<VecDeque<Option<Duration>>>);

    impl Scripted {
        fn new(times: impl IntoIterator<Item = Option<u64>>) -> Self {
            Self(Mutex::new(
                times
                    .into_iter()
                    .map(|t| t.map(Duration::from_millis))
                    .collect(),
            ))
        }
    }

    impl CpuTimeSource for Scripted {
        fn process_cpu_time(&self, _pid: u32) -> GuardResult<Duration> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .flatten()
                .ok_or_else(|| GuardError::unavailable("scripted", "gone"))
        }
    }

    #[test]
    fn first_call_is_baseline() {
        let mut sampler = CpuSampler::new(Scripted::new([Some(5_000)]), 1);
        let t0 = Instant::now();
        assert_eq!(sampler.sample_at(t0).unwrap(), None);
        assert!(sampler.has_baseline());
    }

    #[test]
    fn two_busy_cores_read_two_hundred() {
        let mut sampler = CpuSampler::new(Scripted::new([Some(1_000), Some(11_000)]), 1);
        let t0 = Instant::now();
        sampler.sample_at(t0).unwrap();
        let usage = sampler.sample_at(t0 + Duration::from_secs(5)).unwrap().unwrap();
        assert!((usage - 200.0).abs() < 1e-9, "usage {}", usage);
    }

    #[test]
    fn zero_wall_interval_is_not_a_measurement() {
        let mut sampler = CpuSampler::new(Scripted::new([Some(0), Some(100)]), 1);
        let t0 = Instant::now();
        sampler.sample_at(t0).unwrap();
        assert_eq!(sampler.sample_at(t0).unwrap(), None);
    }

    #[test]
    fn failure_keeps_baseline() {
        let mut sampler = CpuSampler::new(Scripted::new([Some(0), None, Some(5_000)]), 1);
        let t0 = Instant::now();
        sampler.sample_at(t0).unwrap();

        let err = sampler.sample_at(t0 + Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, GuardError::ResourceUnavailable { .. }));

        // Spans both intervals: 5 s of CPU over 10 s of wall time.
        let usage = sampler.sample_at(t0 + Duration::from_secs(10)).unwrap().unwrap();
        assert!((usage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn cpu_time_going_backwards_reads_zero() {
        let mut sampler = CpuSampler::new(Scripted::new([Some(9_000), Some(1_000)]), 1);
        let t0 = Instant::now();
        sampler.sample_at(t0).unwrap();
        assert_eq!(sampler.sample_at(t0 + Duration::from_secs(1)).unwrap(), Some(0.0));
    }

    #[test]
    fn reset_reseeds() {
        let mut sampler = CpuSampler::new(Scripted::new([Some(0), Some(0)]), 1);
        let t0 = Instant::now();
        sampler.sample_at(t0).unwrap();
        sampler.reset();
        assert!(!sampler.has_baseline());
        assert_eq!(sampler.sample_at(t0 + Duration::from_secs(1)).unwrap(), None);
    }

    #[test]
    fn sample_usage_percent_handles_zero_wall() {
        let sample = CpuSample {
            cpu_delta: Duration::from_secs(1),
            wall_delta: Duration::ZERO,
        };
        assert_eq!(sample.usage_percent(), 0.0);
    }
}
