//! Allowed CPU ceiling derived from core affinity.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GuardError, GuardResult};
use crate::procfs::AffinitySource;

/// Allowed cores times the configured usage fraction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpuBudget {
    pub allowed_cores: u32,
    pub usage_fraction: f64,
}

impl CpuBudget {
    /// Ceiling on the same 100-per-core scale as measured usage.
    pub fn ceiling(&self) -> f64 {
        f64::from(self.allowed_cores) * 100.0 * self.usage_fraction
    }
}

/// Count the core indices covered by an affinity list such as `"0-3,7"`.
pub fn parse_affinity_list(list: &str) -> GuardResult<u32> {
    let list = list.trim();
    if list.is_empty() {
        return Err(GuardError::parse("cpu affinity list", list));
    }

    let mut total: u32 = 0;
    for token in list.split(',') {
        let token = token.trim();
        let count = match token.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_index(lo, list)?;
                let hi = parse_index(hi, list)?;
                if hi < lo {
                    return Err(GuardError::parse("cpu affinity list", list));
                }
                (hi - lo)
                    .checked_add(1)
                    .ok_or_else(|| GuardError::parse("cpu affinity list", list))?
            }
            None => {
                parse_index(token, list)?;
                1
            }
        };
        total = total
            .checked_add(count)
            .ok_or_else(|| GuardError::parse("cpu affinity list", list))?;
    }
    Ok(total)
}

fn parse_index(s: &str, list: &str) -> GuardResult<u32> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| GuardError::parse("cpu affinity list", list))
}

/// Computes the CPU budget of a process.
pub struct CpuBudgetCalculator<A> {
    source: A,
}

impl<A: AffinitySource> CpuBudgetCalculator<A> {
    pub fn new(source: A) -> Self {
        Self { source }
    }

    /// Allowed core count, or 0 when the affinity cannot be read or parsed.
    pub fn allowed_cores(&self, pid: u32) -> u32 {
        match self
            .source
            .cpus_allowed_list(pid)
            .and_then(|list| parse_affinity_list(&list))
        {
            Ok(cores) => cores,
            Err(e) => {
                // TODO: confirm with product owners whether a zero budget
                // (every busy tick counts as overload) is the wanted fallback.
                warn!(pid, error = %e, "failed to read allowed cpu count, budget is 0");
                0
            }
        }
    }

    pub fn budget_for(&self, pid: u32, usage_fraction: f64) -> CpuBudget {
        CpuBudget {
            allowed_cores: self.allowed_cores(pid),
            usage_fraction,
        }
    }

    pub fn budget(&self, pid: u32, usage_fraction: f64) -> f64 {
        self.budget_for(pid, usage_fraction).ceiling()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<&'static str>);

    impl AffinitySource for Fixed {
        fn cpus_allowed_list(&self, _pid: u32) -> GuardResult<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| GuardError::unavailable("fixed", "missing"))
        }
    }

    #[test]
    fn counts_ranges_and_singletons() {
        assert_eq!(parse_affinity_list("0-3,7").unwrap(), 5);
        assert_eq!(parse_affinity_list("0").unwrap(), 1);
        assert_eq!(parse_affinity_list("0-63").unwrap(), 64);
        assert_eq!(parse_affinity_list(" 2 , 4-5 ").unwrap(), 3);
        assert_eq!(parse_affinity_list("3-3").unwrap(), 1);
    }

    #[test]
    fn malformed_lists() {
        for bad in [
            "",
            "  ",
            "a",
            "0-",
            "-3",
            "3-1",
            "0,,1",
            "0-3:2",
            "1-2-3",
            "0-4294967295",
            "0-4294967294,7",
            "4294967296",
        ] {
            assert!(parse_affinity_list(bad).is_err(), "{:?} should fail", bad);
        }
    }

    #[test]
    fn widest_ranges_count_exactly() {
        assert_eq!(parse_affinity_list("1-4294967295").unwrap(), u32::MAX);
        assert_eq!(parse_affinity_list("4294967295").unwrap(), 1);
    }

    #[test]
    fn overflowing_affinity_gives_zero_budget() {
        let calc = CpuBudgetCalculator::new(Fixed(Some("0-4294967295")));
        assert_eq!(calc.allowed_cores(1), 0);
        assert_eq!(calc.budget(1, 0.9), 0.0);
    }

    #[test]
    fn four_cores_at_half_is_two_hundred() {
        let calc = CpuBudgetCalculator::new(Fixed(Some("0-3")));
        assert_eq!(calc.allowed_cores(1), 4);
        assert_eq!(calc.budget(1, 0.5), 200.0);
    }

    #[test]
    fn malformed_affinity_gives_zero_budget() {
        let calc = CpuBudgetCalculator::new(Fixed(Some("garbage")));
        assert_eq!(calc.allowed_cores(1), 0);
        assert_eq!(calc.budget(1, 0.9), 0.0);
    }

    #[test]
    fn missing_affinity_gives_zero_budget() {
        let calc = CpuBudgetCalculator::new(Fixed(None));
        let budget = calc.budget_for(1, 0.9);
        assert_eq!(budget.allowed_cores, 0);
        assert_eq!(budget.ceiling(), 0.0);
    }
}
