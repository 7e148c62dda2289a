//! Hysteretic Armed/Suspended state machine.

use serde::{Deserialize, Serialize};

/// Consecutive over-budget ticks needed to suspend protection.
pub const VIOLATION_STREAK_CAPACITY: usize = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectionState {
    /// Protective hooks enabled.
    #[default]
    Armed,
    /// Protective hooks disabled while the host is overloaded.
    Suspended,
}

impl ProtectionState {
    pub fn hooks_enabled(&self) -> bool {
        matches!(self, Self::Armed)
    }
}

impl std::fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Armed => write!(f, "Armed"),
            Self::Suspended => write!(f, "Suspended"),
        }
    }
}

/// Over-budget usage values of the current streak, bounded at
/// [`VIOLATION_STREAK_CAPACITY`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationStreak {
    usages: Vec<f64>,
}

impl ViolationStreak {
    pub fn new() -> Self {
        Self {
            usages: Vec::with_capacity(VIOLATION_STREAK_CAPACITY),
        }
    }

    /// Returns true once the streak is full. Pushes beyond capacity are dropped.
    pub fn push(&mut self, usage: f64) -> bool {
        if !self.is_full() {
            self.usages.push(usage);
        }
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.usages.len() >= VIOLATION_STREAK_CAPACITY
    }

    pub fn clear(&mut self) {
        self.usages.clear();
    }

    pub fn len(&self) -> usize {
        self.usages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }

    pub fn usages(&self) -> &[f64] {
        &self.usages
    }
}

/// A state change caused by one observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ProtectionState,
    pub to: ProtectionState,
    pub usage: f64,
    pub budget: f64,
}

/// Trips after a full violation streak, recovers on the first good tick.
#[derive(Clone, Debug, Default)]
pub struct ProtectionStateMachine {
    state: ProtectionState,
    streak: ViolationStreak,
}

impl ProtectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProtectionState {
        self.state
    }

    pub fn streak(&self) -> &ViolationStreak {
        &self.streak
    }

    pub fn observe(&mut self, usage: f64, budget: f64) -> Option<Transition> {
        let from = self.state;

        if usage > budget {
            if from == ProtectionState::Armed && self.streak.push(usage) {
                self.state = ProtectionState::Suspended;
            }
        } else {
            self.streak.clear();
            self.state = ProtectionState::Armed;
        }

        (self.state != from).then(|| Transition {
            from,
            to: self.state,
            usage,
            budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(machine: &mut ProtectionStateMachine, usages: &[f64], budget: f64) -> Vec<Option<Transition>> {
        usages.iter().map(|&u| machine.observe(u, budget)).collect()
    }

    #[test]
    fn trips_on_third_violation() {
        let mut machine = ProtectionStateMachine::new();
        let transitions = run(&mut machine, &[250.0, 250.0, 250.0], 200.0);
        assert!(transitions[0].is_none());
        assert!(transitions[1].is_none());
        let trip = transitions[2].as_ref().unwrap();
        assert_eq!(trip.from, ProtectionState::Armed);
        assert_eq!(trip.to, ProtectionState::Suspended);
        assert_eq!(machine.state(), ProtectionState::Suspended);
    }

    #[test]
    fn good_tick_resets_streak() {
        let mut machine = ProtectionStateMachine::new();
        let transitions = run(&mut machine, &[250.0, 250.0, 50.0], 200.0);
        assert!(transitions.iter().all(Option::is_none));
        assert_eq!(machine.state(), ProtectionState::Armed);
        assert!(machine.streak().is_empty());

        // Two more violations are not enough after the reset.
        run(&mut machine, &[250.0, 250.0], 200.0);
        assert_eq!(machine.state(), ProtectionState::Armed);
    }

    #[test]
    fn single_good_tick_recovers() {
        let mut machine = ProtectionStateMachine::new();
        run(&mut machine, &[300.0; 3], 200.0);
        let recovery = machine.observe(200.0, 200.0).unwrap();
        assert_eq!(recovery.to, ProtectionState::Armed);
        assert!(machine.streak().is_empty());
    }

    #[test]
    fn streak_bounded_while_suspended() {
        let mut machine = ProtectionStateMachine::new();
        let transitions = run(&mut machine, &[300.0; 10], 200.0);
        assert_eq!(transitions.iter().filter(|t| t.is_some()).count(), 1);
        assert_eq!(machine.streak().len(), VIOLATION_STREAK_CAPACITY);
        assert_eq!(machine.streak().usages(), &[300.0, 300.0, 300.0]);
    }

    #[test]
    fn zero_budget_counts_any_usage() {
        let mut machine = ProtectionStateMachine::new();
        run(&mut machine, &[0.1, 0.1, 0.1], 0.0);
        assert_eq!(machine.state(), ProtectionState::Suspended);
        // Exactly zero usage is within a zero budget.
        assert!(machine.observe(0.0, 0.0).is_some());
    }

    #[test]
    fn usage_equal_to_budget_is_within() {
        let mut machine = ProtectionStateMachine::new();
        run(&mut machine, &[200.0; 5], 200.0);
        assert_eq!(machine.state(), ProtectionState::Armed);
    }

    #[test]
    fn streak_push_caps() {
        let mut streak = ViolationStreak::new();
        assert!(!streak.push(1.0));
        assert!(!streak.push(2.0));
        assert!(streak.push(3.0));
        assert!(streak.push(4.0));
        assert_eq!(streak.usages(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn state_display() {
        assert_eq!(ProtectionState::Suspended.to_string(), "Suspended");
        assert!(ProtectionState::Armed.hooks_enabled());
        assert!(!ProtectionState::Suspended.hooks_enabled());
    }
}
