#![deny(unsafe_code)]
//! # warden-cpu-guard
//!
//! CPU self-protection for the Warden agent.
//!
//! The agent must never be the reason its host falls over. A background
//! controller samples the host process's CPU usage every few seconds and
//! compares it to a budget derived from the cores the process may run on:
//!
//! - three consecutive over-budget samples suspend protective hooks
//! - a single sample back within budget re-arms them
//!
//! The decision is published through a lock-free [`ProtectionSwitch`] that the
//! instrumentation layer reads on every intercepted call.

pub mod budget;
pub mod config;
pub mod controller;
pub mod error;
pub mod procfs;
pub mod sampler;
pub mod state;
pub mod switch;

pub use budget::{parse_affinity_list, CpuBudget, CpuBudgetCalculator};
pub use config::GuardConfig;
pub use controller::{
    ControllerHandle, ControllerStats, ProcController, ProtectionEvent, SelfProtectionController,
    TickOutcome, UsageProbe,
};
pub use error::{GuardError, GuardResult};
pub use procfs::{AffinitySource, CpuTimeSource, ProcFs};
pub use sampler::{CpuSample, CpuSampler};
pub use state::{
    ProtectionState, ProtectionStateMachine, Transition, ViolationStreak, VIOLATION_STREAK_CAPACITY,
};
pub use switch::ProtectionSwitch;
