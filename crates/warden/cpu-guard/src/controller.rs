//! Periodic CPU self-protection loop.
//!
//! Each tick compares the host's CPU usage against its budget and drives the
//! [`ProtectionStateMachine`]. The resulting state is written to the shared
//! [`ProtectionSwitch`] that every protective hook reads before running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::CpuBudgetCalculator;
use crate::config::GuardConfig;
use crate::error::{GuardError, GuardResult};
use crate::procfs::{AffinitySource, CpuTimeSource, ProcFs, DEFAULT_CLOCK_TICKS_PER_SEC};
use crate::sampler::CpuSampler;
use crate::state::{ProtectionState, ProtectionStateMachine, Transition};
use crate::switch::ProtectionSwitch;

const FALLBACK_INTERVAL: Duration = Duration::from_secs(5);

/// Source of per-tick usage readings on the 100-per-core scale.
pub trait UsageProbe: Send {
    /// `Ok(None)` means no usable reading yet (baseline).
    fn sample(&mut self) -> GuardResult<Option<f64>>;
}

impl<S: CpuTimeSource> UsageProbe for CpuSampler<S> {
    fn sample(&mut self) -> GuardResult<Option<f64>> {
        CpuSampler::sample(self)
    }
}

/// Events broadcast by the controller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ProtectionEvent {
    /// Hooks disabled after a full violation streak.
    Suspended {
        usage: f64,
        budget: f64,
        streak: Vec<f64>,
        at: DateTime<Utc>,
    },
    /// Hooks re-enabled.
    Armed {
        usage: f64,
        budget: f64,
        at: DateTime<Utc>,
    },
    /// Operator override applied to the switch.
    Forced { enabled: bool, at: DateTime<Utc> },
}

/// What a single tick did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// The CPU check is switched off in configuration.
    Disabled,
    /// The sampler only established its baseline.
    Baseline,
    Observed {
        usage: f64,
        budget: f64,
        state: ProtectionState,
        transition: Option<Transition>,
    },
}

/// Controller counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub ticks: u64,
    pub trips: u64,
    pub recoveries: u64,
    pub sample_failures: u64,
    pub tick_panics: u64,
    pub last_usage: Option<f64>,
    pub last_budget: Option<f64>,
}

/// Drives the Armed/Suspended state from CPU measurements.
pub struct SelfProtectionController<U, A> {
    probe: U,
    calculator: CpuBudgetCalculator<A>,
    pid: u32,
    machine: ProtectionStateMachine,
    switch: ProtectionSwitch,
    config: watch::Receiver<GuardConfig>,
    /// Last configuration that passed validation.
    active: GuardConfig,
    events: broadcast::Sender<ProtectionEvent>,
    stats: ControllerStats,
}

/// Controller reading the real `/proc`.
pub type ProcController = SelfProtectionController<CpuSampler<ProcFs>, ProcFs>;

impl ProcController {
    /// CPU times are converted with the configured `clock_ticks_per_sec`
    /// (Linux `USER_HZ`, 100 unless the kernel says otherwise).
    pub fn for_process(
        pid: u32,
        switch: ProtectionSwitch,
        config: watch::Receiver<GuardConfig>,
    ) -> Self {
        let clock_ticks_per_sec = match config.borrow().clock_ticks_per_sec {
            0 => DEFAULT_CLOCK_TICKS_PER_SEC,
            ticks => ticks,
        };
        Self::new(
            CpuSampler::new(ProcFs::new().with_clock_ticks(clock_ticks_per_sec), pid),
            CpuBudgetCalculator::new(ProcFs::new()),
            pid,
            switch,
            config,
        )
    }
}

impl<U: UsageProbe, A: AffinitySource> SelfProtectionController<U, A> {
    pub fn new(
        probe: U,
        calculator: CpuBudgetCalculator<A>,
        pid: u32,
        switch: ProtectionSwitch,
        config: watch::Receiver<GuardConfig>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let initial = config.borrow().clone();
        let active = match initial.validate() {
            Ok(()) => initial,
            Err(e) => {
                warn!(error = %e, "cpu guard configuration rejected, using defaults");
                GuardConfig::default()
            }
        };
        Self {
            probe,
            calculator,
            pid,
            machine: ProtectionStateMachine::new(),
            switch,
            config,
            active,
            events,
            stats: ControllerStats::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProtectionEvent> {
        self.events.subscribe()
    }

    pub fn switch(&self) -> &ProtectionSwitch {
        &self.switch
    }

    pub fn state(&self) -> ProtectionState {
        self.machine.state()
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// Configuration the controller is currently acting on.
    pub fn active_config(&self) -> &GuardConfig {
        &self.active
    }

    /// Latest configuration if it validates, otherwise the last one that did.
    fn effective_config(&mut self) -> GuardConfig {
        let latest = self.config.borrow().clone();
        match latest.validate() {
            Ok(()) => self.active = latest,
            Err(e) => debug!(error = %e, "ignoring invalid cpu guard configuration"),
        }
        self.active.clone()
    }

    /// One measurement step. Never fails: sampling errors count as an idle
    /// reading and affinity errors as a zero budget.
    pub fn tick(&mut self) -> TickOutcome {
        let config = self.effective_config();
        if !config.enabled {
            self.release();
            return TickOutcome::Disabled;
        }

        self.stats.ticks += 1;
        let usage = match self.probe.sample() {
            Ok(Some(usage)) => usage,
            Ok(None) => {
                debug!(pid = self.pid, "cpu sampler baseline established");
                return TickOutcome::Baseline;
            }
            Err(e) => {
                self.stats.sample_failures += 1;
                warn!(pid = self.pid, error = %e, "count cpu usage failed, treating tick as idle");
                0.0
            }
        };
        let budget = self.calculator.budget(self.pid, config.usage_fraction);
        self.stats.last_usage = Some(usage);
        self.stats.last_budget = Some(budget);

        let transition = self.machine.observe(usage, budget);
        if let Some(transition) = &transition {
            self.announce(transition);
        }
        self.switch.set_enabled(self.machine.state().hooks_enabled());

        debug!(
            pid = self.pid,
            usage,
            budget,
            state = %self.machine.state(),
            streak = self.machine.streak().len(),
            "cpu self-protection tick"
        );

        TickOutcome::Observed {
            usage,
            budget,
            state: self.machine.state(),
            transition,
        }
    }

    /// Leaves Suspended when the check is switched off, so a disabled guard
    /// never keeps hooks down.
    fn release(&mut self) {
        if self.machine.state() == ProtectionState::Suspended {
            self.machine = ProtectionStateMachine::new();
            self.switch.set_enabled(true);
            self.stats.recoveries += 1;
            info!(pid = self.pid, "cpu self-protection disabled, protective hooks re-armed");
            let _ = self.events.send(ProtectionEvent::Armed {
                usage: self.stats.last_usage.unwrap_or(0.0),
                budget: self.stats.last_budget.unwrap_or(0.0),
                at: Utc::now(),
            });
        }
    }

    fn announce(&mut self, transition: &Transition) {
        match transition.to {
            ProtectionState::Suspended => {
                self.stats.trips += 1;
                warn!(
                    pid = self.pid,
                    usage = transition.usage,
                    budget = transition.budget,
                    streak = ?self.machine.streak().usages(),
                    "cpu usage over budget, protective hooks suspended"
                );
                let _ = self.events.send(ProtectionEvent::Suspended {
                    usage: transition.usage,
                    budget: transition.budget,
                    streak: self.machine.streak().usages().to_vec(),
                    at: Utc::now(),
                });
            }
            ProtectionState::Armed => {
                self.stats.recoveries += 1;
                info!(
                    pid = self.pid,
                    usage = transition.usage,
                    budget = transition.budget,
                    "cpu usage within budget, protective hooks re-armed"
                );
                let _ = self.events.send(ProtectionEvent::Armed {
                    usage: transition.usage,
                    budget: transition.budget,
                    at: Utc::now(),
                });
            }
        }
    }

    /// Adopts the latest configuration and its operator override, if any.
    /// An invalid configuration is rejected whole.
    fn apply_config(&mut self) {
        let config = self.config.borrow_and_update().clone();
        if let Err(e) = config.validate() {
            warn!(error = %e, "cpu guard configuration rejected, keeping last valid configuration");
            return;
        }
        self.active = config.clone();
        if let Some(enabled) = config.force_hooks_enabled {
            self.switch.force(enabled);
            info!(enabled, "protective hooks forced by configuration");
            let _ = self.events.send(ProtectionEvent::Forced {
                enabled,
                at: Utc::now(),
            });
        }
    }

    fn interval(&self) -> Duration {
        let interval = self.active.sample_interval();
        if interval.is_zero() {
            FALLBACK_INTERVAL
        } else {
            interval
        }
    }

    /// Tick every `sample_interval` until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> ControllerStats {
        info!(pid = self.pid, interval = ?self.interval(), "cpu self-protection started");
        self.apply_config();

        let mut config_open = true;
        let mut next_tick = Instant::now() + self.interval();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.config.changed(), if config_open => match changed {
                    Ok(()) => self.apply_config(),
                    Err(_) => {
                        debug!("configuration channel closed, keeping last cpu guard configuration");
                        config_open = false;
                    }
                },
                _ = tokio::time::sleep_until(next_tick) => {
                    if catch_unwind(AssertUnwindSafe(|| self.tick())).is_err() {
                        self.stats.tick_panics += 1;
                        warn!(pid = self.pid, "cpu self-protection tick panicked");
                    }
                    next_tick = Instant::now() + self.interval();
                }
            }
        }

        info!(pid = self.pid, ticks = self.stats.ticks, "cpu self-protection stopped");
        self.stats
    }
}

impl<U, A> SelfProtectionController<U, A>
where
    U: UsageProbe + 'static,
    A: AffinitySource + 'static,
{
    /// Run on the current tokio runtime, stopping when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> ControllerHandle {
        let join = tokio::spawn(self.run(cancel.clone()));
        ControllerHandle { cancel, join }
    }
}

/// Handle to a spawned controller task.
pub struct ControllerHandle {
    cancel: CancellationToken,
    join: JoinHandle<ControllerStats>,
}

impl ControllerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) -> GuardResult<ControllerStats> {
        self.cancel.cancel();
        self.join
            .await
            .map_err(|e| GuardError::TaskFailed(e.to_string()))
    }
}
