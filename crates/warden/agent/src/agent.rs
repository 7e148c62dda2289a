//! Runtime wiring of detection and CPU self-protection.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_cpu_guard::{
    ControllerHandle, ControllerStats, GuardConfig, ProcController, ProtectionEvent,
    ProtectionSwitch,
};
use warden_detect::{DetectedServers, DetectionDispatcher, DetectorRegistry, ServerDetector};

use crate::config::{AgentConfig, DetectionConfig};
use crate::error::AgentResult;

/// The two agent subsystems and the handles shared with the host.
pub struct Agent {
    pid: u32,
    dispatcher: Arc<DetectionDispatcher>,
    servers: Arc<DetectedServers>,
    switch: ProtectionSwitch,
    guard_tx: watch::Sender<GuardConfig>,
    events: broadcast::Receiver<ProtectionEvent>,
    controller: Option<ProcController>,
    handle: Option<ControllerHandle>,
    cancel: CancellationToken,
}

impl Agent {
    /// Build an agent protecting `pid`. Nothing runs until [`Agent::start`].
    pub fn new(config: AgentConfig, pid: u32) -> AgentResult<Self> {
        config.guard.validate()?;

        let registry = Arc::new(build_registry(&config.detection)?);
        let servers = Arc::new(DetectedServers::new());
        let dispatcher = Arc::new(DetectionDispatcher::new(registry, servers.clone()));

        let switch = ProtectionSwitch::new();
        let (guard_tx, guard_rx) = watch::channel(config.guard);
        let controller = ProcController::for_process(pid, switch.clone(), guard_rx);
        let events = controller.subscribe();

        Ok(Self {
            pid,
            dispatcher,
            servers,
            switch,
            guard_tx,
            events,
            controller: Some(controller),
            handle: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Class-load interception point for the instrumentation layer.
    pub fn dispatcher(&self) -> Arc<DetectionDispatcher> {
        self.dispatcher.clone()
    }

    pub fn detected_servers(&self) -> Arc<DetectedServers> {
        self.servers.clone()
    }

    /// Flag read by every protective hook.
    pub fn switch(&self) -> ProtectionSwitch {
        self.switch.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProtectionEvent> {
        self.events.resubscribe()
    }

    /// Raw sender for providers that push tunables themselves. The
    /// controller ignores values that fail validation and keeps the last
    /// valid ones; [`Agent::update_guard_config`] reports the error instead.
    pub fn config_sender(&self) -> &watch::Sender<GuardConfig> {
        &self.guard_tx
    }

    /// Push new tunables from the configuration provider.
    pub fn update_guard_config(&self, config: GuardConfig) -> AgentResult<()> {
        config.validate()?;
        self.guard_tx.send_replace(config);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the self-protection loop on the current tokio runtime.
    pub fn start(&mut self) {
        if let Some(controller) = self.controller.take() {
            info!(pid = self.pid, "starting warden agent");
            self.handle = Some(controller.spawn(self.cancel.child_token()));
        }
    }

    /// Stop the loop and wait for it. Returns `None` if it never started.
    pub async fn shutdown(mut self) -> AgentResult<Option<ControllerStats>> {
        self.cancel.cancel();
        let stats = match self.handle.take() {
            Some(handle) => Some(handle.shutdown().await?),
            None => None,
        };
        info!(
            pid = self.pid,
            servers = ?self.servers.servers(),
            "warden agent stopped"
        );
        Ok(stats)
    }
}

fn build_registry(config: &DetectionConfig) -> AgentResult<DetectorRegistry> {
    if !config.enabled {
        return Ok(DetectorRegistry::from_detectors(Vec::<ServerDetector>::new())?);
    }
    Ok(match &config.servers {
        Some(servers) => DetectorRegistry::from_detectors(servers.iter().copied())?,
        None => DetectorRegistry::standard(),
    })
}
