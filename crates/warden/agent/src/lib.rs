#![deny(unsafe_code)]
//! # warden-agent
//!
//! Runtime assembly of the Warden protection core:
//!
//! - [`Agent`]: builds the detector registry, dispatcher, protection switch
//!   and CPU self-protection controller, and owns their lifecycle
//! - [`AgentConfig`]: layered configuration (defaults, file, `WARDEN_*` env)
//! - [`init_tracing`]: subscriber setup for the `wardend` binary
//! - [`replay_classes`]: offline class-load replay through the detectors

pub mod agent;
pub mod config;
pub mod error;
pub mod replay;
pub mod telemetry;

pub use agent::Agent;
pub use crate::config::{AgentConfig, DetectionConfig, LoggingConfig};
pub use error::{AgentError, AgentResult};
pub use replay::{replay_classes, ReplaySummary};
pub use telemetry::init_tracing;
