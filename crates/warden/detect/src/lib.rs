#![deny(unsafe_code)]
//! # warden-detect
//!
//! Application-server recognition on the class-definition path.
//!
//! Every class the host defines is offered to a fixed set of server
//! detectors. A detector whose signature class matches records what it saw
//! into the server-recognition state so server-specific protection can be
//! switched on. Detectors are independent and non-exclusive: one class may
//! satisfy several of them.
//!
//! - [`ServerDetector`]: the closed set of supported servers
//! - [`DetectorRegistry`]: immutable collection built once at startup
//! - [`DetectionDispatcher`]: the class-load interception point
//! - [`ServerRecognition`]: sink for detections, [`DetectedServers`] by default

pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod recognition;
pub mod registry;

pub use detector::{ClassLoadEvent, DomainRef, LoaderRef, ServerDetector};
pub use dispatcher::{DetectionDispatcher, DispatchReport, DispatchStats};
pub use error::{DetectError, DetectResult};
pub use recognition::{DetectedServer, DetectedServers, ServerDetection, ServerRecognition};
pub use registry::DetectorRegistry;
