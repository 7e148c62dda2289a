//! Server-recognition state fed by detector actions.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::detector::{ClassLoadEvent, DomainRef, LoaderRef, ServerDetector};
use crate::error::DetectResult;

/// One detector firing on one class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerDetection {
    pub server: ServerDetector,
    pub class_name: String,
    pub loader: Option<LoaderRef>,
    pub domain: Option<DomainRef>,
    pub detected_at: DateTime<Utc>,
}

impl ServerDetection {
    pub fn new(server: ServerDetector, event: &ClassLoadEvent<'_>) -> Self {
        Self {
            server,
            class_name: event.class_name.to_string(),
            loader: event.loader,
            domain: event.domain,
            detected_at: Utc::now(),
        }
    }
}

/// Receives detections. Implementations are called from class-definition
/// threads and must not block on anything the class loader may hold.
pub trait ServerRecognition: Send + Sync {
    fn record(&self, detection: ServerDetection) -> DetectResult<()>;
}

/// Recognition entry for a server seen at least once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectedServer {
    /// The first detection wins; later ones only bump `hits`.
    pub first: ServerDetection,
    pub hits: u64,
}

/// Concurrent in-memory recognition state.
#[derive(Debug, Default)]
pub struct DetectedServers {
    servers: DashMap<ServerDetector, DetectedServer>,
}

impl DetectedServers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_detected(&self, server: ServerDetector) -> bool {
        self.servers.contains_key(&server)
    }

    pub fn get(&self, server: ServerDetector) -> Option<DetectedServer> {
        self.servers.get(&server).map(|entry| entry.value().clone())
    }

    /// Detected servers, sorted for stable output.
    pub fn servers(&self) -> Vec<ServerDetector> {
        let mut out: Vec<_> = self.servers.iter().map(|entry| *entry.key()).collect();
        out.sort_unstable();
        out
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl ServerRecognition for DetectedServers {
    fn record(&self, detection: ServerDetection) -> DetectResult<()> {
        self.servers
            .entry(detection.server)
            .and_modify(|entry| entry.hits += 1)
            .or_insert_with(|| DetectedServer {
                first: detection,
                hits: 1,
            });
        Ok(())
    }
}
