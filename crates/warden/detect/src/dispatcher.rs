//! Class-load interception point.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detector::ClassLoadEvent;
use crate::recognition::ServerRecognition;
use crate::registry::DetectorRegistry;

/// Result of dispatching one class-load event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Detectors whose predicate matched.
    pub matched: usize,
    /// Matched detectors whose action returned an error or panicked.
    pub failed: usize,
}

/// Cumulative dispatch counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub events: u64,
    pub detections: u64,
    pub failures: u64,
}

/// Offers every defined class to the detector registry.
///
/// Runs synchronously on whichever thread defines the class, possibly many at
/// once and reentrantly. Only relaxed atomic counters are touched here; a
/// failing detector action is logged and counted, never propagated.
pub struct DetectionDispatcher {
    registry: Arc<DetectorRegistry>,
    recognition: Arc<dyn ServerRecognition>,
    events: AtomicU64,
    detections: AtomicU64,
    failures: AtomicU64,
}

impl DetectionDispatcher {
    pub fn new(registry: Arc<DetectorRegistry>, recognition: Arc<dyn ServerRecognition>) -> Self {
        Self {
            registry,
            recognition,
            events: AtomicU64::new(0),
            detections: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Read-only classification query.
    pub fn matches(&self, class_name: &str) -> bool {
        self.registry.matches(class_name)
    }

    /// Run every matching detector's action for this class.
    pub fn dispatch(&self, event: &ClassLoadEvent<'_>) -> DispatchReport {
        self.events.fetch_add(1, Ordering::Relaxed);
        let mut report = DispatchReport::default();

        for detector in self.registry.matching(event.class_name) {
            report.matched += 1;
            info!(
                class_name = event.class_name,
                detector = detector.name(),
                "detect server class"
            );

            let sink = self.recognition.as_ref();
            let outcome = catch_unwind(AssertUnwindSafe(|| detector.handle(event, sink)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(detector = detector.name(), error = %e, "server detector action failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        detector = detector.name(),
                        class_name = event.class_name,
                        panic = panic_message(panic.as_ref()),
                        "server detector action panicked"
                    );
                }
            }
        }

        if report.matched > 0 {
            self.detections
                .fetch_add(report.matched as u64, Ordering::Relaxed);
        }
        if report.failed > 0 {
            self.failures.fetch_add(report.failed as u64, Ordering::Relaxed);
        }
        report
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            events: self.events.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
