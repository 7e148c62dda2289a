//! Feed recorded class names through the detectors.

use std::io::BufRead;

use serde::{Deserialize, Serialize};
use warden_detect::{ClassLoadEvent, DetectionDispatcher};

use crate::error::AgentResult;

/// Totals for one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub classes: usize,
    pub detections: usize,
    pub failures: usize,
}

/// Dispatch one class name per line as bootstrap-loader events. Blank lines
/// and `#` comments are skipped.
pub fn replay_classes<R: BufRead>(
    reader: R,
    dispatcher: &DetectionDispatcher,
) -> AgentResult<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for line in reader.lines() {
        let line = line?;
        let class_name = line.trim();
        if class_name.is_empty() || class_name.starts_with('#') {
            continue;
        }
        let report = dispatcher.dispatch(&ClassLoadEvent::bootstrap(class_name));
        summary.classes += 1;
        summary.detections += report.matched;
        summary.failures += report.failed;
    }
    Ok(summary)
}
