use crate::detector::ServerDetector;
use crate::error::{DetectError, DetectResult};

/// Fixed set of server detectors.
///
/// Built once and never mutated afterwards, so it can be shared across
/// class-definition threads behind an `Arc` without any synchronization.
#[derive(Clone, Debug)]
pub struct DetectorRegistry {
    detectors: Vec<ServerDetector>,
}

impl DetectorRegistry {
    /// Registry holding every supported server detector.
    pub fn standard() -> Self {
        Self {
            detectors: ServerDetector::ALL.to_vec(),
        }
    }

    /// Build a registry from an explicit detector list.
    pub fn from_detectors(detectors: impl IntoIterator<Item = ServerDetector>) -> DetectResult<Self> {
        let mut out: Vec<ServerDetector> = Vec::new();
        for detector in detectors {
            if out.contains(&detector) {
                return Err(DetectError::DuplicateDetector(detector.name()));
            }
            out.push(detector);
        }
        Ok(Self { detectors: out })
    }

    /// True if any registered detector recognizes the class. No side effects.
    pub fn matches(&self, class_name: &str) -> bool {
        self.detectors.iter().any(|d| d.is_class_matched(class_name))
    }

    /// All registered detectors that recognize the class.
    pub fn matching<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = ServerDetector> + 'a {
        self.detectors
            .iter()
            .copied()
            .filter(move |d| d.is_class_matched(class_name))
    }

    pub fn iter(&self) -> impl Iterator<Item = ServerDetector> + '_ {
        self.detectors.iter().copied()
    }

    pub fn contains(&self, detector: ServerDetector) -> bool {
        self.detectors.contains(&detector)
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
