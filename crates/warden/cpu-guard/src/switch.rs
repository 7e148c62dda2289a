use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "protective hooks enabled" flag.
///
/// Single writer (the controller, plus the occasional operator override),
/// any number of readers on the hook hot path. Readers never lock and may
/// observe a value up to one tick stale.
#[derive(Clone, Debug)]
pub struct ProtectionSwitch {
    enabled: Arc<AtomicBool>,
}

impl Default for ProtectionSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtectionSwitch {
    /// Starts enabled.
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Controller write. Returns the previous value.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::AcqRel)
    }

    /// Operator override; holds until the controller's next tick.
    pub fn force(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}
