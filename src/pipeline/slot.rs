use std::sync::{Arc, RwLock};

use crate::pipeline::runtime::VoiceDetector;

/// The one place a running service swaps models. Readers clone the `Arc` and
/// keep using their detector even while a replacement is installed.
pub struct DetectorSlot {
    current: RwLock<Arc<VoiceDetector>>,
}

impl DetectorSlot {
    pub fn new(detector: VoiceDetector) -> Self {
        Self {
            current: RwLock::new(Arc::new(detector)),
        }
    }

    pub fn current(&self) -> Arc<VoiceDetector> {
        // A panicking writer cannot leave a half-swapped pair behind.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Installs `detector` and returns the one it replaced.
    pub fn replace(&self, detector: VoiceDetector) -> Arc<VoiceDetector> {
        let next = Arc::new(detector);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        tracing::info!(
            previous = guard.pair_id().unwrap_or("unpaired"),
            next = next.pair_id().unwrap_or("unpaired"),
            "detector replaced"
        );
        std::mem::replace(&mut *guard, next)
    }
}
