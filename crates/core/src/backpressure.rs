//! Storage backpressure flag
//!
//! Process-wide pause signal flipped by the storage guard and consumed by
//! the release selector. Compare-and-swap so each edge is observed once.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct StoragePause {
    paused: AtomicBool,
}

impl StoragePause {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
        }
    }

    /// Set the pause flag. Returns true when this call flipped it.
    pub fn pause(&self) -> bool {
        self.paused
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the pause flag. Returns true when this call flipped it.
    pub fn resume(&self) -> bool {
        self.paused
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_edge_is_observed_exactly_once() {
        let pause = StoragePause::new();
        assert!(!pause.is_paused());

        assert!(pause.pause());
        assert!(!pause.pause());
        assert!(pause.is_paused());

        assert!(pause.resume());
        assert!(!pause.resume());
        assert!(!pause.is_paused());
    }
}
