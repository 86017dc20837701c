use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Tasks go through the broker.
    Durable,
    /// Tasks run inline on the submitting path, one at a time.
    Fallback,
}

/// Current dispatch mode. Only ever moves from durable to fallback.
#[derive(Debug)]
pub struct DispatchMode {
    fallback: AtomicBool,
}

impl DispatchMode {
    pub fn durable() -> Self {
        Self {
            fallback: AtomicBool::new(false),
        }
    }

    pub fn fallback() -> Self {
        Self {
            fallback: AtomicBool::new(true),
        }
    }

    pub fn current(&self) -> QueueMode {
        if self.is_fallback() {
            QueueMode::Fallback
        } else {
            QueueMode::Durable
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.load(Ordering::Acquire)
    }

    /// Returns true only for the call that performed the transition.
    pub fn enter_fallback(&self) -> bool {
        !self.fallback.swap(true, Ordering::AcqRel)
    }
}
