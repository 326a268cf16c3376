//! Sleep seam for firmware timing.
//!
//! Protocols express their reverse-engineered delays as named constants and wait through a
//! [`Sleep`] so tests can record the sequence instead of blocking.

use std::sync::Arc;
use std::time::Duration;

pub trait Sleep: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub type SharedSleep = Arc<dyn Sleep>;

pub fn thread_sleep() -> SharedSleep {
    Arc::new(ThreadSleep)
}
