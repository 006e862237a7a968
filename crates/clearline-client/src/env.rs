//! Production environment: tokio clock, system wall clock, OS randomness.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clearline_core::Environment;
use rand::{RngCore, rngs::OsRng};

/// Environment backed by the real system.
///
/// Monotonic time comes from tokio's clock so a paused test runtime and the
/// driver's timers agree.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn unix_time(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        OsRng.fill_bytes(buffer);
    }
}
