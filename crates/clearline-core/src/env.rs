//! Environment abstraction.
//!
//! Everything nondeterministic the protocol needs (monotonic time, wall
//! clock, randomness) flows through [`Environment`]. Production uses the
//! system clock and OS randomness; tests use a seeded RNG on a paused clock
//! so handshakes, challenges and session keys are reproducible.

use std::time::Instant;

/// Source of time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic now. Must agree with the clock the driver sleeps on.
    fn now(&self) -> Instant;

    /// Wall clock in whole seconds since the Unix epoch.
    fn unix_time(&self) -> u64;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}
