//! Deterministic environment.
//!
//! Randomness comes from a seeded ChaCha stream shared by every clone, so a
//! run with the same seed produces the same session keys and challenges.
//! Time is tokio's clock: a paused test runtime or a turmoil host controls
//! it, and the wall clock is derived from it.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use clearline_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall clock reported at the moment the environment is created.
const DEFAULT_UNIX_BASE: u64 = 1_700_000_000;

/// Seeded environment for tests and simulations.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    origin: Instant,
    unix_base: u64,
}

impl SimEnv {
    /// Environment seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            origin: tokio::time::Instant::now().into_std(),
            unix_base: DEFAULT_UNIX_BASE,
        }
    }

    /// Independent RNG derived from this environment's stream.
    pub fn fork_rng(&self) -> ChaCha8Rng {
        let mut seed = [0u8; 32];
        self.random_bytes(&mut seed);
        ChaCha8Rng::from_seed(seed)
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn unix_time(&self) -> u64 {
        self.unix_base + self.now().saturating_duration_since(self.origin).as_secs()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        let (mut x, mut y) = ([0u8; 16], [0u8; 16]);
        a.random_bytes(&mut x);
        b.random_bytes(&mut y);
        assert_eq!(x, y);

        let c = SimEnv::with_seed(8);
        c.random_bytes(&mut y);
        assert_ne!(x, y);
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_follows_paused_time() {
        let env = SimEnv::with_seed(1);
        assert_eq!(env.unix_time(), DEFAULT_UNIX_BASE);

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(env.unix_time(), DEFAULT_UNIX_BASE + 90);
    }
}
