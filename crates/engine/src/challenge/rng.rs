use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

const SESSION_SEED_DOMAIN: &[u8] = b"challenge_engine.session.v1";

/// Seedable random source for decoy draws and shuffles.
///
/// Counts raw draws so callers can tell whether a code
/// path consumed randomness.
#[derive(Debug, Clone)]
pub struct ChallengeRng {
    inner: ChaCha8Rng,
    draws: u64,
}

impl ChallengeRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            draws: 0,
        }
    }

    pub fn for_session(base_seed: u64, generation: u64) -> Self {
        Self::seeded(derive_session_seed(base_seed, generation))
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }
}

impl RngCore for ChallengeRng {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.inner.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.inner.try_fill_bytes(dest)
    }
}

pub fn derive_session_seed(base_seed: u64, generation: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(SESSION_SEED_DOMAIN);
    hasher.update(base_seed.to_le_bytes());
    hasher.update(generation.to_le_bytes());
    let digest = hasher.finalize();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
