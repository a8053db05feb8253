//! Scheduler contract and the four concrete variants.
//!
//! Variants are not a class hierarchy: each is a `Scheduler` impl that
//! drives one submission loop plus whatever controller daemons its arrival
//! process needs (slow-start, sustain, linear-ramp), all parameterized by
//! the same shared `Run`/pool/RNG rather than inherited state.

pub mod concurrent;
pub mod linear;
pub mod poisson;
pub mod sustained;

use std::future::Future;
use std::pin::Pin;

/// Yielded once a run's scheduler loop (and its daemons) have stopped
/// submitting and the pool has drained.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub experiment_id: String,
    pub total_start_time: f64,
    pub total_end_time: f64,
}

/// Observable scheduler lifecycle. Not reified as an enum
/// field anywhere — it's the shape every `Scheduler::run` impl follows:
/// submit while `Running`, stop submitting and await pool drain in
/// `Draining`, return `RunResult` once `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Draining,
    Done,
}

/// A request-arrival strategy. `run` drives the scheduler to completion and
/// yields the final result; it owns nothing the caller doesn't hand it.
pub trait Scheduler: Send {
    fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = RunResult> + Send>>;
}

/// Deterministic (non-cryptographic) string hash used by the RNG seed
/// formula: `base_seed + hash(runner_id) % 10000 + salt`. `std`'s `HashMap`
/// hasher is randomized per process, so seeding from it would make runs
/// non-reproducible; this is FNV-1a, fixed across runs.
pub fn stable_hash(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// RNG seed for a scheduler variant. `salt` decorrelates streams across
/// parallel runners sharing a `base_seed`; matches the original
/// implementation's per-variant salts (128 for the fixed-concurrency
/// runner, 121 for every Poisson-family runner).
pub fn seed_for(base_seed: u64, runner_id: &str, salt: u64) -> u64 {
    base_seed
        .wrapping_add(stable_hash(runner_id) % 10000)
        .wrapping_add(salt)
}

pub const SALT_CONCURRENT: u64 = 128;
pub const SALT_POISSON: u64 = 121;

/// Picks a body uniformly at random, or `None` if `bodies` is empty.
pub fn pick_body(bodies: &[Vec<u8>], rng: &mut impl rand::Rng) -> Option<Vec<u8>> {
    if bodies.is_empty() {
        None
    } else {
        let idx = rng.gen_range(0..bodies.len());
        Some(bodies[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_deterministic() {
        assert_eq!(stable_hash("runner-a"), stable_hash("runner-a"));
        assert_ne!(stable_hash("runner-a"), stable_hash("runner-b"));
    }

    #[test]
    fn seed_differs_by_salt() {
        let a = seed_for(42, "runner-a", SALT_CONCURRENT);
        let b = seed_for(42, "runner-a", SALT_POISSON);
        assert_ne!(a, b);
    }

    #[test]
    fn pick_body_empty_is_none() {
        let mut rng = rand::thread_rng();
        assert_eq!(pick_body(&[], &mut rng), None);
    }

    #[test]
    fn pick_body_nonempty_picks_a_member() {
        let mut rng = rand::thread_rng();
        let bodies = vec![b"a".to_vec(), b"b".to_vec()];
        let picked = pick_body(&bodies, &mut rng).unwrap();
        assert!(bodies.contains(&picked));
    }
}
