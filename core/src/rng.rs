//! Deterministic random number generation for synthetic networks.
//!
//! RULE: nothing here may call a platform RNG. A network generated from a
//! seed is identical on every run, so demos and property sweeps reproduce.
//!
//! Each purpose gets its own stream, seeded from (seed XOR stream index), so
//! drawing more from one stream never shifts another.

use crate::types::PromoterId;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Stable stream assignments. Append only; reordering changes every stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    Topology = 0,
    Pins = 1,
    Onboarding = 2,
}

pub struct NetworkRng {
    inner: Pcg64Mcg,
}

impl NetworkRng {
    pub fn new(seed: u64, stream: Stream) -> Self {
        let derived = seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived),
        }
    }

    /// Uniform in [0, n). `n` must be > 0.
    pub fn below(&mut self, n: usize) -> usize {
        self.inner.gen_range(0..n)
    }

    pub fn between(&mut self, lo: i64, hi_inclusive: i64) -> i64 {
        self.inner.gen_range(lo..=hi_inclusive)
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.inner.gen_bool(p.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPromoter {
    pub promoter_id: PromoterId,
    pub parent_promoter_id: Option<PromoterId>,
    pub pins: i64,
}

/// A random forest of `count` promoters. Each one either starts a new root
/// (rarely) or hangs off a promoter generated before it, so parents always
/// precede children and the result is acyclic.
pub fn generate_network(seed: u64, count: usize) -> Vec<GeneratedPromoter> {
    let mut topo = NetworkRng::new(seed, Stream::Topology);
    let mut pins = NetworkRng::new(seed, Stream::Pins);
    let mut out: Vec<GeneratedPromoter> = Vec::with_capacity(count);

    for i in 0..count {
        let parent = if out.is_empty() || topo.chance(0.05) {
            None
        } else {
            // Bias toward recent promoters so chains get deep.
            let window = out.len().min(8);
            let idx = out.len() - 1 - topo.below(window);
            Some(out[idx].promoter_id.clone())
        };
        out.push(GeneratedPromoter {
            promoter_id: format!("P-{seed}-{i:04}"),
            parent_promoter_id: parent,
            pins: pins.between(0, 5),
        });
    }
    out
}

/// Pick which promoter performs each of `customers` onboardings.
pub fn onboarding_plan(seed: u64, promoters: &[GeneratedPromoter], customers: usize) -> Vec<PromoterId> {
    if promoters.is_empty() {
        return Vec::new();
    }
    let mut rng = NetworkRng::new(seed, Stream::Onboarding);
    (0..customers)
        .map(|_| promoters[rng.below(promoters.len())].promoter_id.clone())
        .collect()
}
