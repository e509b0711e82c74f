//! Scalar steps shared by both execution strategies.
//!
//! The strategies differ only in how they reduce, broadcast and split
//! vector loops. The arithmetic that decides whether a row gets updated and
//! by how much lives here, once.

use crate::{real, HS_MAX_EXP};

/// Position of `dot` in a sigmoid table of `exp_length` samples spanning
/// `[-HS_MAX_EXP, HS_MAX_EXP)`.
///
/// Meaningful only for `dot >= -HS_MAX_EXP`. The result can equal
/// `exp_length` (or exceed it) for `dot >= HS_MAX_EXP`; callers check.
pub fn exp_index(dot: real, exp_length: usize) -> usize {
    let scale = f64::from(exp_length as real / HS_MAX_EXP) / 2.0;
    (f64::from(dot + HS_MAX_EXP) * scale) as usize
}

/// Gradient (times the learning rate) for one hierarchical-softmax node.
///
/// Returns `None` when the update is skipped: `dot` outside
/// `[-HS_MAX_EXP, HS_MAX_EXP)`, or a lookup index past the end of the table.
pub fn hs_gradient(dot: real, code: u8, alpha: real, exp_table: &[real]) -> Option<real> {
    if dot < -HS_MAX_EXP || dot >= HS_MAX_EXP {
        return None;
    }
    let f = *exp_table.get(exp_index(dot, exp_table.len()))?;
    Some((1.0 - real::from(code) - f) * alpha)
}

/// Gradient (times the learning rate) for one negative-sampling target.
///
/// `code` is 1 for the positive sample, 0 for negative ones. Saturated dot
/// products never consult the table. Returns `None` only when an in-range
/// dot product maps past the end of the table.
pub fn ns_gradient(dot: real, code: u8, alpha: real, exp_table: &[real]) -> Option<real> {
    let label = real::from(code);
    if dot > HS_MAX_EXP {
        Some((label - 1.0) * alpha)
    } else if dot < -HS_MAX_EXP {
        Some(label * alpha)
    } else {
        let f = *exp_table.get(exp_index(dot, exp_table.len()))?;
        Some((label - f) * alpha)
    }
}

/// The linear congruential generator word2vec uses for everything random.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rng(pub u64);

impl Rng {
    pub fn rand_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(25214903917).wrapping_add(11);
        self.0
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`.
    pub fn rand_real(&mut self) -> real {
        (self.rand_u64() & 0xFFFF) as real / 65536.0
    }
}
