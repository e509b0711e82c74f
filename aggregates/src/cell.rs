use std::mem;
use std::slice;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::real;

/// A `real` that several lanes can read and write through a shared reference.
///
/// Loads and stores are relaxed. Lanes that touch the same cell are ordered
/// by the group barrier, not by the cell.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

const _: () = assert!(mem::size_of::<Real>() == mem::size_of::<real>());
const _: () = assert!(mem::align_of::<Real>() == mem::align_of::<real>());

impl Real {
    pub fn new(value: real) -> Self {
        Real {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Plain read-modify-write. Only correct while no other lane writes this
    /// cell.
    pub fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }

    /// Atomically add `x`, returning the previous value.
    pub fn fetch_add(&self, x: real) -> real {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let updated = (real::from_bits(current) + x).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                updated,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return real::from_bits(current),
                Err(actual) => current = actual,
            }
        }
    }

    /// Share an exclusively borrowed buffer between lanes.
    pub fn from_mut_slice(values: &mut [real]) -> &[Real] {
        // SAFETY: `Real` is a transparent `AtomicU32`, which has the size and
        // alignment of `real` (checked above) and accepts every bit pattern.
        // The exclusive borrow rules out non-atomic access for the lifetime
        // of the returned slice.
        unsafe { slice::from_raw_parts(values.as_mut_ptr() as *const Real, values.len()) }
    }
}
