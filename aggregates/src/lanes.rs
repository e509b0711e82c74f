//! A fixed group of threads ("lanes") that execute one call together.
//!
//! Every lane runs the same body. Vector loops are split by [`Lane::stride`],
//! which gives element `i` to lane `i % lanes`; since every loop over a row
//! uses the same split, a lane only ever reads back elements it wrote itself.
//! The lanes exchange data only through the two shared slots defined here:
//!
//! -   an [`Accumulator`], which sums one partial value from every lane;
//! -   a [`Broadcast`], which carries a value from lane 0 to all lanes.
//!
//! Both are used through [`Lane`] methods that place the barriers. A body
//! that calls them must make every lane perform the same sequence of calls,
//! or the group deadlocks.

use std::iter::StepBy;
use std::ops::Range;
use std::sync::Barrier;
use std::thread;

use parking_lot::Mutex;
use tracing::trace;

use crate::{real, Real};

/// Largest group [`LaneGroup::new`] builds. Every launch spawns one scoped
/// thread per lane after the first.
pub const MAX_LANES: usize = 64;

/// Number of lanes, and the means to run a body on all of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneGroup {
    lanes: usize,
}

impl LaneGroup {
    /// A group of `lanes` lanes, clamped to `1..=MAX_LANES`.
    pub fn new(lanes: usize) -> Self {
        LaneGroup {
            lanes: lanes.clamp(1, MAX_LANES),
        }
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Run `body` once on every lane and wait for all of them to finish.
    ///
    /// Lane 0 runs on the calling thread. If any lane panics, the lanes still
    /// waiting on a barrier never wake up, so `body` must not panic.
    pub fn launch<F>(&self, body: F)
    where
        F: Fn(&Lane<'_>) + Sync,
    {
        trace!(lanes = self.lanes, "launching lane group");
        let barrier = Barrier::new(self.lanes);
        let lanes = self.lanes;
        thread::scope(|s| {
            let body = &body;
            let barrier = &barrier;
            for id in 1..lanes {
                s.spawn(move || body(&Lane { id, lanes, barrier }));
            }
            body(&Lane {
                id: 0,
                lanes,
                barrier,
            });
        });
    }
}

/// One lane's handle on its group.
#[derive(Debug)]
pub struct Lane<'g> {
    id: usize,
    lanes: usize,
    barrier: &'g Barrier,
}

impl Lane<'_> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Lane 0 makes the group's control decisions.
    pub fn is_leader(&self) -> bool {
        self.id == 0
    }

    /// Wait until every lane in the group reaches this point.
    pub fn sync(&self) {
        self.barrier.wait();
    }

    /// This lane's share of the indices `0..len`.
    pub fn stride(&self, len: usize) -> StepBy<Range<usize>> {
        (self.id..len).step_by(self.lanes)
    }

    /// Sum `partial` over all lanes. Every lane gets the total.
    pub fn reduce_sum(&self, acc: &Accumulator, partial: real) -> real {
        if self.is_leader() {
            acc.reset();
        }
        self.sync();
        acc.add(partial);
        self.sync();
        let total = acc.total();
        // Nobody may reset the accumulator until every lane has read it.
        self.sync();
        total
    }

    /// Lane 0 calls `produce` and stores the result in `slot`; every lane
    /// returns that value. `produce` is never called on other lanes.
    pub fn broadcast<T, F>(&self, slot: &Broadcast<T>, produce: F) -> T
    where
        T: Copy,
        F: FnOnce() -> T,
    {
        if self.is_leader() {
            slot.put(produce());
        }
        self.sync();
        let value = slot.get();
        self.sync();
        value
    }
}

/// Group-shared sum, zeroed by lane 0 before each reduction.
#[derive(Debug, Default)]
pub struct Accumulator {
    sum: Real,
}

impl Accumulator {
    fn reset(&self) {
        self.sum.set(0.0);
    }

    fn add(&self, x: real) {
        self.sum.fetch_add(x);
    }

    fn total(&self) -> real {
        self.sum.get()
    }
}

/// A group-shared slot with one writer (lane 0) and many readers.
#[derive(Debug, Default)]
pub struct Broadcast<T> {
    value: Mutex<T>,
}

impl<T: Copy> Broadcast<T> {
    fn put(&self, value: T) {
        *self.value.lock() = value;
    }

    fn get(&self) -> T {
        *self.value.lock()
    }
}
