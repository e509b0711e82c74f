//! Lane-group strategy.
//!
//! The kernels in this module are written from the point of view of one
//! lane: each is called by every lane of a [`LaneGroup`] with the same
//! arguments. Lane 0 makes every control decision (whether a node is
//! updated, which negative sample comes next) and hands it to the others
//! with [`Lane::broadcast`]; dot products are merged with
//! [`Lane::reduce_sum`]. All row updates are split with [`Lane::stride`].
//!
//! The `*_op` functions at the bottom launch a group for one call.

use crate::lanes::{Accumulator, Broadcast, Lane};
use crate::math::{hs_gradient, ns_gradient};
use crate::{real, Axpy, Cbow, Cells, Dot, HierarchicSoftmax, LaneGroup, Model, NegativeSampling};
use crate::{Real, Round, RowRef, Scratch, SkipGram};

/// Group-shared state for one call.
#[derive(Debug, Default)]
pub struct Shared {
    acc: Accumulator,
    gradient: Broadcast<Option<real>>,
    round: Broadcast<Option<Round>>,
}

pub fn dot(lane: &Lane<'_>, shared: &Shared, x: &[Real], y: &[Real]) -> real {
    debug_assert_eq!(x.len(), y.len());
    let partial = lane
        .stride(x.len())
        .fold(0.0, |sum, i| sum + x[i].get() * y[i].get());
    lane.reduce_sum(&shared.acc, partial)
}

/// `y += alpha * x`. Needs no barrier: each lane touches only its own
/// elements.
pub fn axpy(lane: &Lane<'_>, alpha: real, x: &[Real], y: &[Real]) {
    debug_assert_eq!(x.len(), y.len());
    for i in lane.stride(x.len()) {
        y[i].add(alpha * x[i].get());
    }
}

fn train_pair(lane: &Lane<'_>, g: real, syn0: &[Real], syn1: &[Real], neu1e: &[Real]) {
    for c in lane.stride(syn0.len()) {
        neu1e[c].add(g * syn1[c].get());
        syn1[c].add(g * syn0[c].get());
    }
}

#[allow(clippy::too_many_arguments)]
pub fn hierarchic_softmax(
    lane: &Lane<'_>,
    shared: &Shared,
    syn0: &[Real],
    syn1: &[Real],
    exp_table: &[real],
    neu1e: &[Real],
    code: u8,
    alpha: real,
) {
    let f = dot(lane, shared, syn0, syn1);
    let g = lane.broadcast(&shared.gradient, || hs_gradient(f, code, alpha, exp_table));
    if let Some(g) = g {
        train_pair(lane, g, syn0, syn1, neu1e);
    }
}

#[allow(clippy::too_many_arguments)]
pub fn negative_sampling(
    lane: &Lane<'_>,
    shared: &Shared,
    syn0: &[Real],
    syn1_neg: &[Real],
    exp_table: &[real],
    neu1e: &[Real],
    code: u8,
    alpha: real,
) {
    let f = dot(lane, shared, syn0, syn1_neg);
    let g = lane.broadcast(&shared.gradient, || ns_gradient(f, code, alpha, exp_table));
    if let Some(g) = g {
        train_pair(lane, g, syn0, syn1_neg, neu1e);
    }
}

/// Run the rounds lane 0 draws from `plan` against `input`. Only lane 0
/// passes a plan.
fn run_rounds<I>(
    lane: &Lane<'_>,
    shared: &Shared,
    mut plan: Option<I>,
    input: &[Real],
    model: Cells<'_>,
    neu1e: &[Real],
    alpha: real,
) where
    I: Iterator<Item = Round>,
{
    loop {
        let round = lane.broadcast(&shared.round, || plan.as_mut().and_then(Iterator::next));
        match round {
            Some(Round::Softmax { node, code }) => hierarchic_softmax(
                lane,
                shared,
                input,
                model.row(RowRef::syn1(node)),
                model.exp_table,
                neu1e,
                code,
                alpha,
            ),
            Some(Round::Sample { target, code }) => negative_sampling(
                lane,
                shared,
                input,
                model.row(RowRef::syn1_neg(target)),
                model.exp_table,
                neu1e,
                code,
                alpha,
            ),
            None => break,
        }
    }
}

/// One lane's part of a SkipGram step. `neu1e` must be zero on entry.
pub fn skip_gram(
    lane: &Lane<'_>,
    shared: &Shared,
    op: &SkipGram,
    model: Cells<'_>,
    neu1e: &[Real],
) {
    let input = model.row(RowRef::syn0(op.syn0_row));
    let plan = lane.is_leader().then(|| op.rounds(model.neg_table));
    run_rounds(lane, shared, plan, input, model, neu1e, op.alpha);
    axpy(lane, 1.0, neu1e, input);
    lane.sync();
}

/// One lane's part of a CBOW step. `neu1` and `neu1e` must be zero on
/// entry.
pub fn cbow(
    lane: &Lane<'_>,
    shared: &Shared,
    op: &Cbow,
    model: Cells<'_>,
    neu1: &[Real],
    neu1e: &[Real],
) {
    for &row in &op.context {
        axpy(lane, 1.0, model.row(RowRef::syn0(row as usize)), neu1);
    }
    if !op.context.is_empty() {
        let count = op.context.len() as real;
        for c in lane.stride(neu1.len()) {
            neu1[c].set(neu1[c].get() / count);
        }
    }
    lane.sync();

    let plan = lane.is_leader().then(|| op.rounds(model.neg_table));
    run_rounds(lane, shared, plan, neu1, model, neu1e, op.alpha);
    for &row in &op.context {
        axpy(lane, 1.0, neu1e, model.row(RowRef::syn0(row as usize)));
    }
    lane.sync();
}

/// Standalone [`Dot`] on a group.
pub fn dot_op(group: &LaneGroup, op: &Dot, model: &mut Model) {
    let n = op.vector_length;
    let cells = model.cells();
    let (x, y, z) = (&cells.row(op.x)[..n], &cells.row(op.y)[..n], cells.row(op.z));
    let shared = Shared::default();
    group.launch(|lane| {
        let product = dot(lane, &shared, x, y);
        if lane.is_leader() {
            z[0].set(product);
        }
    });
}

pub fn axpy_op(group: &LaneGroup, op: &Axpy, model: &mut Model) {
    let n = op.vector_length;
    let cells = model.cells();
    let (x, y) = (&cells.row(op.x)[..n], &cells.row(op.y)[..n]);
    group.launch(|lane| {
        axpy(lane, op.alpha, x, y);
        lane.sync();
    });
}

/// Standalone [`HierarchicSoftmax`] on a group; the input gradient is added
/// to `scratch.neu1e()`.
pub fn hierarchic_softmax_op(
    group: &LaneGroup,
    op: &HierarchicSoftmax,
    model: &mut Model,
    scratch: &mut Scratch,
) {
    let cells = model.cells();
    let input = cells.row(op.input);
    let syn1 = cells.row(RowRef::syn1(op.node));
    let neu1e = Real::from_mut_slice(&mut scratch.neu1e);
    let shared = Shared::default();
    group.launch(|lane| {
        hierarchic_softmax(lane, &shared, input, syn1, cells.exp_table, neu1e, op.code, op.alpha);
    });
}

/// Standalone [`NegativeSampling`] on a group; the input gradient is added
/// to `scratch.neu1e()`.
pub fn negative_sampling_op(
    group: &LaneGroup,
    op: &NegativeSampling,
    model: &mut Model,
    scratch: &mut Scratch,
) {
    let cells = model.cells();
    let input = cells.row(op.input);
    let syn1_neg = cells.row(RowRef::syn1_neg(op.target));
    let neu1e = Real::from_mut_slice(&mut scratch.neu1e);
    let shared = Shared::default();
    group.launch(|lane| {
        negative_sampling(lane, &shared, input, syn1_neg, cells.exp_table, neu1e, op.code, op.alpha);
    });
}

pub fn skip_gram_op(group: &LaneGroup, op: &SkipGram, model: &mut Model, scratch: &mut Scratch) {
    scratch.reset();
    let cells = model.cells();
    let neu1e = Real::from_mut_slice(&mut scratch.neu1e);
    let shared = Shared::default();
    group.launch(|lane| skip_gram(lane, &shared, op, cells, neu1e));
}

pub fn cbow_op(group: &LaneGroup, op: &Cbow, model: &mut Model, scratch: &mut Scratch) {
    scratch.reset();
    let cells = model.cells();
    let Scratch { neu1, neu1e } = scratch;
    let neu1 = Real::from_mut_slice(neu1);
    let neu1e = Real::from_mut_slice(neu1e);
    let shared = Shared::default();
    group.launch(|lane| cbow(lane, &shared, op, cells, neu1, neu1e));
}
