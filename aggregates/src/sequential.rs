//! Single-threaded strategy.
//!
//! Every vector loop here is a plain indexed walk over equal-length slices,
//! which the compiler turns into SIMD code. Dot products sum left to right.

use crate::math::{hs_gradient, ns_gradient};
use crate::{real, Axpy, Cbow, Dot, EmbeddingTable, HierarchicSoftmax, Model, NegativeSampling};
use crate::{Round, RowRef, Scratch, SkipGram};

pub fn dot(x: &[real], y: &[real]) -> real {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y).fold(0.0, |sum, (a, b)| sum + a * b)
}

/// `y += alpha * x`
pub fn axpy(alpha: real, x: &[real], y: &mut [real]) {
    debug_assert_eq!(x.len(), y.len());
    for (y, x) in y.iter_mut().zip(x) {
        *y += alpha * x;
    }
}

/// `neu1e += g * syn1; syn1 += g * syn0`, the update shared by both
/// sub-kernels.
fn train_pair(g: real, syn0: &[real], syn1: &mut [real], neu1e: &mut [real]) {
    for c in 0..syn0.len() {
        neu1e[c] += g * syn1[c];
        syn1[c] += g * syn0[c];
    }
}

/// One hierarchical-softmax node. `syn0` is the input row (or the CBOW
/// average), `syn1` the node's row.
pub fn hierarchic_softmax(
    syn0: &[real],
    syn1: &mut [real],
    exp_table: &[real],
    neu1e: &mut [real],
    code: u8,
    alpha: real,
) {
    let f = dot(syn0, syn1);
    if let Some(g) = hs_gradient(f, code, alpha, exp_table) {
        train_pair(g, syn0, syn1, neu1e);
    }
}

/// One negative-sampling target. `syn1_neg` is the target's row.
pub fn negative_sampling(
    syn0: &[real],
    syn1_neg: &mut [real],
    exp_table: &[real],
    neu1e: &mut [real],
    code: u8,
    alpha: real,
) {
    let f = dot(syn0, syn1_neg);
    if let Some(g) = ns_gradient(f, code, alpha, exp_table) {
        train_pair(g, syn0, syn1_neg, neu1e);
    }
}

/// Run every round of a SkipGram or CBOW step against `input`, collecting
/// the input-side gradient in `neu1e`.
fn run_rounds(
    rounds: impl Iterator<Item = Round>,
    input: &[real],
    syn1: &mut EmbeddingTable,
    syn1_neg: &mut EmbeddingTable,
    exp_table: &[real],
    neu1e: &mut [real],
    alpha: real,
) {
    for round in rounds {
        match round {
            Round::Softmax { node, code } => {
                hierarchic_softmax(input, syn1.row_mut(node), exp_table, neu1e, code, alpha)
            }
            Round::Sample { target, code } => negative_sampling(
                input,
                syn1_neg.row_mut(target),
                exp_table,
                neu1e,
                code,
                alpha,
            ),
        }
    }
}

/// Standalone [`Dot`]: writes the product into the first element of `z`.
pub fn dot_op(op: &Dot, model: &mut Model) {
    let n = op.vector_length;
    let product = dot(&model.row(op.x)[..n], &model.row(op.y)[..n]);
    let z = op.z;
    model.table_mut(z.table).row_mut(z.row)[0] = product;
}

pub fn axpy_op(op: &Axpy, model: &mut Model) {
    let n = op.vector_length;
    model.with_rows(op.x, op.y, |x, y, _| axpy(op.alpha, &x[..n], &mut y[..n]));
}

/// Standalone [`HierarchicSoftmax`]; the input gradient is added to
/// `scratch.neu1e()`.
pub fn hierarchic_softmax_op(op: &HierarchicSoftmax, model: &mut Model, scratch: &mut Scratch) {
    model.with_rows(op.input, RowRef::syn1(op.node), |input, syn1, exp_table| {
        hierarchic_softmax(input, syn1, exp_table, &mut scratch.neu1e, op.code, op.alpha)
    });
}

/// Standalone [`NegativeSampling`]; the input gradient is added to
/// `scratch.neu1e()`.
pub fn negative_sampling_op(op: &NegativeSampling, model: &mut Model, scratch: &mut Scratch) {
    model.with_rows(op.input, RowRef::syn1_neg(op.target), |input, syn1_neg, exp_table| {
        negative_sampling(input, syn1_neg, exp_table, &mut scratch.neu1e, op.code, op.alpha)
    });
}

pub fn skip_gram(op: &SkipGram, model: &mut Model) {
    let mut scratch = Scratch::new(model.vector_length());
    skip_gram_with(op, model, &mut scratch);
}

/// One SkipGram step, reusing `scratch` for the gradient.
pub fn skip_gram_with(op: &SkipGram, model: &mut Model, scratch: &mut Scratch) {
    scratch.reset();
    let Model {
        syn0,
        syn1,
        syn1_neg,
        exp_table,
        neg_table,
    } = model;

    run_rounds(
        op.rounds(neg_table),
        syn0.row(op.syn0_row),
        syn1,
        syn1_neg,
        exp_table,
        &mut scratch.neu1e,
        op.alpha,
    );
    axpy(1.0, &scratch.neu1e, syn0.row_mut(op.syn0_row));
}

pub fn cbow(op: &Cbow, model: &mut Model) {
    let mut scratch = Scratch::new(model.vector_length());
    cbow_with(op, model, &mut scratch);
}

/// One CBOW step, reusing `scratch` for the context average and gradient.
pub fn cbow_with(op: &Cbow, model: &mut Model, scratch: &mut Scratch) {
    scratch.reset();
    let Model {
        syn0,
        syn1,
        syn1_neg,
        exp_table,
        neg_table,
    } = model;
    let Scratch { neu1, neu1e } = scratch;

    for &row in &op.context {
        axpy(1.0, syn0.row(row as usize), neu1);
    }
    if !op.context.is_empty() {
        let count = op.context.len() as real;
        for e in neu1.iter_mut() {
            *e /= count;
        }
    }

    run_rounds(
        op.rounds(neg_table),
        neu1,
        syn1,
        syn1_neg,
        exp_table,
        neu1e,
        op.alpha,
    );
    for &row in &op.context {
        axpy(1.0, neu1e, syn0.row_mut(row as usize));
    }
}
