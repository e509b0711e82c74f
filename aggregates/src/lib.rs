//! Fused word2vec update kernels.
//!
//! Each aggregate op performs one complete parameter update for one training
//! example: a SkipGram or CBOW step with hierarchical softmax and/or negative
//! sampling, or one of the sub-kernels those steps are built from. Every op
//! has two execution strategies that produce the same updates:
//!
//! -   [`sequential`]: one thread, plain slices, loops the compiler can
//!     vectorize.
//! -   [`cooperative`]: a fixed group of lanes that split every vector loop
//!     between them, merge dot products through a shared accumulator, and
//!     hand control decisions from lane 0 to the others through barriers.
//!
//! The tables being trained ([`Model`]) belong to the caller. Nothing here
//! locks them; two calls running at the same time must not touch the same
//! rows.

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

/// Edge of the sigmoid table. HierarchicSoftmax skips dot products outside
/// `[-HS_MAX_EXP, HS_MAX_EXP)`; NegativeSampling treats those outside
/// `[-HS_MAX_EXP, HS_MAX_EXP]` as saturated.
pub const HS_MAX_EXP: real = 6.0;

mod cell;
pub use cell::Real;

mod error;
pub use error::{AggregateError, Result};

mod table;
pub use table::{sigmoid_table, EmbeddingTable, DEFAULT_EXP_TABLE_SIZE, TABLE_ALIGNMENT};

pub mod math;
pub use math::Rng;

mod sampling;
pub use sampling::{Round, RoundPlan};

mod args;
pub use args::{
    Axpy, Cbow, Dot, HierarchicSoftmax, HuffmanPath, NegativeSampling, RowRef, SkipGram, TableId,
};

mod model;
pub use model::{Cells, Model, Scratch};

pub mod lanes;
pub use lanes::{LaneGroup, MAX_LANES};

pub mod cooperative;
pub mod sequential;

mod strategy;
pub use strategy::{Aggregate, Strategy};
