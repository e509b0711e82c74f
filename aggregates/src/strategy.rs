use std::{env, fmt};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::args::RawArgs;
use crate::lanes::MAX_LANES;
use crate::{cooperative, sequential};
use crate::{
    AggregateError, Axpy, Cbow, Dot, HierarchicSoftmax, LaneGroup, Model, NegativeSampling, Result,
    RowRef, Scratch, SkipGram,
};

/// How one call is executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// On the calling thread.
    #[default]
    Sequential,
    /// On a group of `lanes` threads that share every loop.
    Cooperative { lanes: usize },
}

impl Strategy {
    /// Environment variable read by [`Strategy::from_env`].
    pub const LANES_VAR: &'static str = "AGGREGATE_LANES";

    /// A cooperative strategy with between 1 and [`MAX_LANES`] lanes.
    pub fn cooperative(lanes: usize) -> Self {
        Strategy::Cooperative {
            lanes: lanes.clamp(1, MAX_LANES),
        }
    }

    /// `Cooperative` with the lane count in `AGGREGATE_LANES`; `Sequential`
    /// when it is unset, `0`, or not a number.
    pub fn from_env() -> Self {
        match env::var(Self::LANES_VAR).ok().and_then(|v| v.trim().parse().ok()) {
            Some(0) | None => Strategy::Sequential,
            Some(lanes) => Strategy::cooperative(lanes),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Cooperative { lanes } => write!(f, "cooperative ({lanes} lanes)"),
        }
    }
}

/// Any one of the six aggregate ops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    HierarchicSoftmax(HierarchicSoftmax),
    NegativeSampling(NegativeSampling),
    Dot(Dot),
    Axpy(Axpy),
    SkipGram(SkipGram),
    Cbow(Cbow),
}

impl Aggregate {
    /// The op number batched callers use to select this op.
    pub fn op_num(&self) -> i32 {
        match self {
            Aggregate::HierarchicSoftmax(_) => 0,
            Aggregate::NegativeSampling(_) => 1,
            Aggregate::Dot(_) => 2,
            Aggregate::Axpy(_) => 3,
            Aggregate::SkipGram(_) => 4,
            Aggregate::Cbow(_) => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::HierarchicSoftmax(_) => HierarchicSoftmax::NAME,
            Aggregate::NegativeSampling(_) => NegativeSampling::NAME,
            Aggregate::Dot(_) => Dot::NAME,
            Aggregate::Axpy(_) => Axpy::NAME,
            Aggregate::SkipGram(_) => SkipGram::NAME,
            Aggregate::Cbow(_) => Cbow::NAME,
        }
    }

    /// Decode a call from the flat argument layout: `rows` are the row
    /// pointers (sub-ops only), `index` the `int` control values, `arrays`
    /// the `int` arrays, `reals` the floating-point values.
    pub fn from_raw(
        op_num: i32,
        model: &Model,
        rows: &[RowRef],
        index: &[i32],
        arrays: &[&[i32]],
        reals: &[f64],
    ) -> Result<Self> {
        let op = match op_num {
            0 => HierarchicSoftmax::NAME,
            1 => NegativeSampling::NAME,
            2 => Dot::NAME,
            3 => Axpy::NAME,
            4 => SkipGram::NAME,
            5 => Cbow::NAME,
            _ => return Err(AggregateError::UnknownOp(op_num)),
        };
        let raw = RawArgs {
            op,
            rows,
            index,
            arrays,
            reals,
        };
        let aggregate = match op_num {
            0 => Aggregate::HierarchicSoftmax(HierarchicSoftmax::from_raw(&raw, model)?),
            1 => Aggregate::NegativeSampling(NegativeSampling::from_raw(&raw, model)?),
            2 => Aggregate::Dot(Dot::from_raw(&raw)?),
            3 => Aggregate::Axpy(Axpy::from_raw(&raw)?),
            4 => Aggregate::SkipGram(SkipGram::from_raw(&raw, model)?),
            _ => Aggregate::Cbow(Cbow::from_raw(&raw, model)?),
        };
        Ok(aggregate)
    }

    pub fn validate(&self, model: &Model) -> Result<()> {
        match self {
            Aggregate::HierarchicSoftmax(op) => op.validate(model),
            Aggregate::NegativeSampling(op) => op.validate(model),
            Aggregate::Dot(op) => op.validate(model),
            Aggregate::Axpy(op) => op.validate(model),
            Aggregate::SkipGram(op) => op.validate(model),
            Aggregate::Cbow(op) => op.validate(model),
        }
    }

    /// Check the call against `model`, then run it.
    ///
    /// `scratch` must have `model.vector_length()` elements. SkipGram and
    /// CBOW clear it first; the softmax and sampling sub-ops add their input
    /// gradient to `scratch.neu1e()`.
    pub fn execute(
        &self,
        model: &mut Model,
        scratch: &mut Scratch,
        strategy: Strategy,
    ) -> Result<()> {
        if scratch.vector_length() != model.vector_length() {
            debug!(op = self.name(), "scratch length mismatch");
            return Err(AggregateError::LengthMismatch {
                op: self.name(),
                what: "scratch",
                expected: model.vector_length(),
                got: scratch.vector_length(),
            });
        }
        self.validate(model)?;
        trace!(op = self.name(), %strategy, "executing");

        match strategy {
            Strategy::Sequential => match self {
                Aggregate::HierarchicSoftmax(op) => {
                    sequential::hierarchic_softmax_op(op, model, scratch)
                }
                Aggregate::NegativeSampling(op) => {
                    sequential::negative_sampling_op(op, model, scratch)
                }
                Aggregate::Dot(op) => sequential::dot_op(op, model),
                Aggregate::Axpy(op) => sequential::axpy_op(op, model),
                Aggregate::SkipGram(op) => sequential::skip_gram_with(op, model, scratch),
                Aggregate::Cbow(op) => sequential::cbow_with(op, model, scratch),
            },
            Strategy::Cooperative { lanes } => {
                let group = LaneGroup::new(lanes);
                match self {
                    Aggregate::HierarchicSoftmax(op) => {
                        cooperative::hierarchic_softmax_op(&group, op, model, scratch)
                    }
                    Aggregate::NegativeSampling(op) => {
                        cooperative::negative_sampling_op(&group, op, model, scratch)
                    }
                    Aggregate::Dot(op) => cooperative::dot_op(&group, op, model),
                    Aggregate::Axpy(op) => cooperative::axpy_op(&group, op, model),
                    Aggregate::SkipGram(op) => cooperative::skip_gram_op(&group, op, model, scratch),
                    Aggregate::Cbow(op) => cooperative::cbow_op(&group, op, model, scratch),
                }
            }
        }
        Ok(())
    }
}

macro_rules! impl_from_op {
    ($($op:ident),*) => {
        $(
            impl From<$op> for Aggregate {
                fn from(op: $op) -> Self {
                    Aggregate::$op(op)
                }
            }
        )*
    };
}

impl_from_op!(HierarchicSoftmax, NegativeSampling, Dot, Axpy, SkipGram, Cbow);
