//! Call descriptors for the six aggregate ops.
//!
//! Each descriptor names the rows an op touches and carries its small
//! scalar arguments. The tables themselves come from the [`Model`] the op
//! is run against. Descriptors can also be decoded from the flat argument
//! layout used by batched callers: a list of row pointers, a list of `int`
//! control values, a list of `int` arrays, and a list of floating-point
//! values.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{real, AggregateError, Model, Result, RoundPlan};

/// Which embedding table of a [`Model`] a row lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableId {
    Syn0,
    Syn1,
    Syn1Neg,
}

/// One row of one table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRef {
    pub table: TableId,
    pub row: usize,
}

impl RowRef {
    pub fn syn0(row: usize) -> Self {
        RowRef {
            table: TableId::Syn0,
            row,
        }
    }

    pub fn syn1(row: usize) -> Self {
        RowRef {
            table: TableId::Syn1,
            row,
        }
    }

    pub fn syn1_neg(row: usize) -> Self {
        RowRef {
            table: TableId::Syn1Neg,
            row,
        }
    }
}

/// Path from the root of the Huffman tree to a word's leaf.
///
/// `nodes[d]` is the `syn1` row of the `d`th inner node; `codes[d]` says
/// which branch (0 or 1) the path takes there.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuffmanPath {
    pub nodes: Vec<u32>,
    pub codes: Vec<u8>,
}

impl HuffmanPath {
    pub fn new(nodes: Vec<u32>, codes: Vec<u8>) -> Self {
        HuffmanPath { nodes, codes }
    }

    /// Number of tree nodes on the path (the number of softmax rounds).
    pub fn len(&self) -> usize {
        self.nodes.len().min(self.codes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self, op: &'static str, model: &Model) -> Result<()> {
        if self.nodes.len() != self.codes.len() {
            return Err(AggregateError::LengthMismatch {
                op,
                what: "codes",
                expected: self.nodes.len(),
                got: self.codes.len(),
            });
        }
        for &node in &self.nodes {
            check_row(op, "syn1", node as usize, model.syn1.rows())?;
        }
        if let Some(&code) = self.codes.iter().find(|&&c| c > 1) {
            return Err(AggregateError::InvalidArgument {
                op,
                what: "codes",
                reason: format!("code {code} is not 0 or 1"),
            });
        }
        Ok(())
    }
}

/// One hierarchical-softmax node update. The gradient for `input` is
/// accumulated into the caller's scratch `neu1e`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HierarchicSoftmax {
    /// Row being trained; must not live in `syn1`.
    pub input: RowRef,
    /// Row of `syn1` for the tree node.
    pub node: usize,
    pub code: u8,
    pub alpha: real,
}

/// One negative-sampling update. The gradient for `input` is accumulated
/// into the caller's scratch `neu1e`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegativeSampling {
    /// Row being trained; must not live in `syn1_neg`.
    pub input: RowRef,
    /// Row of `syn1_neg` for the sampled word.
    pub target: usize,
    /// 1 for the positive sample, 0 for a negative one.
    pub code: u8,
    pub alpha: real,
}

/// `z[0] = x · y` over the first `vector_length` elements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dot {
    pub vector_length: usize,
    pub x: RowRef,
    pub y: RowRef,
    pub z: RowRef,
}

/// `y += alpha * x` over the first `vector_length` elements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axpy {
    pub vector_length: usize,
    pub alpha: real,
    pub x: RowRef,
    pub y: RowRef,
}

/// One skip-gram training step: train `syn0_row` against the Huffman path
/// and negative samples of one context word.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkipGram {
    pub syn0_row: usize,
    pub path: HuffmanPath,
    /// Number of negatives to draw; 0 disables negative sampling entirely.
    pub ng_rounds: usize,
    pub vocab_size: usize,
    /// The positive sample (row of `syn1_neg`).
    pub ng_starter: usize,
    pub alpha: real,
    /// Seed for the negative draws.
    pub next_random: u64,
}

/// One CBOW training step: average the `context` rows of `syn0`, train the
/// average, and add the resulting gradient to every context row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cbow {
    pub context: Vec<u32>,
    pub path: HuffmanPath,
    pub ng_rounds: usize,
    pub vocab_size: usize,
    pub ng_starter: usize,
    /// Carried through from batched callers; not used by the update.
    pub initial_idx: i32,
    pub alpha: real,
    pub next_random: u64,
}

/// Every table must have rows as long as `syn0`'s.
fn check_tables(op: &'static str, model: &Model) -> Result<()> {
    let expected = model.syn0.vector_length();
    for (what, table) in [("syn1", &model.syn1), ("syn1_neg", &model.syn1_neg)] {
        if table.vector_length() != expected {
            debug!(op, what, "table shape differs from syn0");
            return Err(AggregateError::LengthMismatch {
                op,
                what,
                expected,
                got: table.vector_length(),
            });
        }
    }
    Ok(())
}

fn check_row(op: &'static str, what: &'static str, row: usize, rows: usize) -> Result<()> {
    if row < rows {
        Ok(())
    } else {
        debug!(op, what, row, rows, "row out of range");
        Err(AggregateError::RowOutOfRange {
            op,
            what,
            row,
            rows,
        })
    }
}

fn check_code(op: &'static str, code: u8) -> Result<()> {
    if code <= 1 {
        Ok(())
    } else {
        Err(AggregateError::InvalidArgument {
            op,
            what: "code",
            reason: format!("code {code} is not 0 or 1"),
        })
    }
}

fn check_ref(op: &'static str, what: &'static str, r: RowRef, model: &Model) -> Result<()> {
    check_row(op, what, r.row, model.table(r.table).rows())
}

fn check_sampling(
    op: &'static str,
    ng_rounds: usize,
    ng_starter: usize,
    vocab_size: usize,
    model: &Model,
) -> Result<()> {
    if ng_rounds == 0 {
        return Ok(());
    }
    if vocab_size < 2 {
        return Err(AggregateError::InvalidArgument {
            op,
            what: "vocab_size",
            reason: format!("negative sampling needs at least 2 words, got {vocab_size}"),
        });
    }
    if vocab_size > model.syn1_neg.rows() {
        return Err(AggregateError::InvalidArgument {
            op,
            what: "vocab_size",
            reason: format!(
                "{vocab_size} words but syn1_neg has {} rows",
                model.syn1_neg.rows()
            ),
        });
    }
    if model.neg_table.is_empty() {
        return Err(AggregateError::InvalidArgument {
            op,
            what: "neg_table",
            reason: "negative sampling with an empty unigram table".to_string(),
        });
    }
    check_row(op, "ng_starter", ng_starter, model.syn1_neg.rows())
}

impl HierarchicSoftmax {
    pub(crate) const NAME: &'static str = "hierarchic-softmax";

    pub fn validate(&self, model: &Model) -> Result<()> {
        let op = Self::NAME;
        check_tables(op, model)?;
        if self.input.table == TableId::Syn1 {
            return Err(AggregateError::InvalidArgument {
                op,
                what: "input",
                reason: "input row must not live in syn1".to_string(),
            });
        }
        check_ref(op, "input", self.input, model)?;
        check_row(op, "syn1", self.node, model.syn1.rows())?;
        check_code(op, self.code)
    }
}

impl NegativeSampling {
    pub(crate) const NAME: &'static str = "negative-sampling";

    pub fn validate(&self, model: &Model) -> Result<()> {
        let op = Self::NAME;
        check_tables(op, model)?;
        if self.input.table == TableId::Syn1Neg {
            return Err(AggregateError::InvalidArgument {
                op,
                what: "input",
                reason: "input row must not live in syn1_neg".to_string(),
            });
        }
        check_ref(op, "input", self.input, model)?;
        check_row(op, "syn1_neg", self.target, model.syn1_neg.rows())?;
        check_code(op, self.code)
    }
}

impl Dot {
    pub(crate) const NAME: &'static str = "dot";

    pub fn validate(&self, model: &Model) -> Result<()> {
        let op = Self::NAME;
        check_tables(op, model)?;
        check_length(op, self.vector_length, model)?;
        check_ref(op, "x", self.x, model)?;
        check_ref(op, "y", self.y, model)?;
        check_ref(op, "z", self.z, model)
    }
}

impl Axpy {
    pub(crate) const NAME: &'static str = "axpy";

    pub fn validate(&self, model: &Model) -> Result<()> {
        let op = Self::NAME;
        check_tables(op, model)?;
        check_length(op, self.vector_length, model)?;
        check_ref(op, "x", self.x, model)?;
        check_ref(op, "y", self.y, model)
    }
}

fn check_length(op: &'static str, vector_length: usize, model: &Model) -> Result<()> {
    if vector_length > model.vector_length() {
        return Err(AggregateError::LengthMismatch {
            op,
            what: "vector_length",
            expected: model.vector_length(),
            got: vector_length,
        });
    }
    Ok(())
}

impl SkipGram {
    pub(crate) const NAME: &'static str = "skip-gram";

    /// The sub-kernel calls this step makes, in order.
    pub fn rounds<'a>(&'a self, neg_table: &'a [i32]) -> RoundPlan<'a> {
        RoundPlan::new(
            &self.path,
            self.ng_rounds,
            self.ng_starter,
            self.vocab_size,
            neg_table,
            self.next_random,
        )
    }

    pub fn validate(&self, model: &Model) -> Result<()> {
        let op = Self::NAME;
        check_tables(op, model)?;
        check_row(op, "syn0", self.syn0_row, model.syn0.rows())?;
        self.path.validate(op, model)?;
        check_sampling(op, self.ng_rounds, self.ng_starter, self.vocab_size, model)
    }
}

impl Cbow {
    pub(crate) const NAME: &'static str = "cbow";

    pub fn rounds<'a>(&'a self, neg_table: &'a [i32]) -> RoundPlan<'a> {
        RoundPlan::new(
            &self.path,
            self.ng_rounds,
            self.ng_starter,
            self.vocab_size,
            neg_table,
            self.next_random,
        )
    }

    pub fn validate(&self, model: &Model) -> Result<()> {
        let op = Self::NAME;
        check_tables(op, model)?;
        for &c in &self.context {
            check_row(op, "context", c as usize, model.syn0.rows())?;
        }
        self.path.validate(op, model)?;
        check_sampling(op, self.ng_rounds, self.ng_starter, self.vocab_size, model)
    }
}

/// Positional view of a flat argument list.
pub(crate) struct RawArgs<'a> {
    pub op: &'static str,
    pub rows: &'a [RowRef],
    pub index: &'a [i32],
    pub arrays: &'a [&'a [i32]],
    pub reals: &'a [f64],
}

impl<'a> RawArgs<'a> {
    fn int(&self, pos: usize, what: &'static str) -> Result<i32> {
        self.index
            .get(pos)
            .copied()
            .ok_or(AggregateError::MissingArgument { op: self.op, what })
    }

    fn count(&self, pos: usize, what: &'static str) -> Result<usize> {
        let value = self.int(pos, what)?;
        usize::try_from(value).map_err(|_| AggregateError::NegativeArgument {
            op: self.op,
            what,
            value: value.into(),
        })
    }

    fn code(&self, pos: usize) -> Result<u8> {
        let code = self.int(pos, "code")?;
        to_code(self.op, code)
    }

    fn row(&self, pos: usize, what: &'static str) -> Result<RowRef> {
        self.rows
            .get(pos)
            .copied()
            .ok_or(AggregateError::MissingArgument { op: self.op, what })
    }

    /// The first `len` entries of int array `pos`.
    fn array(&self, pos: usize, what: &'static str, len: usize) -> Result<&'a [i32]> {
        let array = self
            .arrays
            .get(pos)
            .copied()
            .ok_or(AggregateError::MissingArgument { op: self.op, what })?;
        array.get(..len).ok_or(AggregateError::LengthMismatch {
            op: self.op,
            what,
            expected: len,
            got: array.len(),
        })
    }

    fn indices(&self, pos: usize, what: &'static str, len: usize) -> Result<Vec<u32>> {
        self.array(pos, what, len)?
            .iter()
            .map(|&i| {
                u32::try_from(i).map_err(|_| AggregateError::NegativeArgument {
                    op: self.op,
                    what,
                    value: i.into(),
                })
            })
            .collect()
    }

    fn path(&self, nodes_pos: usize, rounds: usize) -> Result<HuffmanPath> {
        let nodes = self.indices(nodes_pos, "idxSyn1", rounds)?;
        let codes = self
            .array(nodes_pos + 1, "codes", rounds)?
            .iter()
            .map(|&c| to_code(self.op, c))
            .collect::<Result<Vec<u8>>>()?;
        Ok(HuffmanPath { nodes, codes })
    }

    fn real(&self, pos: usize, what: &'static str) -> Result<f64> {
        self.reals
            .get(pos)
            .copied()
            .ok_or(AggregateError::MissingArgument { op: self.op, what })
    }

    fn alpha(&self) -> Result<real> {
        Ok(self.real(0, "alpha")? as real)
    }

    /// The seed travels as a floating-point argument; it is converted
    /// numerically, not bit-cast.
    fn seed(&self) -> Result<u64> {
        Ok(self.real(1, "seed")? as u64)
    }

    /// Check a length argument against the table it describes.
    fn expect_len(&self, pos: usize, what: &'static str, actual: usize) -> Result<()> {
        let claimed = self.count(pos, what)?;
        if claimed != actual {
            return Err(AggregateError::LengthMismatch {
                op: self.op,
                what,
                expected: actual,
                got: claimed,
            });
        }
        Ok(())
    }
}

fn to_code(op: &'static str, code: i32) -> Result<u8> {
    match code {
        0 | 1 => Ok(code as u8),
        _ => Err(AggregateError::InvalidArgument {
            op,
            what: "code",
            reason: format!("code {code} is not 0 or 1"),
        }),
    }
}

impl HierarchicSoftmax {
    /// rows `[input, syn1 row]`; index `[vectorLength, expLength, code]`;
    /// reals `[alpha]`.
    pub(crate) fn from_raw(raw: &RawArgs<'_>, model: &Model) -> Result<Self> {
        raw.expect_len(0, "vectorLength", model.vector_length())?;
        raw.expect_len(1, "expLength", model.exp_table.len())?;
        let node = raw.row(1, "syn1")?;
        if node.table != TableId::Syn1 {
            return Err(AggregateError::InvalidArgument {
                op: raw.op,
                what: "syn1",
                reason: format!("expected a syn1 row, got {:?}", node.table),
            });
        }
        Ok(HierarchicSoftmax {
            input: raw.row(0, "syn0")?,
            node: node.row,
            code: raw.code(2)?,
            alpha: raw.alpha()?,
        })
    }
}

impl NegativeSampling {
    /// rows `[input, syn1_neg row]`; index `[vectorLength, expLength, code]`;
    /// reals `[alpha]`.
    pub(crate) fn from_raw(raw: &RawArgs<'_>, model: &Model) -> Result<Self> {
        raw.expect_len(0, "vectorLength", model.vector_length())?;
        raw.expect_len(1, "expLength", model.exp_table.len())?;
        let target = raw.row(1, "syn1Neg")?;
        if target.table != TableId::Syn1Neg {
            return Err(AggregateError::InvalidArgument {
                op: raw.op,
                what: "syn1Neg",
                reason: format!("expected a syn1_neg row, got {:?}", target.table),
            });
        }
        Ok(NegativeSampling {
            input: raw.row(0, "syn0")?,
            target: target.row,
            code: raw.code(2)?,
            alpha: raw.alpha()?,
        })
    }
}

impl Dot {
    /// rows `[x, y, z]`; index `[vectorLength]`.
    pub(crate) fn from_raw(raw: &RawArgs<'_>) -> Result<Self> {
        Ok(Dot {
            vector_length: raw.count(0, "vectorLength")?,
            x: raw.row(0, "x")?,
            y: raw.row(1, "y")?,
            z: raw.row(2, "z")?,
        })
    }
}

impl Axpy {
    /// rows `[x, y]`; index `[vectorLength]`; reals `[alpha]`.
    pub(crate) fn from_raw(raw: &RawArgs<'_>) -> Result<Self> {
        Ok(Axpy {
            vector_length: raw.count(0, "vectorLength")?,
            alpha: raw.alpha()?,
            x: raw.row(0, "x")?,
            y: raw.row(1, "y")?,
        })
    }
}

impl SkipGram {
    /// index `[syn0Row, vectorLength, hsRounds, ngRounds, expLength,
    /// vocabSize, ngStarter, negTableLength]`; arrays `[idxSyn1, codes]`;
    /// reals `[alpha, seed]`.
    pub(crate) fn from_raw(raw: &RawArgs<'_>, model: &Model) -> Result<Self> {
        raw.expect_len(1, "vectorLength", model.vector_length())?;
        raw.expect_len(4, "expLength", model.exp_table.len())?;
        raw.expect_len(7, "negTableLength", model.neg_table.len())?;
        let hs_rounds = raw.count(2, "hsRounds")?;
        Ok(SkipGram {
            syn0_row: raw.count(0, "syn0Row")?,
            path: raw.path(0, hs_rounds)?,
            ng_rounds: raw.count(3, "ngRounds")?,
            vocab_size: raw.count(5, "vocabSize")?,
            ng_starter: raw.count(6, "ngStarter")?,
            alpha: raw.alpha()?,
            next_random: raw.seed()?,
        })
    }
}

impl Cbow {
    /// index `[vectorLength, hsRounds, ngRounds, expLength, vocabSize,
    /// ngStarter, negTableLength, idxSyn0Length, initialIdx]`; arrays
    /// `[idxSyn0, idxSyn1, codes]`; reals `[alpha, seed]`.
    pub(crate) fn from_raw(raw: &RawArgs<'_>, model: &Model) -> Result<Self> {
        raw.expect_len(0, "vectorLength", model.vector_length())?;
        raw.expect_len(3, "expLength", model.exp_table.len())?;
        raw.expect_len(6, "negTableLength", model.neg_table.len())?;
        let hs_rounds = raw.count(1, "hsRounds")?;
        let context_len = raw.count(7, "idxSyn0Length")?;
        Ok(Cbow {
            context: raw.indices(0, "idxSyn0", context_len)?,
            path: raw.path(1, hs_rounds)?,
            ng_rounds: raw.count(2, "ngRounds")?,
            vocab_size: raw.count(4, "vocabSize")?,
            ng_starter: raw.count(5, "ngStarter")?,
            initial_idx: raw.int(8, "initialIdx")?,
            alpha: raw.alpha()?,
            next_random: raw.seed()?,
        })
    }
}
