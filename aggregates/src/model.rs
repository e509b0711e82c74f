use crate::{real, AggregateError, EmbeddingTable, Real, Result, Rng, RowRef, TableId};

/// The tables an aggregate op reads and updates. These belong to the
/// training driver; ops borrow them for the length of one call.
#[derive(Debug)]
pub struct Model {
    /// Input (word) vectors.
    pub syn0: EmbeddingTable,
    /// Hierarchical-softmax weights, one row per inner node of the Huffman tree.
    pub syn1: EmbeddingTable,
    /// Negative-sampling output vectors, one row per word.
    pub syn1_neg: EmbeddingTable,
    /// Precomputed sigmoid samples over `[-HS_MAX_EXP, HS_MAX_EXP)`.
    pub exp_table: Vec<real>,
    /// Unigram table of word indices for drawing negative samples.
    pub neg_table: Vec<i32>,
}

impl Model {
    /// A model with `vocab_size` rows in every table, all zero.
    pub fn new(
        vocab_size: usize,
        vector_length: usize,
        exp_table: Vec<real>,
        neg_table: Vec<i32>,
    ) -> Result<Self> {
        if vector_length == 0 {
            return Err(AggregateError::InvalidArgument {
                op: "model",
                what: "vector_length",
                reason: "rows must have at least one element".to_string(),
            });
        }
        Ok(Model {
            syn0: EmbeddingTable::zeros(vocab_size, vector_length)?,
            syn1: EmbeddingTable::zeros(vocab_size, vector_length)?,
            syn1_neg: EmbeddingTable::zeros(vocab_size, vector_length)?,
            exp_table,
            neg_table,
        })
    }

    /// Fill `syn0` with small random values, the usual word2vec starting
    /// point.
    pub fn randomize_syn0(&mut self, rng: &mut Rng) {
        let n = self.vector_length() as real;
        for e in self.syn0.as_mut_slice() {
            *e = (rng.rand_real() - 0.5) / n;
        }
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Model {
            syn0: self.syn0.try_clone()?,
            syn1: self.syn1.try_clone()?,
            syn1_neg: self.syn1_neg.try_clone()?,
            exp_table: self.exp_table.clone(),
            neg_table: self.neg_table.clone(),
        })
    }

    pub fn vector_length(&self) -> usize {
        self.syn0.vector_length()
    }

    pub fn table(&self, id: TableId) -> &EmbeddingTable {
        match id {
            TableId::Syn0 => &self.syn0,
            TableId::Syn1 => &self.syn1,
            TableId::Syn1Neg => &self.syn1_neg,
        }
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut EmbeddingTable {
        match id {
            TableId::Syn0 => &mut self.syn0,
            TableId::Syn1 => &mut self.syn1,
            TableId::Syn1Neg => &mut self.syn1_neg,
        }
    }

    pub fn row(&self, r: RowRef) -> &[real] {
        self.table(r.table).row(r.row)
    }

    /// Call `f` with row `src` and a mutable borrow of row `dst`.
    ///
    /// When both are the same row, `f` sees the value `src` had before the
    /// call.
    pub(crate) fn with_rows<R>(
        &mut self,
        src: RowRef,
        dst: RowRef,
        f: impl FnOnce(&[real], &mut [real], &[real]) -> R,
    ) -> R {
        use TableId::*;

        let Model {
            syn0,
            syn1,
            syn1_neg,
            exp_table,
            ..
        } = self;
        let (src_table, dst_table) = match (src.table, dst.table) {
            (Syn0, Syn1) => (&*syn0, syn1),
            (Syn0, Syn1Neg) => (&*syn0, syn1_neg),
            (Syn1, Syn0) => (&*syn1, syn0),
            (Syn1, Syn1Neg) => (&*syn1, syn1_neg),
            (Syn1Neg, Syn0) => (&*syn1_neg, syn0),
            (Syn1Neg, Syn1) => (&*syn1_neg, syn1),
            (_, same) => {
                let table = match same {
                    Syn0 => syn0,
                    Syn1 => syn1,
                    Syn1Neg => syn1_neg,
                };
                let copy = table.row(src.row).to_vec();
                return f(&copy, table.row_mut(dst.row), exp_table);
            }
        };
        f(src_table.row(src.row), dst_table.row_mut(dst.row), exp_table)
    }

    /// Share every table with a lane group.
    pub fn cells(&mut self) -> Cells<'_> {
        let vector_length = self.vector_length();
        Cells {
            syn0: self.syn0.cells(),
            syn1: self.syn1.cells(),
            syn1_neg: self.syn1_neg.cells(),
            exp_table: &self.exp_table,
            neg_table: &self.neg_table,
            vector_length,
        }
    }
}

/// A [`Model`] borrowed for cooperative execution: every table is viewed as
/// [`Real`] cells so that all lanes can update it through `&`.
#[derive(Clone, Copy, Debug)]
pub struct Cells<'a> {
    pub syn0: &'a [Real],
    pub syn1: &'a [Real],
    pub syn1_neg: &'a [Real],
    pub exp_table: &'a [real],
    pub neg_table: &'a [i32],
    vector_length: usize,
}

impl<'a> Cells<'a> {
    pub fn vector_length(&self) -> usize {
        self.vector_length
    }

    pub fn table(&self, id: TableId) -> &'a [Real] {
        match id {
            TableId::Syn0 => self.syn0,
            TableId::Syn1 => self.syn1,
            TableId::Syn1Neg => self.syn1_neg,
        }
    }

    pub fn row(&self, r: RowRef) -> &'a [Real] {
        let n = self.vector_length;
        &self.table(r.table)[r.row * n..][..n]
    }
}

/// Per-call working vectors: `neu1`, the CBOW context average, and `neu1e`,
/// the accumulated gradient for the input side.
///
/// A driver can keep one `Scratch` per worker and pass it to every call.
/// SkipGram and CBOW zero it on entry. The standalone softmax and sampling
/// ops add into `neu1e` and leave clearing it to the caller.
#[derive(Clone, Debug)]
pub struct Scratch {
    pub(crate) neu1: Vec<real>,
    pub(crate) neu1e: Vec<real>,
}

impl Scratch {
    pub fn new(vector_length: usize) -> Self {
        Scratch {
            neu1: vec![0.0; vector_length],
            neu1e: vec![0.0; vector_length],
        }
    }

    pub fn vector_length(&self) -> usize {
        self.neu1e.len()
    }

    pub fn reset(&mut self) {
        self.neu1.fill(0.0);
        self.neu1e.fill(0.0);
    }

    pub fn neu1(&self) -> &[real] {
        &self.neu1
    }

    pub fn neu1e(&self) -> &[real] {
        &self.neu1e
    }

    pub fn neu1e_mut(&mut self) -> &mut [real] {
        &mut self.neu1e
    }
}
