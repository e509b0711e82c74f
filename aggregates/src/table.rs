use std::fmt;
use std::ops::{Index, IndexMut};

use aligned_box::AlignedBox;

use crate::{real, AggregateError, Real, Result, HS_MAX_EXP};

/// Byte alignment of every table allocation.
pub const TABLE_ALIGNMENT: usize = 128;

/// Number of samples in the usual sigmoid table.
pub const DEFAULT_EXP_TABLE_SIZE: usize = 1000;

/// A flat row-major matrix of embeddings: one row of `vector_length`
/// elements per word (or per tree node).
pub struct EmbeddingTable {
    /// Number of elements in each row.
    vector_length: usize,

    /// Number of rows.
    rows: usize,

    /// `data[k * vector_length..][..vector_length]` is row `k`. The allocation
    /// is never empty; it may hold one element more than `rows * vector_length`.
    data: AlignedBox<[real]>,
}

impl EmbeddingTable {
    pub fn zeros(rows: usize, vector_length: usize) -> Result<Self> {
        let elements = rows
            .checked_mul(vector_length)
            .ok_or(AggregateError::Allocation { elements: usize::MAX })?;
        let data = AlignedBox::slice_from_default(TABLE_ALIGNMENT, elements.max(1))
            .map_err(|_| AggregateError::Allocation { elements })?;
        Ok(EmbeddingTable {
            vector_length,
            rows,
            data,
        })
    }

    /// Copy `values` (row-major, `vector_length` elements per row) into a new
    /// table.
    pub fn from_slice(vector_length: usize, values: &[real]) -> Result<Self> {
        if vector_length == 0 || values.len() % vector_length != 0 {
            return Err(AggregateError::InvalidArgument {
                op: "table",
                what: "values",
                reason: format!(
                    "{} elements don't divide into rows of {vector_length}",
                    values.len()
                ),
            });
        }
        let mut table = Self::zeros(values.len() / vector_length, vector_length)?;
        table.as_mut_slice().copy_from_slice(values);
        Ok(table)
    }

    pub fn try_clone(&self) -> Result<Self> {
        let mut copy = Self::zeros(self.rows, self.vector_length)?;
        copy.as_mut_slice().copy_from_slice(self.as_slice());
        Ok(copy)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn vector_length(&self) -> usize {
        self.vector_length
    }

    pub fn as_slice(&self) -> &[real] {
        &self.data[..self.rows * self.vector_length]
    }

    pub fn as_mut_slice(&mut self) -> &mut [real] {
        let len = self.rows * self.vector_length;
        &mut self.data[..len]
    }

    pub fn row(&self, k: usize) -> &[real] {
        debug_assert!(k < self.rows, "row {k} out of range ({} rows)", self.rows);
        &self.as_slice()[k * self.vector_length..][..self.vector_length]
    }

    pub fn row_mut(&mut self, k: usize) -> &mut [real] {
        debug_assert!(k < self.rows, "row {k} out of range ({} rows)", self.rows);
        let n = self.vector_length;
        &mut self.as_mut_slice()[k * n..][..n]
    }

    /// View the whole table as cells that lanes can update through a shared
    /// reference.
    pub fn cells(&mut self) -> &[Real] {
        Real::from_mut_slice(self.as_mut_slice())
    }
}

impl Index<usize> for EmbeddingTable {
    type Output = [real];

    fn index(&self, k: usize) -> &[real] {
        self.row(k)
    }
}

impl IndexMut<usize> for EmbeddingTable {
    fn index_mut(&mut self, k: usize) -> &mut [real] {
        self.row_mut(k)
    }
}

impl fmt::Debug for EmbeddingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingTable")
            .field("rows", &self.rows)
            .field("vector_length", &self.vector_length)
            .finish_non_exhaustive()
    }
}

/// Precompute the logistic function `f(x) = e^x / (e^x + 1)` at `len` evenly
/// spaced points of `[-HS_MAX_EXP, HS_MAX_EXP)`.
pub fn sigmoid_table(len: usize) -> Vec<real> {
    (0..len)
        .map(|i| {
            let e = ((i as real / len as real * 2.0 - 1.0) * HS_MAX_EXP).exp();
            e / (e + 1.0)
        })
        .collect()
}
