use crate::{HuffmanPath, Rng};

/// One sub-kernel call scheduled by a SkipGram or CBOW step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Round {
    /// Hierarchical softmax against row `node` of `syn1`.
    Softmax { node: usize, code: u8 },
    /// Negative sampling against row `target` of `syn1_neg`. `code` is 1 for
    /// the positive sample and 0 for drawn negatives.
    Sample { target: usize, code: u8 },
}

/// The sequence of sub-kernel calls for one SkipGram or CBOW step: every
/// node of the Huffman path, then (when `ng_rounds > 0`) the positive sample
/// followed by `ng_rounds` drawn negatives.
///
/// A negative draw that lands on the positive word is dropped, not redrawn,
/// so the plan can be shorter than `path.len() + ng_rounds + 1`.
#[derive(Clone, Debug)]
pub struct RoundPlan<'a> {
    path: &'a HuffmanPath,
    next_node: usize,
    ng_rounds: usize,
    next_sample: usize,
    ng_starter: usize,
    vocab_size: usize,
    neg_table: &'a [i32],
    rng: Rng,
}

impl<'a> RoundPlan<'a> {
    pub fn new(
        path: &'a HuffmanPath,
        ng_rounds: usize,
        ng_starter: usize,
        vocab_size: usize,
        neg_table: &'a [i32],
        next_random: u64,
    ) -> Self {
        debug_assert!(ng_rounds == 0 || (vocab_size > 1 && !neg_table.is_empty()));
        RoundPlan {
            path,
            next_node: 0,
            ng_rounds,
            next_sample: 0,
            ng_starter,
            vocab_size,
            neg_table,
            rng: Rng(next_random),
        }
    }

    /// Draw a negative sample from the unigram table. Entries that aren't a
    /// valid word index (`<= 0` or `>= vocab_size`) fall back to a uniform
    /// draw over `1..vocab_size`.
    fn draw(&mut self) -> usize {
        let next_random = self.rng.rand_u64();
        let slot = (next_random >> 16) % self.neg_table.len() as u64;
        match self.neg_table[slot as usize] {
            t if t > 0 && (t as usize) < self.vocab_size => t as usize,
            _ => (next_random % (self.vocab_size as u64 - 1) + 1) as usize,
        }
    }
}

impl Iterator for RoundPlan<'_> {
    type Item = Round;

    fn next(&mut self) -> Option<Round> {
        if self.next_node < self.path.len() {
            let d = self.next_node;
            self.next_node += 1;
            return Some(Round::Softmax {
                node: self.path.nodes[d] as usize,
                code: self.path.codes[d],
            });
        }

        if self.ng_rounds == 0 {
            return None;
        }
        while self.next_sample <= self.ng_rounds {
            let d = self.next_sample;
            self.next_sample += 1;
            if d == 0 {
                return Some(Round::Sample {
                    target: self.ng_starter,
                    code: 1,
                });
            }
            let target = self.draw();
            if target == self.ng_starter {
                continue;
            }
            return Some(Round::Sample { target, code: 0 });
        }
        None
    }
}
