use word2vec_aggregates::{
    real, sequential, Aggregate, Axpy, Cbow, Dot, HierarchicSoftmax, HuffmanPath, Model,
    NegativeSampling, Rng, Round, RoundPlan, RowRef, Scratch, SkipGram, Strategy,
};

/// `table[i] == i / 12`. With 12 samples the lookup index is
/// `floor(dot + 6)`.
fn ramp() -> Vec<real> {
    (0..12).map(|i| i as real / 12.0).collect()
}

fn model(rows: usize, vector_length: usize, neg_table: Vec<i32>) -> Model {
    Model::new(rows, vector_length, ramp(), neg_table).unwrap()
}

/// Every strategy these tests run under. The hand-picked vectors below make
/// every dot product exact, so all of them must agree bit for bit.
fn strategies() -> [Strategy; 5] {
    [
        Strategy::Sequential,
        Strategy::cooperative(1),
        Strategy::cooperative(2),
        Strategy::cooperative(3),
        Strategy::cooperative(8),
    ]
}

fn execute(
    op: impl Into<Aggregate>,
    model: &mut Model,
    scratch: &mut Scratch,
    strategy: Strategy,
) {
    op.into().execute(model, scratch, strategy).unwrap();
}

const X: [real; 4] = [1.0, 0.5, -0.5, 0.25];
const W: [real; 4] = [2.0, 1.0, 0.5, 1.0];

#[test]
fn dot_product() {
    for strategy in strategies() {
        let mut m = model(3, 4, vec![]);
        m.syn0.row_mut(0).copy_from_slice(&X);
        m.syn1.row_mut(2).copy_from_slice(&W);
        m.syn1_neg.row_mut(1).copy_from_slice(&[9.0; 4]);
        let op = Dot {
            vector_length: 4,
            x: RowRef::syn0(0),
            y: RowRef::syn1(2),
            z: RowRef::syn1_neg(1),
        };
        execute(op, &mut m, &mut Scratch::new(4), strategy);
        assert_eq!(m.syn1_neg.row(1), [2.5, 9.0, 9.0, 9.0], "{strategy}");
        assert_eq!(m.syn0.row(0), X);
    }
}

#[test]
fn empty_dot_product_is_zero() {
    for strategy in strategies() {
        let mut m = model(2, 4, vec![]);
        m.syn0.row_mut(1).copy_from_slice(&[7.0; 4]);
        let op = Dot {
            vector_length: 0,
            x: RowRef::syn0(0),
            y: RowRef::syn0(0),
            z: RowRef::syn0(1),
        };
        execute(op, &mut m, &mut Scratch::new(4), strategy);
        assert_eq!(m.syn0.row(1), [0.0, 7.0, 7.0, 7.0], "{strategy}");
    }
}

#[test]
fn axpy_updates_y_only() {
    for strategy in strategies() {
        let mut m = model(2, 4, vec![]);
        m.syn0.row_mut(1).copy_from_slice(&X);
        m.syn1.row_mut(0).copy_from_slice(&W);
        let op = Axpy {
            vector_length: 3,
            alpha: -2.0,
            x: RowRef::syn0(1),
            y: RowRef::syn1(0),
        };
        execute(op, &mut m, &mut Scratch::new(4), strategy);
        assert_eq!(m.syn1.row(0), [0.0, 0.0, 1.5, 1.0], "{strategy}");
        assert_eq!(m.syn0.row(1), X);
    }
}

#[test]
fn softmax_update_law() {
    for strategy in strategies() {
        for code in [0, 1] {
            let alpha = 0.5;
            let mut m = model(2, 4, vec![]);
            m.syn0.row_mut(0).copy_from_slice(&X);
            m.syn1.row_mut(1).copy_from_slice(&W);
            let mut scratch = Scratch::new(4);
            let op = HierarchicSoftmax {
                input: RowRef::syn0(0),
                node: 1,
                code,
                alpha,
            };
            execute(op, &mut m, &mut scratch, strategy);

            // X . W = 2.5, so the lookup is table[8].
            let g = (1.0 - real::from(code) - m.exp_table[8]) * alpha;
            for c in 0..4 {
                assert_eq!(scratch.neu1e()[c], g * W[c], "{strategy}");
                assert_eq!(m.syn1.row(1)[c], W[c] + g * X[c], "{strategy}");
            }
            assert_eq!(m.syn0.row(0), X, "input row is left to the caller");
        }
    }
}

#[test]
fn softmax_clamps_saturated_dot_products() {
    for strategy in strategies() {
        // dot = 8, then dot = 6 (the upper bound is exclusive), then -8.
        for (x, w) in [([2.0; 4], [1.0; 4]), ([1.5; 4], [1.0; 4]), ([-2.0; 4], [1.0; 4])] {
            let mut m = model(1, 4, vec![]);
            m.syn0.row_mut(0).copy_from_slice(&x);
            m.syn1.row_mut(0).copy_from_slice(&w);
            let mut scratch = Scratch::new(4);
            let op = HierarchicSoftmax {
                input: RowRef::syn0(0),
                node: 0,
                code: 0,
                alpha: 1.0,
            };
            execute(op, &mut m, &mut scratch, strategy);
            assert_eq!(m.syn1.row(0), w, "{strategy}");
            assert_eq!(scratch.neu1e(), [0.0; 4], "{strategy}");
        }
    }
}

#[test]
fn softmax_lower_bound_is_inclusive() {
    for strategy in strategies() {
        let mut m = model(1, 4, vec![]);
        m.syn0.row_mut(0).copy_from_slice(&[-1.5; 4]);
        m.syn1.row_mut(0).copy_from_slice(&[1.0; 4]);
        let mut scratch = Scratch::new(4);
        let op = HierarchicSoftmax {
            input: RowRef::syn0(0),
            node: 0,
            code: 0,
            alpha: 1.0,
        };
        execute(op, &mut m, &mut scratch, strategy);
        // table[0] == 0, so g == 1.
        assert_eq!(scratch.neu1e(), [1.0; 4], "{strategy}");
        assert_eq!(m.syn1.row(0), [-0.5; 4], "{strategy}");
    }
}

fn sample(m: &mut Model, scratch: &mut Scratch, code: u8, alpha: real, strategy: Strategy) {
    let op = NegativeSampling {
        input: RowRef::syn0(0),
        target: 0,
        code,
        alpha,
    };
    execute(op, m, scratch, strategy);
}

#[test]
fn sampling_saturation_branches() {
    for strategy in strategies() {
        let alpha = 0.25;

        // dot = 8 with a negative sample: g = -alpha
        let mut m = model(1, 4, vec![]);
        m.syn0.row_mut(0).copy_from_slice(&[2.0; 4]);
        m.syn1_neg.row_mut(0).copy_from_slice(&[1.0; 4]);
        let mut scratch = Scratch::new(4);
        sample(&mut m, &mut scratch, 0, alpha, strategy);
        assert_eq!(scratch.neu1e(), [-alpha; 4], "{strategy}");
        assert_eq!(m.syn1_neg.row(0), [1.0 - alpha * 2.0; 4], "{strategy}");

        // dot = -8 with the positive sample: g = alpha
        let mut m = model(1, 4, vec![]);
        m.syn0.row_mut(0).copy_from_slice(&[-2.0; 4]);
        m.syn1_neg.row_mut(0).copy_from_slice(&[1.0; 4]);
        let mut scratch = Scratch::new(4);
        sample(&mut m, &mut scratch, 1, alpha, strategy);
        assert_eq!(scratch.neu1e(), [alpha; 4], "{strategy}");
        assert_eq!(m.syn1_neg.row(0), [1.0 - alpha * 2.0; 4], "{strategy}");

        // Saturated dot products that already agree with the label do nothing.
        let mut m = model(1, 4, vec![]);
        m.syn0.row_mut(0).copy_from_slice(&[2.0; 4]);
        m.syn1_neg.row_mut(0).copy_from_slice(&[1.0; 4]);
        let mut scratch = Scratch::new(4);
        sample(&mut m, &mut scratch, 1, alpha, strategy);
        assert_eq!(scratch.neu1e(), [0.0; 4], "{strategy}");
        assert_eq!(m.syn1_neg.row(0), [1.0; 4], "{strategy}");
    }
}

#[test]
fn sampling_table_branch() {
    for strategy in strategies() {
        for code in [0, 1] {
            let alpha = 0.5;
            let mut m = model(1, 4, vec![]);
            m.syn0.row_mut(0).copy_from_slice(&X);
            m.syn1_neg.row_mut(0).copy_from_slice(&W);
            let mut scratch = Scratch::new(4);
            sample(&mut m, &mut scratch, code, alpha, strategy);

            let g = (real::from(code) - m.exp_table[8]) * alpha;
            for c in 0..4 {
                assert_eq!(scratch.neu1e()[c], g * W[c], "{strategy}");
                assert_eq!(m.syn1_neg.row(0)[c], W[c] + g * X[c], "{strategy}");
            }
        }
    }
}

#[test]
fn sampling_skips_index_past_table_end() {
    for strategy in strategies() {
        // dot == HS_MAX_EXP is not saturated, and maps one past the end.
        let mut m = model(1, 4, vec![]);
        m.syn0.row_mut(0).copy_from_slice(&[1.5; 4]);
        m.syn1_neg.row_mut(0).copy_from_slice(&[1.0; 4]);
        let mut scratch = Scratch::new(4);
        sample(&mut m, &mut scratch, 0, 1.0, strategy);
        assert_eq!(scratch.neu1e(), [0.0; 4], "{strategy}");
        assert_eq!(m.syn1_neg.row(0), [1.0; 4], "{strategy}");
    }
}

#[test]
fn skip_gram_with_one_node() {
    for strategy in strategies() {
        let alpha = 0.25;
        let mut m = model(4, 4, vec![]);
        m.syn0.row_mut(3).copy_from_slice(&X);
        m.syn1.row_mut(0).copy_from_slice(&W);
        let op = SkipGram {
            syn0_row: 3,
            path: HuffmanPath::new(vec![0], vec![0]),
            ng_rounds: 0,
            vocab_size: 4,
            ng_starter: 1,
            alpha,
            next_random: 5,
        };
        execute(op, &mut m, &mut Scratch::new(4), strategy);

        let g = (1.0 - m.exp_table[8]) * alpha;
        for c in 0..4 {
            assert_eq!(m.syn0.row(3)[c], X[c] + g * W[c], "{strategy}");
            assert_eq!(m.syn1.row(0)[c], W[c] + g * X[c], "{strategy}");
        }
        assert_eq!(m.syn1_neg.as_slice(), [0.0; 16]);
    }
}

#[test]
fn skip_gram_without_rounds_changes_nothing() {
    let mut m = model(2, 4, vec![]);
    m.syn0.row_mut(1).copy_from_slice(&X);
    let op = SkipGram {
        syn0_row: 1,
        path: HuffmanPath::default(),
        ng_rounds: 0,
        vocab_size: 2,
        ng_starter: 0,
        alpha: 1.0,
        next_random: 0,
    };
    for strategy in strategies() {
        execute(op.clone(), &mut m, &mut Scratch::new(4), strategy);
        assert_eq!(m.syn0.row(1), X);
    }
}

#[test]
fn scratch_is_cleared_between_calls() {
    let mut m = model(4, 4, vec![]);
    m.syn0.row_mut(3).copy_from_slice(&X);
    m.syn1.row_mut(0).copy_from_slice(&W);
    let op = SkipGram {
        syn0_row: 3,
        path: HuffmanPath::new(vec![0], vec![0]),
        ng_rounds: 0,
        vocab_size: 4,
        ng_starter: 1,
        alpha: 0.25,
        next_random: 5,
    };
    let mut fresh = m.try_clone().unwrap();

    let mut scratch = Scratch::new(4);
    scratch.neu1e_mut().fill(100.0);
    execute(op.clone(), &mut m, &mut scratch, Strategy::Sequential);
    sequential::skip_gram(&op, &mut fresh);
    assert_eq!(m.syn0.as_slice(), fresh.syn0.as_slice());
}

#[test]
fn cbow_averages_and_scatters() {
    let rows: [[real; 4]; 3] = [[1.0, 2.0, 0.0, -1.0], [0.5, 0.0, 1.0, 1.0], [0.0, 1.0, 2.0, 0.5]];
    for strategy in strategies() {
        let mut m = model(5, 4, vec![]);
        for (k, row) in rows.iter().enumerate() {
            m.syn0.row_mut(k + 1).copy_from_slice(row);
        }
        m.syn0.row_mut(0).copy_from_slice(&[3.0; 4]);
        m.syn1.row_mut(2).copy_from_slice(&[0.5, -1.0, 1.0, 0.25]);
        let before = m.try_clone().unwrap();

        let op = Cbow {
            context: vec![1, 2, 3],
            path: HuffmanPath::new(vec![2], vec![1]),
            ng_rounds: 0,
            vocab_size: 5,
            ng_starter: 1,
            initial_idx: 0,
            alpha: 0.5,
            next_random: 1,
        };
        let mut scratch = Scratch::new(4);
        execute(op, &mut m, &mut scratch, strategy);

        for c in 0..4 {
            let mean = (rows[0][c] + rows[1][c] + rows[2][c]) / 3.0;
            assert_eq!(scratch.neu1()[c], mean, "{strategy}");
        }
        assert!(scratch.neu1e().iter().any(|&e| e != 0.0));
        for k in 1..=3 {
            for c in 0..4 {
                assert_eq!(
                    m.syn0.row(k)[c],
                    before.syn0.row(k)[c] + scratch.neu1e()[c],
                    "{strategy}"
                );
            }
        }
        assert_eq!(m.syn0.row(0), [3.0; 4], "rows outside the context are untouched");
        assert_eq!(m.syn0.row(4), [0.0; 4]);
    }
}

#[test]
fn cbow_with_empty_context() {
    for strategy in strategies() {
        let mut m = model(3, 4, vec![1, 2]);
        m.syn1.row_mut(0).copy_from_slice(&W);
        m.syn1_neg.row_mut(1).copy_from_slice(&W);
        let before = m.try_clone().unwrap();
        let op = Cbow {
            context: vec![],
            path: HuffmanPath::new(vec![0], vec![0]),
            ng_rounds: 2,
            vocab_size: 3,
            ng_starter: 1,
            initial_idx: 0,
            alpha: 0.5,
            next_random: 3,
        };
        let mut scratch = Scratch::new(4);
        execute(op, &mut m, &mut scratch, strategy);
        assert_eq!(scratch.neu1(), [0.0; 4]);
        assert!(scratch.neu1e().iter().all(|e| e.is_finite()));
        assert_eq!(m.syn0.as_slice(), before.syn0.as_slice());
        assert_eq!(m.syn1.as_slice(), before.syn1.as_slice());
        assert_eq!(m.syn1_neg.as_slice(), before.syn1_neg.as_slice());
    }
}

/// Find a seed whose second negative draw (of three) hits `ng_starter`,
/// while the other two don't. The other two also differ from each other, so
/// no row is read after it was updated and every strategy agrees exactly.
fn colliding_seed(table: &[i32]) -> (u64, usize, [usize; 3]) {
    (1..)
        .find_map(|seed| {
            let mut rng = Rng(seed);
            let slots: Vec<usize> = (0..3)
                .map(|_| ((rng.rand_u64() >> 16) % table.len() as u64) as usize)
                .collect();
            let targets = [0, 1, 2].map(|d| table[slots[d]] as usize);
            let distinct = targets[0] != targets[2];
            (distinct && targets[0] != targets[1] && targets[2] != targets[1]).then_some((
                seed,
                targets[1],
                targets,
            ))
        })
        .unwrap()
}

#[test]
fn self_collision_is_not_backfilled() {
    let table: Vec<i32> = (1..=16).collect();
    let (seed, starter, targets) = colliding_seed(&table);

    let empty = HuffmanPath::default();
    let rounds = RoundPlan::new(&empty, 3, starter, 20, &table, seed).collect::<Vec<_>>();
    assert_eq!(
        rounds,
        [
            Round::Sample {
                target: starter,
                code: 1,
            },
            Round::Sample {
                target: targets[0],
                code: 0,
            },
            Round::Sample {
                target: targets[2],
                code: 0,
            },
        ]
    );

    let mut init = model(20, 4, table.clone());
    init.syn0.row_mut(7).copy_from_slice(&X);
    for (k, e) in init.syn1_neg.as_mut_slice().iter_mut().enumerate() {
        *e = (k % 5) as real * 0.25 - 0.5;
    }

    // The same updates, made by hand.
    let mut expected = init.try_clone().unwrap();
    let mut neu1e = [0.0; 4];
    let input = expected.syn0.row(7).to_vec();
    for (target, code) in [(starter, 1), (targets[0], 0), (targets[2], 0)] {
        sequential::negative_sampling(
            &input,
            expected.syn1_neg.row_mut(target),
            &expected.exp_table,
            &mut neu1e,
            code,
            0.5,
        );
    }
    sequential::axpy(1.0, &neu1e, expected.syn0.row_mut(7));

    let op = SkipGram {
        syn0_row: 7,
        path: HuffmanPath::default(),
        ng_rounds: 3,
        vocab_size: 20,
        ng_starter: starter,
        alpha: 0.5,
        next_random: seed,
    };
    for strategy in strategies() {
        let mut m = init.try_clone().unwrap();
        execute(op.clone(), &mut m, &mut Scratch::new(4), strategy);
        assert_eq!(m.syn0.as_slice(), expected.syn0.as_slice(), "{strategy}");
        assert_eq!(m.syn1_neg.as_slice(), expected.syn1_neg.as_slice(), "{strategy}");
    }
}

#[test]
fn invalid_table_entries_fall_back() {
    let table = vec![0; 8];
    let empty = HuffmanPath::default();
    let mut rng = Rng(17);
    for round in RoundPlan::new(&empty, 5, 2, 5, &table, 17).skip(1) {
        let mut expected = (rng.rand_u64() % 4 + 1) as usize;
        while expected == 2 {
            // Self-collisions are dropped from the plan.
            expected = (rng.rand_u64() % 4 + 1) as usize;
        }
        assert_eq!(round, Round::Sample { target: expected, code: 0 });
    }
}

#[test]
fn raw_skip_gram_matches_descriptor() {
    let mut m = model(6, 4, vec![1, 2, 3, 4, 5]);
    m.syn0.row_mut(2).copy_from_slice(&X);
    m.syn1.row_mut(1).copy_from_slice(&W);
    let mut direct = m.try_clone().unwrap();

    let nodes = [1, 0];
    let codes = [0, 1];
    let arrays: [&[i32]; 2] = [&nodes, &codes];
    let index = [2, 4, 2, 3, 12, 6, 4, 5];
    let raw = Aggregate::from_raw(4, &m, &[], &index, &arrays, &[0.25, 1234.0]).unwrap();
    let op = SkipGram {
        syn0_row: 2,
        path: HuffmanPath::new(vec![1, 0], vec![0, 1]),
        ng_rounds: 3,
        vocab_size: 6,
        ng_starter: 4,
        alpha: 0.25,
        next_random: 1234,
    };
    assert_eq!(raw, Aggregate::SkipGram(op.clone()));

    execute(raw, &mut m, &mut Scratch::new(4), Strategy::Sequential);
    sequential::skip_gram(&op, &mut direct);
    assert_eq!(m.syn0.as_slice(), direct.syn0.as_slice());
    assert_eq!(m.syn1.as_slice(), direct.syn1.as_slice());
    assert_eq!(m.syn1_neg.as_slice(), direct.syn1_neg.as_slice());
}
