//! Run a batch of SkipGram and CBOW calls under both strategies and compare
//! the trained tables.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use word2vec_aggregates::{
    real, sigmoid_table, Aggregate, Cbow, HuffmanPath, Model, Rng, Scratch, SkipGram, Strategy,
    DEFAULT_EXP_TABLE_SIZE,
};

#[derive(Parser)]
#[command(about = "Check that the cooperative aggregate kernels agree with the sequential ones", long_about = None)]
struct Options {
    /// Number of words (rows in every table)
    #[arg(long = "vocab", value_name = "N", default_value_t = 1000)]
    vocab_size: usize,

    /// Set size of word vectors
    #[arg(long = "size", default_value_t = 100)]
    vector_length: usize,

    /// Number of calls to generate
    #[arg(long, value_name = "N", default_value_t = 10000)]
    calls: usize,

    /// Lanes in the cooperative group; defaults to $AGGREGATE_LANES, then 4
    #[arg(long, value_name = "N")]
    lanes: Option<usize>,

    /// Longest Huffman path to generate
    #[arg(long = "hs-depth", value_name = "N", default_value_t = 10)]
    hs_depth: usize,

    /// Number of negative examples per call (0 = not used)
    #[arg(long, default_value_t = 5)]
    negative: usize,

    /// Largest CBOW context to generate
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Learning rate
    #[arg(long, default_value_t = 0.025)]
    alpha: real,

    /// Seed for the model and the generated calls
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Save the generated batch to FILE
    #[arg(long = "save-batch", value_name = "FILE")]
    save_batch: Option<PathBuf>,

    /// Replay the batch in FILE instead of generating one
    #[arg(long, value_name = "FILE", conflicts_with = "save_batch")]
    replay: Option<PathBuf>,

    /// Largest element difference allowed between the two strategies
    #[arg(long, default_value_t = 1e-3)]
    tolerance: real,
}

/// Everything needed to rebuild the model a batch was recorded against.
#[derive(Serialize, Deserialize)]
struct BatchFile {
    vocab_size: usize,
    vector_length: usize,
    model_seed: u64,
    neg_table_size: usize,
    calls: Vec<Aggregate>,
}

impl BatchFile {
    fn load(filename: &Path) -> Result<Self> {
        let f = BufReader::new(
            File::open(filename)
                .with_context(|| format!("failed to open batch file {filename:?}"))?,
        );
        bincode::deserialize_from(f)
            .with_context(|| format!("failed to load batch from file {filename:?}"))
    }

    fn save(&self, filename: &Path) -> Result<()> {
        let f = BufWriter::new(
            File::create(filename)
                .with_context(|| format!("error creating batch file {filename:?}"))?,
        );
        bincode::serialize_into(f, self)
            .with_context(|| format!("error writing batch file {filename:?}"))
    }

    fn model(&self) -> Result<Model> {
        let mut model = Model::new(
            self.vocab_size,
            self.vector_length,
            sigmoid_table(DEFAULT_EXP_TABLE_SIZE),
            unigram_table(self.vocab_size, self.neg_table_size),
        )?;
        model.randomize_syn0(&mut Rng(self.model_seed));
        Ok(model)
    }
}

/// A unigram table for a vocabulary whose word `i` occurs `1 / (i + 1)` as
/// often as word 0, with counts raised to the 0.75 power.
fn unigram_table(vocab_size: usize, len: usize) -> Vec<i32> {
    let power: f64 = 0.75;
    let weight = |i: usize| (1.0 / (i + 1) as f64).powf(power);
    let total = (0..vocab_size).map(weight).sum::<f64>();

    let mut table = Vec::with_capacity(len);
    let mut i = 0;
    let mut d1 = weight(i) / total;
    for a in 0..len {
        table.push(i as i32);
        if (a as f64 / len as f64) > d1 && i + 1 < vocab_size {
            i += 1;
            d1 += weight(i) / total;
        }
    }
    table
}

fn random_path(rng: &mut StdRng, options: &Options) -> HuffmanPath {
    let depth = rng.gen_range(1..=options.hs_depth.max(1));
    let inner_nodes = options.vocab_size.saturating_sub(1).max(1);
    HuffmanPath::new(
        (0..depth).map(|_| rng.gen_range(0..inner_nodes) as u32).collect(),
        (0..depth).map(|_| rng.gen_range(0..=1)).collect(),
    )
}

fn generate_calls(rng: &mut StdRng, options: &Options) -> Vec<Aggregate> {
    let vocab_size = options.vocab_size;
    (0..options.calls)
        .map(|_| {
            let path = random_path(rng, options);
            let ng_starter = rng.gen_range(1..vocab_size);
            let next_random = u64::from(rng.gen::<u32>());
            if rng.gen_bool(0.5) {
                Aggregate::from(SkipGram {
                    syn0_row: rng.gen_range(0..vocab_size),
                    path,
                    ng_rounds: options.negative,
                    vocab_size,
                    ng_starter,
                    alpha: options.alpha,
                    next_random,
                })
            } else {
                let width = rng.gen_range(0..=options.window);
                Aggregate::from(Cbow {
                    context: (0..width).map(|_| rng.gen_range(0..vocab_size) as u32).collect(),
                    path,
                    ng_rounds: options.negative,
                    vocab_size,
                    ng_starter,
                    initial_idx: 0,
                    alpha: options.alpha,
                    next_random,
                })
            }
        })
        .collect()
}

fn run(model: &mut Model, calls: &[Aggregate], strategy: Strategy) -> Result<()> {
    let pb = ProgressBar::new(calls.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")?,
    );
    pb.set_message(strategy.to_string());

    let mut scratch = Scratch::new(model.vector_length());
    for (i, call) in calls.iter().enumerate() {
        call.execute(model, &mut scratch, strategy)
            .with_context(|| format!("call {i} ({}) rejected", call.name()))?;
        pb.inc(1);
    }
    pb.finish();
    Ok(())
}

fn max_difference(a: &[real], b: &[real]) -> real {
    a.iter()
        .zip(b)
        .map(|(x, y)| OrderedFloat((x - y).abs()))
        .max()
        .map_or(0.0, |d| d.0)
}

fn check(options: &Options) -> Result<()> {
    let batch = match &options.replay {
        Some(f) => BatchFile::load(f)?,
        None => {
            let mut rng = StdRng::seed_from_u64(options.seed);
            ensure!(options.vocab_size >= 2, "--vocab must be at least 2");
            BatchFile {
                vocab_size: options.vocab_size,
                vector_length: options.vector_length,
                model_seed: options.seed,
                neg_table_size: options.vocab_size * 100,
                calls: generate_calls(&mut rng, options),
            }
        }
    };
    if let Some(f) = &options.save_batch {
        batch.save(f)?;
        info!("saved {} calls to {f:?}", batch.calls.len());
    }

    let cooperative = match options.lanes {
        Some(lanes) => Strategy::cooperative(lanes),
        None => match Strategy::from_env() {
            Strategy::Sequential => Strategy::cooperative(4),
            strategy => strategy,
        },
    };

    let mut expected = batch.model()?;
    let mut actual = expected.try_clone()?;
    run(&mut expected, &batch.calls, Strategy::Sequential)?;
    run(&mut actual, &batch.calls, cooperative)?;

    let mut worst: real = 0.0;
    for (name, a, b) in [
        ("syn0", &expected.syn0, &actual.syn0),
        ("syn1", &expected.syn1, &actual.syn1),
        ("syn1_neg", &expected.syn1_neg, &actual.syn1_neg),
    ] {
        let diff = max_difference(a.as_slice(), b.as_slice());
        info!("{name}: largest difference {diff:e}");
        debug!(table = name, rows = a.rows(), "compared");
        worst = worst.max(diff);
        ensure!(
            diff <= options.tolerance,
            "{name} differs by {diff:e} under {cooperative}, more than the tolerance {:e}",
            options.tolerance
        );
    }
    info!(
        "{} calls agree under {cooperative} (largest difference {worst:e})",
        batch.calls.len()
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = Options::parse();
    if let Err(err) = check(&options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
