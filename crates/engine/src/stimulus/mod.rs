//! Constrained-random and directed stimulus generation.
//!
//! The generator is the single writer of the stimulus stream. It yields a
//! finite, lazily computed sequence of encoder-input transactions:
//! 1. **Random mode:** Seeded weighted-random scenarios, reproducible from the seed.
//! 2. **Directed mode:** The directed scenario list, cycled to the transaction count.
//! 3. **Mixed mode:** The directed list once, then random scenarios.
//!
//! Every emitted stimulus satisfies the configuration's stream and antenna
//! invariants. A draw that cannot be realised is resampled a bounded number of
//! times and then replaced with nominal traffic.

/// Scenario weighting and realisation.
pub mod scenario;

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::config::{Configuration, GenerationMode, SessionOptions};
use crate::model::check_stimulus;
use crate::transaction::{ScenarioKind, SeqNum, Stimulus, Transaction};

pub use scenario::{ScenarioWeights, is_feasible, realize};

/// Random redraws before a draw falls back to nominal traffic.
const MAX_RESAMPLES: usize = 8;

/// Lazy, finite stream of stimulus transactions.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use mimoverif_core::config::{Configuration, SessionOptions};
/// use mimoverif_core::stimulus::StimulusGenerator;
///
/// let opts = SessionOptions { transaction_count: 5, seed: 7, ..SessionOptions::default() };
/// let generator = StimulusGenerator::new(Arc::new(Configuration::default()), &opts);
/// assert_eq!(generator.count(), 5);
/// ```
#[derive(Debug)]
pub struct StimulusGenerator {
    config: Arc<Configuration>,
    mode: GenerationMode,
    directed: Vec<ScenarioKind>,
    weights: ScenarioWeights,
    injection_rate: f64,
    total: usize,
    issued: usize,
    rng: StdRng,
}

impl StimulusGenerator {
    /// Creates a generator for `config` driven by the session options.
    ///
    /// Directed entries the configuration cannot express are replaced with
    /// nominal traffic and logged.
    pub fn new(config: Arc<Configuration>, options: &SessionOptions) -> Self {
        let directed = options
            .directed
            .iter()
            .map(|&kind| {
                if is_feasible(kind, &config) {
                    kind
                } else {
                    warn!(
                        target: "mimoverif::stimulus",
                        scenario = %kind,
                        config = %config,
                        "directed scenario not expressible, using nominal"
                    );
                    ScenarioKind::Nominal
                }
            })
            .collect();
        Self {
            weights: ScenarioWeights::new(&config, options.corner_case_weight),
            config,
            mode: options.mode,
            directed,
            injection_rate: options.injection_rate,
            total: options.transaction_count,
            issued: 0,
            rng: StdRng::seed_from_u64(options.seed),
        }
    }

    /// Configuration shared by every generated transaction.
    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Transactions not yet issued.
    pub const fn remaining(&self) -> usize {
        self.total - self.issued
    }

    fn planned(&self, index: usize) -> Option<ScenarioKind> {
        match self.mode {
            GenerationMode::Random => None,
            GenerationMode::Directed => self.directed.get(index % self.directed.len().max(1)).copied(),
            GenerationMode::Mixed => self.directed.get(index).copied(),
        }
    }

    fn draw(&mut self, index: usize) -> Option<Stimulus> {
        if let Some(kind) = self.planned(index) {
            if let Some(s) = self.accept(kind) {
                return Some(s);
            }
        }
        for _ in 0..MAX_RESAMPLES {
            let kind = self.weights.sample(&mut self.rng);
            if let Some(s) = self.accept(kind) {
                return Some(s);
            }
        }
        self.accept(ScenarioKind::Nominal)
    }

    fn accept(&mut self, kind: ScenarioKind) -> Option<Stimulus> {
        realize(&mut self.rng, kind, &self.config, self.injection_rate)
            .filter(|s| check_stimulus(&self.config, s).is_ok())
    }

    /// Generates the next transaction, stamped with `tick`.
    pub fn next_at(&mut self, tick: u64) -> Option<Transaction> {
        if self.issued >= self.total {
            return None;
        }
        let index = self.issued;
        self.issued += 1;
        let Some(stimulus) = self.draw(index) else {
            warn!(target: "mimoverif::stimulus", seq = index, "no legal stimulus could be drawn");
            return None;
        };

        debug!(
            target: "mimoverif::stimulus",
            seq = index,
            tick,
            scenario = %stimulus.scenario,
            streams = stimulus.active_streams,
            noise = stimulus.noise_class.label(),
            injected = stimulus.injection.is_some(),
            "transaction generated"
        );
        Some(Transaction::stimulus(
            SeqNum(index as u64),
            tick,
            Arc::clone(&self.config),
            stimulus,
        ))
    }
}

impl Iterator for StimulusGenerator {
    type Item = Transaction;

    fn next(&mut self) -> Option<Self::Item> {
        let tick = self.issued as u64;
        self.next_at(tick)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

impl ExactSizeIterator for StimulusGenerator {}
