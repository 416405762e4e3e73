//! Device-under-test boundary and a software implementation of the pipeline.
//!
//! The engine only sees a DUT through [`DeviceUnderTest`]: a clocked component
//! that accepts at most one stimulus per tick and returns whatever outputs it
//! produces on that tick. [`SoftwareDut`] implements the pipeline on top of the
//! reference model, quantising outputs to the configured fixed-point width,
//! and can be told to misbehave through [`DutFaults`].

use std::collections::BTreeSet;

use num_complex::Complex64;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::trace;

use crate::common::matrix::CMatrix;
use crate::model::ReferenceModel;
use crate::transaction::{Payload, Stage, Transaction};

/// Clocked device under test.
pub trait DeviceUnderTest: Send {
    /// Advances one tick, optionally applying a stimulus, and returns the
    /// outputs emitted on this tick.
    fn step(&mut self, tick: u64, input: Option<&Transaction>) -> Vec<Transaction>;

    /// Stimuli accepted whose outputs have not all been emitted.
    fn in_flight(&self) -> usize;
}

/// Fault knobs of the software DUT.
#[derive(Debug, Clone, PartialEq)]
pub struct DutFaults {
    /// Ticks between applying a stimulus and emitting each stage's output.
    pub latency: [u64; 3],
    /// Outputs due on the same tick are shuffled in groups of this size.
    pub reorder_window: usize,
    /// Seed of the reorder shuffle.
    pub reorder_seed: u64,
    /// Sequence numbers whose outputs are never emitted.
    pub dropped: BTreeSet<u64>,
    /// Stage restriction for `dropped`; `None` drops every stage.
    pub dropped_stage: Option<Stage>,
    /// Real offset added to every emitted complex sample.
    pub perturbation: f64,
    /// Whether injected drop requests are honoured.
    pub honour_injection: bool,
}

impl Default for DutFaults {
    fn default() -> Self {
        Self {
            latency: [1, 3, 2],
            reorder_window: 0,
            reorder_seed: 0,
            dropped: BTreeSet::new(),
            dropped_stage: None,
            perturbation: 0.0,
            honour_injection: true,
        }
    }
}

impl DutFaults {
    fn drops(&self, stage: Stage, seq: u64) -> bool {
        self.dropped.contains(&seq) && self.dropped_stage.is_none_or(|s| s == stage)
    }
}

#[derive(Debug)]
struct Scheduled {
    due: u64,
    order: u64,
    txn: Transaction,
}

/// Software model of the encoder/decoder/estimator pipeline.
#[derive(Debug)]
pub struct SoftwareDut {
    model: ReferenceModel,
    faults: DutFaults,
    rng: StdRng,
    queue: Vec<Scheduled>,
    order: u64,
}

impl SoftwareDut {
    /// Creates a well-behaved DUT.
    pub fn new() -> Self {
        Self::with_faults(DutFaults::default())
    }

    /// Creates a DUT with the given faults.
    pub fn with_faults(faults: DutFaults) -> Self {
        Self {
            model: ReferenceModel::new(),
            rng: StdRng::seed_from_u64(faults.reorder_seed),
            faults,
            queue: Vec::new(),
            order: 0,
        }
    }

    /// Active faults.
    pub const fn faults(&self) -> &DutFaults {
        &self.faults
    }

    fn accept(&mut self, tick: u64, input: &Transaction) {
        let Some(stimulus) = input.as_stimulus() else {
            return;
        };
        let frac_bits = input.config.fractional_bits();
        for stage in Stage::ALL {
            if self.faults.drops(stage, input.seq.0) || (self.faults.honour_injection && stimulus.drops(stage)) {
                trace!(target: "mimoverif::dut", seq = input.seq.0, %stage, "output suppressed");
                continue;
            }
            let Ok(expected) = self.model.predict(&input.config, stage, stimulus) else {
                continue;
            };
            let payload = self.distort(expected.into_payload(), frac_bits);
            self.order += 1;
            self.queue.push(Scheduled {
                due: tick + self.faults.latency[stage.index()],
                order: self.order,
                txn: Transaction::output(input, tick, stage.output_port(), payload),
            });
        }
    }

    fn distort(&self, payload: Payload, frac_bits: u32) -> Payload {
        let offset = self.faults.perturbation;
        let fix = |m: CMatrix| {
            let mut m = m;
            for z in m.as_mut_slice() {
                *z = Complex64::new(quantize(z.re + offset, frac_bits), quantize(z.im, frac_bits));
            }
            m
        };
        match payload {
            Payload::Encoded(x) => Payload::Encoded(fix(x)),
            Payload::Estimate(h) => Payload::Estimate(fix(h)),
            Payload::Detected(mut d) => {
                d.soft = fix(d.soft);
                Payload::Detected(d)
            }
            other @ Payload::Stimulus(_) => other,
        }
    }
}

impl Default for SoftwareDut {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceUnderTest for SoftwareDut {
    fn step(&mut self, tick: u64, input: Option<&Transaction>) -> Vec<Transaction> {
        if let Some(txn) = input {
            self.accept(tick, txn);
        }
        let (mut due, pending): (Vec<_>, Vec<_>) = self.queue.drain(..).partition(|s| s.due <= tick);
        self.queue = pending;
        due.sort_by_key(|s| (s.due, s.order));

        let mut out: Vec<Transaction> = due
            .into_iter()
            .map(|s| {
                let mut txn = s.txn;
                txn.tick = tick;
                txn
            })
            .collect();
        if self.faults.reorder_window > 1 {
            for chunk in out.chunks_mut(self.faults.reorder_window) {
                chunk.shuffle(&mut self.rng);
            }
        }
        out
    }

    fn in_flight(&self) -> usize {
        self.queue.iter().map(|s| s.txn.seq).collect::<BTreeSet<_>>().len()
    }
}

/// Rounds `x` to `frac_bits` fractional bits without saturating.
fn quantize(x: f64, frac_bits: u32) -> f64 {
    let scale = f64::from(1u32 << frac_bits);
    (x * scale).round() / scale
}
