use std::collections::BTreeSet;

use mimoverif_core::common::CMatrix;
use mimoverif_core::dut::{DeviceUnderTest, SoftwareDut};
use mimoverif_core::session::CancelToken;
use mimoverif_core::transaction::{Payload, Port, SeqNum, Transaction};
use mockall::mock;

mock! {
    /// Scriptable device under test.
    pub Dut {}
    impl DeviceUnderTest for Dut {
        fn step<'a>(&mut self, tick: u64, input: Option<&'a Transaction>) -> Vec<Transaction>;
        fn in_flight(&self) -> usize;
    }
}

/// A DUT that accepts every stimulus and never answers.
pub fn silent_dut() -> MockDut {
    let mut dut = MockDut::new();
    dut.expect_step().returning(|_, _| Vec::new());
    dut.expect_in_flight().return_const(0usize);
    dut
}

/// Software DUT that requests cancellation once `after` stimuli were applied.
pub struct CancellingDut {
    /// Pipeline doing the work.
    pub inner: SoftwareDut,
    /// Token cancelled from inside `step`.
    pub token: CancelToken,
    /// Stimuli applied before cancelling.
    pub after: usize,
    applied: usize,
}

impl CancellingDut {
    /// Wraps a well-behaved software DUT.
    pub fn new(token: CancelToken, after: usize) -> Self {
        Self {
            inner: SoftwareDut::new(),
            token,
            after,
            applied: 0,
        }
    }
}

impl DeviceUnderTest for CancellingDut {
    fn step(&mut self, tick: u64, input: Option<&Transaction>) -> Vec<Transaction> {
        if input.is_some() {
            self.applied += 1;
            if self.applied == self.after {
                self.token.cancel();
            }
        }
        self.inner.step(tick, input)
    }

    fn in_flight(&self) -> usize {
        self.inner.in_flight()
    }
}

/// Software DUT that emits every output twice.
pub struct DuplicatingDut {
    /// Pipeline doing the work.
    pub inner: SoftwareDut,
}

impl DeviceUnderTest for DuplicatingDut {
    fn step(&mut self, tick: u64, input: Option<&Transaction>) -> Vec<Transaction> {
        self.inner
            .step(tick, input)
            .into_iter()
            .flat_map(|t| [t.clone(), t])
            .collect()
    }

    fn in_flight(&self) -> usize {
        self.inner.in_flight()
    }
}

/// A DUT that floods the encoder port with outputs for sequence numbers far
/// ahead of anything applied.
pub struct FloodingDut {
    /// Outputs emitted per applied stimulus.
    pub burst: u64,
}

impl DeviceUnderTest for FloodingDut {
    fn step(&mut self, tick: u64, input: Option<&Transaction>) -> Vec<Transaction> {
        let Some(origin) = input else {
            return Vec::new();
        };
        (0..self.burst)
            .map(|i| {
                let mut out = Transaction::output(origin, tick, Port::EncoderOutput, Payload::Encoded(CMatrix::zeros(1, 1)));
                out.seq = SeqNum(10_000 + tick * self.burst + i);
                out
            })
            .collect()
    }

    fn in_flight(&self) -> usize {
        0
    }
}

/// Software DUT that holds outputs back and releases them newest first once
/// `batch` have accumulated, or when the inner pipeline goes idle.
pub struct ReversingDut {
    /// Pipeline doing the work.
    pub inner: SoftwareDut,
    /// Outputs held before a release.
    pub batch: usize,
    held: Vec<Transaction>,
}

impl ReversingDut {
    /// Wraps a well-behaved software DUT.
    pub fn new(batch: usize) -> Self {
        Self {
            inner: SoftwareDut::new(),
            batch,
            held: Vec::new(),
        }
    }
}

impl DeviceUnderTest for ReversingDut {
    fn step(&mut self, tick: u64, input: Option<&Transaction>) -> Vec<Transaction> {
        self.held.extend(self.inner.step(tick, input));
        if self.held.len() < self.batch && self.inner.in_flight() > 0 {
            return Vec::new();
        }
        let mut out = std::mem::take(&mut self.held);
        out.reverse();
        out
    }

    fn in_flight(&self) -> usize {
        let held: BTreeSet<SeqNum> = self.held.iter().map(|t| t.seq).collect();
        self.inner.in_flight() + held.len()
    }
}
