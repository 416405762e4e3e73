//! Transaction pairing buffer.
//!
//! Correlates the applied-input stream of one stage with its observed-output
//! stream and yields outcomes in the order inputs were applied. Pending inputs
//! live in a fixed-capacity arena addressed through a sequence-number index:
//! 1. **Window:** At most `window` inputs are pending; applying one more evicts
//!    the oldest as dropped.
//! 2. **Timeout:** An input whose output has not arrived `timeout_ticks` after it
//!    was applied is dropped.
//! 3. **Ordering:** In-order stages treat an output for a later sequence number
//!    as proof that older pending outputs were skipped. Reorder-tolerant stages
//!    accept outputs in any order inside the window and verify the origin
//!    fingerprint instead.
//!
//! Outputs for unknown or already-resolved sequence numbers are counted as
//! strays; no transaction is ever matched twice.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::common::error::{Result, VerifyError};
use crate::config::PairingOptions;
use crate::transaction::{SeqNum, Stage, Transaction};

/// An applied input together with the output observed for it.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    /// Stage the output belongs to.
    pub stage: Stage,
    /// Applied stimulus.
    pub input: Transaction,
    /// Observed output.
    pub output: Transaction,
}

/// Why an input left the buffer without an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No output within the timeout.
    Timeout,
    /// Pushed out of a full window.
    Evicted,
    /// An in-order stage produced a later output first.
    Skipped,
    /// The session was cancelled while the input was pending.
    Abandoned,
}

/// Result of pairing one applied input.
#[derive(Debug, Clone)]
pub enum PairOutcome {
    /// Input and output correlated.
    Matched(MatchedPair),
    /// No output will be paired with this input.
    Dropped {
        /// Stage whose output is missing.
        stage: Stage,
        /// Applied stimulus.
        input: Transaction,
        /// Cause.
        reason: DropReason,
    },
}

impl PairOutcome {
    /// Sequence number of the input.
    pub const fn seq(&self) -> SeqNum {
        match self {
            Self::Matched(p) => p.input.seq,
            Self::Dropped { input, .. } => input.seq,
        }
    }

    /// Applied stimulus.
    pub const fn input(&self) -> &Transaction {
        match self {
            Self::Matched(p) => &p.input,
            Self::Dropped { input, .. } => input,
        }
    }

    /// Stage of the outcome.
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Matched(p) => p.stage,
            Self::Dropped { stage, .. } => *stage,
        }
    }
}

/// Counters kept by a pairing buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairingStats {
    /// Inputs applied.
    pub applied: u64,
    /// Pairs matched.
    pub matched: u64,
    /// Inputs dropped on timeout.
    pub timed_out: u64,
    /// Inputs evicted from a full window.
    pub evicted: u64,
    /// Inputs skipped by an in-order stage.
    pub skipped: u64,
    /// Inputs abandoned at cancellation.
    pub abandoned: u64,
    /// Outputs for unknown, resolved, or mismatching inputs.
    pub strays: u64,
    /// Outputs for an input that already had one.
    pub duplicates: u64,
    /// Most early outputs parked at once.
    pub parked_peak: u64,
}

#[derive(Debug)]
enum SlotState {
    Waiting,
    Matched(Transaction),
    Dropped(DropReason),
}

#[derive(Debug)]
struct Slot {
    input: Transaction,
    applied_tick: u64,
    state: SlotState,
}

/// Sliding-window pairing buffer for one stage.
#[derive(Debug)]
pub struct PairingBuffer {
    stage: Stage,
    options: PairingOptions,
    arena: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<SeqNum, usize>,
    order: VecDeque<SeqNum>,
    parked: BTreeMap<SeqNum, Transaction>,
    last_applied: Option<SeqNum>,
    ready: VecDeque<PairOutcome>,
    stats: PairingStats,
}

impl PairingBuffer {
    /// Creates an empty buffer for `stage`.
    pub fn new(stage: Stage, options: PairingOptions) -> Self {
        let window = options.window;
        Self {
            stage,
            options,
            arena: (0..window).map(|_| None).collect(),
            free: (0..window).rev().collect(),
            index: HashMap::with_capacity(window),
            order: VecDeque::with_capacity(window),
            parked: BTreeMap::new(),
            last_applied: None,
            ready: VecDeque::new(),
            stats: PairingStats::default(),
        }
    }

    /// Stage served by this buffer.
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Counters so far.
    pub const fn stats(&self) -> PairingStats {
        self.stats
    }

    /// Inputs applied and not yet emitted.
    pub fn pending(&self) -> usize {
        self.order.len()
    }

    /// Returns true when no input is pending and no output is parked.
    pub fn is_idle(&self) -> bool {
        self.order.is_empty() && self.parked.is_empty()
    }

    /// Registers an applied input at `tick`.
    ///
    /// Inputs must arrive with strictly increasing sequence numbers; anything
    /// else is rejected as a configuration error of the driving environment.
    pub fn apply(&mut self, input: Transaction, tick: u64) -> Result<()> {
        let seq = input.seq;
        if self.last_applied.is_some_and(|last| seq <= last) {
            return Err(VerifyError::ConfigurationInvalid(format!(
                "{} input {seq} applied out of order",
                self.stage
            )));
        }
        if self.free.is_empty() {
            self.evict_oldest();
        }
        let Some(slot) = self.free.pop() else {
            return Err(VerifyError::Internal("pairing arena has no free slot".into()));
        };
        self.arena[slot] = Some(Slot {
            input,
            applied_tick: tick,
            state: SlotState::Waiting,
        });
        let _ = self.index.insert(seq, slot);
        self.order.push_back(seq);
        self.last_applied = Some(seq);
        self.stats.applied += 1;

        if let Some(output) = self.parked.remove(&seq) {
            self.observe(output)?;
        }
        self.flush();
        Ok(())
    }

    /// Registers an observed output.
    pub fn observe(&mut self, output: Transaction) -> Result<()> {
        let seq = output.seq;
        let Some(&slot) = self.index.get(&seq) else {
            return self.park_or_stray(output);
        };
        let reorder_tolerant = self.options.reorder_tolerant;
        let Some(entry) = self.arena[slot].as_mut() else {
            return Err(VerifyError::Internal(format!("index points at empty slot for {seq}")));
        };

        match entry.state {
            SlotState::Waiting => {}
            SlotState::Matched(_) => {
                self.stats.duplicates += 1;
                self.stats.strays += 1;
                warn!(target: "mimoverif::pairing", stage = %self.stage, seq = seq.0, "duplicate output");
                return Ok(());
            }
            SlotState::Dropped(_) => {
                self.stats.strays += 1;
                return Ok(());
            }
        }
        if reorder_tolerant && output.fingerprint != entry.input.fingerprint {
            self.stats.strays += 1;
            warn!(
                target: "mimoverif::pairing",
                stage = %self.stage,
                seq = seq.0,
                expected = entry.input.fingerprint,
                actual = output.fingerprint,
                "output fingerprint does not match its input"
            );
            return Ok(());
        }
        entry.state = SlotState::Matched(output);
        self.stats.matched += 1;

        if !reorder_tolerant {
            self.skip_before(seq);
        }
        self.flush();
        Ok(())
    }

    /// Drops every input whose output is overdue at `now`.
    pub fn expire(&mut self, now: u64) {
        let timeout = self.options.timeout_ticks;
        for seq in &self.order {
            let Some(entry) = self.index.get(seq).and_then(|&i| self.arena[i].as_mut()) else {
                continue;
            };
            if matches!(entry.state, SlotState::Waiting) && now.saturating_sub(entry.applied_tick) > timeout {
                entry.state = SlotState::Dropped(DropReason::Timeout);
                self.stats.timed_out += 1;
                debug!(target: "mimoverif::pairing", stage = %self.stage, seq = seq.0, now, "pairing timeout");
            }
        }
        self.flush();
    }

    /// Resolves every pending input as abandoned and flushes matched pairs.
    ///
    /// Parked early outputs are discarded as strays.
    pub fn abandon(&mut self) {
        for seq in &self.order {
            if let Some(entry) = self.index.get(seq).and_then(|&i| self.arena[i].as_mut()) {
                if matches!(entry.state, SlotState::Waiting) {
                    entry.state = SlotState::Dropped(DropReason::Abandoned);
                    self.stats.abandoned += 1;
                }
            }
        }
        self.stats.strays += self.parked.len() as u64;
        self.parked.clear();
        self.flush();
    }

    /// Next outcome in input order, if one is ready.
    pub fn pop_ready(&mut self) -> Option<PairOutcome> {
        self.ready.pop_front()
    }

    fn park_or_stray(&mut self, output: Transaction) -> Result<()> {
        let seq = output.seq;
        if self.last_applied.is_some_and(|last| seq <= last) {
            self.stats.strays += 1;
            warn!(target: "mimoverif::pairing", stage = %self.stage, seq = seq.0, "stray output");
            return Ok(());
        }
        if self.parked.contains_key(&seq) {
            self.stats.duplicates += 1;
            self.stats.strays += 1;
            return Ok(());
        }
        let _ = self.parked.insert(seq, output);
        self.stats.parked_peak = self.stats.parked_peak.max(self.parked.len() as u64);
        if self.parked.len() > self.options.window {
            return Err(VerifyError::PairingBufferExhausted {
                parked: self.parked.len(),
                capacity: self.options.window,
            });
        }
        Ok(())
    }

    fn skip_before(&mut self, seq: SeqNum) {
        for older in self.order.iter().take_while(|s| **s < seq) {
            if let Some(entry) = self.index.get(older).and_then(|&i| self.arena[i].as_mut()) {
                if matches!(entry.state, SlotState::Waiting) {
                    entry.state = SlotState::Dropped(DropReason::Skipped);
                    self.stats.skipped += 1;
                }
            }
        }
    }

    fn evict_oldest(&mut self) {
        let Some(&oldest) = self.order.front() else {
            return;
        };
        if let Some(entry) = self.index.get(&oldest).and_then(|&i| self.arena[i].as_mut()) {
            if matches!(entry.state, SlotState::Waiting) {
                entry.state = SlotState::Dropped(DropReason::Evicted);
                self.stats.evicted += 1;
                debug!(target: "mimoverif::pairing", stage = %self.stage, seq = oldest.0, "evicted from full window");
            }
        }
        self.emit_front();
    }

    /// Moves resolved inputs at the head of the window to the ready queue.
    fn flush(&mut self) {
        while let Some(seq) = self.order.front() {
            let resolved = self
                .index
                .get(seq)
                .and_then(|&i| self.arena[i].as_ref())
                .is_none_or(|e| !matches!(e.state, SlotState::Waiting));
            if !resolved {
                break;
            }
            self.emit_front();
        }
    }

    fn emit_front(&mut self) {
        let Some(seq) = self.order.pop_front() else {
            return;
        };
        let Some(slot) = self.index.remove(&seq) else {
            return;
        };
        let Some(entry) = self.arena[slot].take() else {
            return;
        };
        self.free.push(slot);

        let outcome = match entry.state {
            SlotState::Matched(output) => PairOutcome::Matched(MatchedPair {
                stage: self.stage,
                input: entry.input,
                output,
            }),
            SlotState::Dropped(reason) => PairOutcome::Dropped {
                stage: self.stage,
                input: entry.input,
                reason,
            },
            SlotState::Waiting => PairOutcome::Dropped {
                stage: self.stage,
                input: entry.input,
                reason: DropReason::Evicted,
            },
        };
        match &outcome {
            PairOutcome::Matched(_) => {
                debug!(target: "mimoverif::pairing", stage = %self.stage, seq = seq.0, "pair matched");
            }
            PairOutcome::Dropped { reason, .. } => {
                debug!(target: "mimoverif::pairing", stage = %self.stage, seq = seq.0, ?reason, "input dropped");
            }
        }
        self.ready.push_back(outcome);
    }
}
