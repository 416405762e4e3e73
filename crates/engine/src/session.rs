//! Verification session orchestration.
//!
//! A session owns one configuration and drives one scenario end to end. It runs
//! as a pipeline of threads inside a single scope:
//! 1. **Driver:** The calling thread. Clocks the DUT, issues stimuli under the
//!    in-flight bound, and publishes the ordered applied/observed event stream.
//! 2. **Pairing:** One thread owning a pairing buffer per stage. It correlates
//!    events and hands each resolved outcome to exactly one scoring worker.
//! 3. **Scoring:** A pool of workers sharing the outcome receiver. Each worker
//!    evaluates its outcome against the reference model and records the verdict
//!    and coverage sample under exclusive locks.
//!
//! Every handoff is a bounded channel, so a slow consumer throttles its
//! producer. Verdicts are keyed by stage and sequence number, which keeps the
//! final report independent of how workers interleave.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::common::error::{Result, VerifyError};
use crate::config::{Configuration, PairingOptions, SessionConfig, SessionOptions};
use crate::coverage::{CoverageModel, Sample};
use crate::dut::DeviceUnderTest;
use crate::pairing::{PairOutcome, PairingBuffer, PairingStats};
use crate::report::{SessionReport, StageBreakdown};
use crate::scoreboard::{Checker, Scoreboard};
use crate::stimulus::StimulusGenerator;
use crate::transaction::{Stage, Transaction};

/// Capacity of the driver to pairing event channel.
const EVENT_QUEUE_DEPTH: usize = 256;

/// Capacity of the pairing to scoring outcome channel.
const OUTCOME_QUEUE_DEPTH: usize = 64;

/// Final state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionStatus {
    /// Agreement met the threshold with no unwaived drops or model errors.
    Passed,
    /// The session ran to completion but did not meet its pass criteria.
    Failed,
    /// Stopped by a cancellation request; partial results are reported.
    Cancelled,
    /// Terminated early by an unrecoverable pipeline error.
    Aborted,
}

impl SessionStatus {
    /// Lowercase name used in logs and text reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

/// Cloneable session cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
enum Event {
    Applied(Transaction, u64),
    Observed(Transaction),
    Tick(u64),
    Finish(u64),
    Cancel,
}

#[derive(Debug)]
struct DriverSummary {
    ticks: u64,
    applied: u64,
    cancelled: bool,
}

#[derive(Debug)]
struct PairingSummary {
    stats: [PairingStats; 3],
    error: Option<VerifyError>,
}

/// One verification scenario over a fixed configuration.
#[derive(Debug)]
pub struct Session {
    config: Arc<Configuration>,
    options: SessionOptions,
    cancel: CancelToken,
}

impl Session {
    /// Creates a session, rejecting invalid configurations before any
    /// transaction is generated.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ConfigurationInvalid`] when the configuration or
    /// the session options violate an invariant.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config.configuration),
            options: config.options,
            cancel: CancelToken::new(),
        })
    }

    /// Replaces the cancellation token, e.g. with one shared by a signal handler.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this session.
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Session configuration.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Session options.
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Runs the scenario against `dut` and reports the outcome.
    ///
    /// Per-transaction failures never abort the run; they surface as verdicts.
    /// A cancelled or aborted run still reports everything collected so far.
    ///
    /// # Arguments
    ///
    /// * `dut` - The device under test, clocked on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Internal`] when a pipeline thread panics.
    pub fn run(&self, dut: &mut dyn DeviceUnderTest) -> Result<SessionReport> {
        self.run_with_coverage(dut).map(|(report, _)| report)
    }

    /// Like [`Session::run`], also returning the coverage model for merging.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Internal`] when a pipeline thread panics.
    pub fn run_with_coverage(&self, dut: &mut dyn DeviceUnderTest) -> Result<(SessionReport, CoverageModel)> {
        info!(
            target: "mimoverif::session",
            config = %self.config,
            seed = self.options.seed,
            transactions = self.options.transaction_count,
            mode = ?self.options.mode,
            "session started"
        );

        let checker = Checker::new(&self.options);
        let scoreboard = Mutex::new(Scoreboard::new());
        let coverage = Mutex::new(CoverageModel::for_configuration(&self.config));
        let abort = AtomicBool::new(false);

        let (event_tx, event_rx) = sync_channel::<Event>(EVENT_QUEUE_DEPTH);
        let (outcome_tx, outcome_rx) = sync_channel::<PairOutcome>(OUTCOME_QUEUE_DEPTH);
        let outcome_rx = Mutex::new(outcome_rx);

        let (driver, pairing) = thread::scope(|s| {
            let pairing_options = self.options.pairing.clone();
            let abort_flag = &abort;
            let pairing = s.spawn(move || pair_events(&event_rx, &outcome_tx, &pairing_options, abort_flag));

            let workers: Vec<_> = (0..self.options.scoring_workers)
                .map(|_| {
                    let (checker, scoreboard, coverage, outcomes) = (&checker, &scoreboard, &coverage, &outcome_rx);
                    s.spawn(move || score_outcomes(outcomes, checker, scoreboard, coverage))
                })
                .collect();

            let driver = self.drive(dut, &event_tx, &abort);
            drop(event_tx);

            let pairing = pairing
                .join()
                .map_err(|_| VerifyError::Internal("pairing thread panicked".into()));
            for worker in workers {
                if worker.join().is_err() {
                    return (driver, Err(VerifyError::Internal("scoring worker panicked".into())));
                }
            }
            (driver, pairing)
        });
        let pairing = pairing?;

        let scoreboard = scoreboard.into_inner();
        let coverage = coverage.into_inner();
        let report = self.assemble(&driver, pairing, &scoreboard, &coverage);

        info!(
            target: "mimoverif::session",
            status = report.status.label(),
            ticks = report.ticks,
            applied = report.transactions_applied,
            agreement = report.agreement_rate,
            coverage = report.coverage.overall_percent,
            "session finished"
        );
        Ok((report, coverage))
    }

    fn drive(&self, dut: &mut dyn DeviceUnderTest, events: &SyncSender<Event>, abort: &AtomicBool) -> DriverSummary {
        let mut generator = StimulusGenerator::new(Arc::clone(&self.config), &self.options);
        let stall_limit = self.options.pairing.timeout_ticks;
        let mut summary = DriverSummary {
            ticks: 0,
            applied: 0,
            cancelled: false,
        };
        let mut tick = 0u64;
        let mut last_progress = 0u64;
        let mut exhausted_at: Option<u64> = None;

        loop {
            if abort.load(Ordering::Acquire) {
                break;
            }
            if self.cancel.is_cancelled() {
                info!(target: "mimoverif::session", tick, applied = summary.applied, "cancellation requested");
                summary.cancelled = true;
                break;
            }

            let in_flight = dut.in_flight();
            if generator.remaining() == 0 {
                let since = *exhausted_at.get_or_insert(tick);
                if in_flight == 0 {
                    break;
                }
                if tick - since > stall_limit {
                    warn!(target: "mimoverif::session", tick, in_flight, "DUT still busy after drain period");
                    break;
                }
            } else if tick - last_progress > stall_limit {
                warn!(
                    target: "mimoverif::session",
                    tick,
                    in_flight,
                    remaining = generator.remaining(),
                    "DUT stalled, no further stimuli issued"
                );
                break;
            }

            let input = if in_flight < self.options.max_in_flight {
                generator.next_at(tick)
            } else {
                None
            };
            if let Some(txn) = &input {
                summary.applied += 1;
                last_progress = tick;
                if events.send(Event::Applied(txn.clone(), tick)).is_err() {
                    break;
                }
            }

            let outputs = dut.step(tick, input.as_ref());
            if !outputs.is_empty() {
                last_progress = tick;
            }
            let mut closed = false;
            for output in outputs {
                if events.send(Event::Observed(output)).is_err() {
                    closed = true;
                    break;
                }
            }
            if closed || events.send(Event::Tick(tick)).is_err() {
                break;
            }
            tick += 1;
        }

        summary.ticks = tick;
        let last = if summary.cancelled { Event::Cancel } else { Event::Finish(tick) };
        let _ = events.send(last);
        summary
    }

    fn assemble(
        &self,
        driver: &DriverSummary,
        pairing: PairingSummary,
        scoreboard: &Scoreboard,
        coverage: &CoverageModel,
    ) -> SessionReport {
        let tally = scoreboard.tally();
        let agreement_rate = tally.agreement_rate();
        let summary = coverage.summary();
        let clean = tally.dropped == 0 && tally.model_errors == 0;

        let status = if pairing.error.is_some() {
            SessionStatus::Aborted
        } else if driver.cancelled {
            SessionStatus::Cancelled
        } else if clean && agreement_rate >= self.options.agreement_threshold {
            SessionStatus::Passed
        } else {
            SessionStatus::Failed
        };

        SessionReport {
            status,
            seed: self.options.seed,
            configuration: (*self.config).clone(),
            ticks: driver.ticks,
            transactions_applied: driver.applied,
            tally,
            agreement_rate,
            agreement_threshold: self.options.agreement_threshold,
            coverage_goal_met: summary.overall_percent >= self.options.coverage_target,
            coverage_target: self.options.coverage_target,
            coverage: summary,
            stages: Stage::ALL
                .iter()
                .map(|&stage| StageBreakdown {
                    stage,
                    tally: scoreboard.stage_tally(stage),
                    pairing: pairing.stats[stage.index()],
                })
                .collect(),
            failures: scoreboard.failures().cloned().collect(),
            annotated: scoreboard.verdicts().filter(|v| v.annotation.is_some()).cloned().collect(),
            error: pairing.error.map(|e| e.to_string()),
        }
    }
}

/// Pairing thread body: folds the event stream into ordered outcomes.
fn pair_events(
    events: &Receiver<Event>,
    outcomes: &SyncSender<PairOutcome>,
    options: &PairingOptions,
    abort: &AtomicBool,
) -> PairingSummary {
    let mut buffers = Stage::ALL.map(|stage| PairingBuffer::new(stage, options.clone()));
    let timeout = options.timeout_ticks;
    let mut error = None;

    while let Ok(event) = events.recv() {
        let step = match event {
            Event::Applied(input, tick) => buffers.iter_mut().try_for_each(|b| b.apply(input.clone(), tick)),
            Event::Observed(output) => match output.stage() {
                Some(stage) => buffers[stage.index()].observe(output),
                None => {
                    warn!(target: "mimoverif::pairing", seq = output.seq.0, port = ?output.port, "output on an input port ignored");
                    Ok(())
                }
            },
            Event::Tick(now) => {
                buffers.iter_mut().for_each(|b| b.expire(now));
                Ok(())
            }
            Event::Finish(last) => {
                for b in &mut buffers {
                    b.expire(last + timeout + 1);
                    b.abandon();
                }
                let _ = forward(&mut buffers, outcomes);
                break;
            }
            Event::Cancel => {
                buffers.iter_mut().for_each(PairingBuffer::abandon);
                let _ = forward(&mut buffers, outcomes);
                break;
            }
        };

        if let Err(e) = step {
            error!(target: "mimoverif::session", error = %e, "pairing failed, aborting session");
            abort.store(true, Ordering::Release);
            buffers.iter_mut().for_each(PairingBuffer::abandon);
            let _ = forward(&mut buffers, outcomes);
            error = Some(e);
            break;
        }
        if !forward(&mut buffers, outcomes) {
            break;
        }
    }

    PairingSummary {
        stats: buffers.each_ref().map(PairingBuffer::stats),
        error,
    }
}

/// Sends every ready outcome downstream. Returns false once no worker listens.
fn forward(buffers: &mut [PairingBuffer; 3], outcomes: &SyncSender<PairOutcome>) -> bool {
    for buffer in buffers.iter_mut() {
        while let Some(outcome) = buffer.pop_ready() {
            if outcomes.send(outcome).is_err() {
                return false;
            }
        }
    }
    true
}

/// Scoring worker body.
fn score_outcomes(
    outcomes: &Mutex<Receiver<PairOutcome>>,
    checker: &Checker,
    scoreboard: &Mutex<Scoreboard>,
    coverage: &Mutex<CoverageModel>,
) {
    loop {
        let next = outcomes.lock().recv();
        let Ok(outcome) = next else {
            break;
        };
        let verdict = checker.evaluate(&outcome);

        // Each input yields exactly one encoder outcome, so sample coverage there.
        if outcome.stage() == Stage::Encoder {
            if let Some(sample) = Sample::from_transaction(outcome.input()) {
                let _ = coverage.lock().record(outcome.seq(), &sample);
            }
        }
        if !scoreboard.lock().record(verdict) {
            debug!(target: "mimoverif::session", seq = outcome.seq().0, stage = %outcome.stage(), "duplicate verdict ignored");
        }
    }
}
