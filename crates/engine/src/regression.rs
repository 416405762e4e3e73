//! Multi-session regressions with merged coverage.

use serde::Serialize;
use tracing::info;

use crate::common::error::Result;
use crate::config::SessionConfig;
use crate::coverage::{CoverageModel, CoverageSpace, CoverageSummary};
use crate::dut::{DeviceUnderTest, SoftwareDut};
use crate::report::SessionReport;
use crate::session::{CancelToken, Session, SessionStatus};

/// Outcome of a regression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionReport {
    /// Reports of the sessions, in run order.
    pub sessions: Vec<SessionReport>,
    /// Coverage of every session merged over the full declared space.
    pub coverage: CoverageSummary,
    /// Whether every session passed.
    pub passed: bool,
}

impl RegressionReport {
    /// Sessions that did not pass.
    pub fn failed_sessions(&self) -> impl Iterator<Item = &SessionReport> {
        self.sessions.iter().filter(|s| s.status != SessionStatus::Passed)
    }
}

/// Ordered list of sessions run back to back.
#[derive(Debug, Default)]
pub struct Regression {
    configs: Vec<SessionConfig>,
    cancel: CancelToken,
}

impl Regression {
    /// Creates an empty regression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a session.
    #[must_use]
    pub fn with_session(mut self, config: SessionConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Token shared by every session of the regression.
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether no session was added.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Runs every session against a fresh [`SoftwareDut`].
    ///
    /// # Errors
    ///
    /// Fails on the first invalid session configuration, before any session runs.
    pub fn run(&self) -> Result<RegressionReport> {
        self.run_with(|_| Box::new(SoftwareDut::new()))
    }

    /// Runs every session against the DUT built by `make_dut` for it.
    ///
    /// Sessions after a cancellation are not started.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid session configuration, before any session runs.
    pub fn run_with<F>(&self, mut make_dut: F) -> Result<RegressionReport>
    where
        F: FnMut(&SessionConfig) -> Box<dyn DeviceUnderTest>,
    {
        let sessions = self
            .configs
            .iter()
            .map(|c| Session::new(c.clone()).map(|s| s.with_cancel_token(self.cancel.clone())))
            .collect::<Result<Vec<_>>>()?;

        let mut merged = CoverageModel::new(CoverageSpace::full());
        let mut reports = Vec::with_capacity(sessions.len());
        for (config, session) in self.configs.iter().zip(&sessions) {
            if self.cancel.is_cancelled() {
                break;
            }
            let mut dut = make_dut(config);
            let (report, coverage) = session.run_with_coverage(dut.as_mut())?;
            merged.merge(&coverage);
            reports.push(report);
        }

        let passed = reports.len() == self.configs.len() && reports.iter().all(SessionReport::passed);
        let summary = merged.summary();
        info!(
            target: "mimoverif::session",
            sessions = reports.len(),
            passed,
            coverage = summary.overall_percent,
            "regression finished"
        );
        Ok(RegressionReport {
            sessions: reports,
            coverage: summary,
            passed,
        })
    }
}
