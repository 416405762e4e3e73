//! Structured session report and its plain-text rendering.
//!
//! [`SessionReport`] is the engine's only output surface. It serialises with
//! serde for external renderers; [`SessionReport::render`] produces the
//! sectioned text view used by the command line.

use std::fmt::{self, Write};

use serde::Serialize;

use crate::config::Configuration;
use crate::coverage::CoverageSummary;
use crate::pairing::PairingStats;
use crate::scoreboard::{Tally, Verdict};
use crate::session::SessionStatus;
use crate::transaction::Stage;

/// Failing verdicts listed before the text view elides the rest.
const MAX_LISTED: usize = 20;

const RULE: &str = "==========================================================";
const SEPARATOR: &str = "----------------------------------------------------------";

/// Per-stage verdict and pairing counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageBreakdown {
    /// Stage.
    pub stage: Stage,
    /// Verdict counts of the stage.
    pub tally: Tally,
    /// Pairing buffer counters of the stage.
    pub pairing: PairingStats,
}

/// Final report of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    /// Session outcome.
    pub status: SessionStatus,
    /// Generator seed.
    pub seed: u64,
    /// Configuration under test.
    pub configuration: Configuration,
    /// Driver ticks elapsed.
    pub ticks: u64,
    /// Stimuli applied to the DUT.
    pub transactions_applied: u64,
    /// Verdict counts over every stage.
    pub tally: Tally,
    /// Final agreement rate in percent.
    pub agreement_rate: f64,
    /// Agreement rate required to pass.
    pub agreement_threshold: f64,
    /// Coverage snapshot.
    pub coverage: CoverageSummary,
    /// Coverage goal in percent.
    pub coverage_target: f64,
    /// Whether overall coverage reached the goal.
    pub coverage_goal_met: bool,
    /// Breakdown by stage.
    pub stages: Vec<StageBreakdown>,
    /// Verdicts that count against the session, by stage then sequence.
    pub failures: Vec<Verdict>,
    /// Verdicts carrying a numeric annotation.
    pub annotated: Vec<Verdict>,
    /// Error that ended the session early.
    pub error: Option<String>,
}

impl SessionReport {
    /// Whether the session passed.
    pub fn passed(&self) -> bool {
        self.status == SessionStatus::Passed
    }

    /// Renders the requested sections as text.
    ///
    /// Known sections are `summary`, `verdicts`, `coverage`, and `failures`; an
    /// empty list renders all of them.
    pub fn render(&self, sections: &[String]) -> String {
        let mut out = String::new();
        let _ = self.write_sections(&mut out, sections);
        out
    }

    /// Prints the requested sections to stdout.
    pub fn print_sections(&self, sections: &[String]) {
        print!("{}", self.render(sections));
    }

    fn write_sections(&self, out: &mut String, sections: &[String]) -> fmt::Result {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let tally = &self.tally;

        if want("summary") {
            writeln!(out, "\n{RULE}")?;
            writeln!(out, "MIMO VERIFICATION SESSION REPORT")?;
            writeln!(out, "{RULE}")?;
            writeln!(out, "status                   {}", self.status.label())?;
            writeln!(out, "config                   {}", self.configuration)?;
            writeln!(out, "seed                     {}", self.seed)?;
            writeln!(out, "ticks                    {}", self.ticks)?;
            writeln!(out, "txn.applied              {}", self.transactions_applied)?;
            writeln!(out, "verdicts.total           {}", tally.total())?;
            writeln!(out, "verdicts.pass            {}", tally.pass)?;
            writeln!(out, "verdicts.fail            {}", tally.fail)?;
            writeln!(out, "verdicts.dropped         {}", tally.dropped)?;
            writeln!(
                out,
                "agreement                {:.3}% (threshold {:.3}%)",
                self.agreement_rate, self.agreement_threshold
            )?;
            writeln!(
                out,
                "coverage                 {:.2}% (target {:.2}%{})",
                self.coverage.overall_percent,
                self.coverage_target,
                if self.coverage_goal_met { "" } else { ", not met" }
            )?;
            if let Some(e) = &self.error {
                writeln!(out, "error                    {e}")?;
            }
            writeln!(out, "{SEPARATOR}")?;
        }
        if want("verdicts") {
            writeln!(out, "VERDICT BREAKDOWN")?;
            writeln!(
                out,
                "  {:<10} {:>6} {:>6} {:>8} {:>9} {:>7} {:>9} {:>7}",
                "stage", "pass", "fail", "dropped", "waived", "model", "abandoned", "strays"
            )?;
            for s in &self.stages {
                writeln!(
                    out,
                    "  {:<10} {:>6} {:>6} {:>8} {:>9} {:>7} {:>9} {:>7}",
                    s.stage,
                    s.tally.pass,
                    s.tally.fail,
                    s.tally.dropped,
                    s.tally.expected_drops,
                    s.tally.model_errors,
                    s.tally.abandoned,
                    s.pairing.strays
                )?;
            }
            writeln!(out, "  annotated              {}", tally.annotated)?;
            writeln!(out, "{SEPARATOR}")?;
        }
        if want("coverage") {
            writeln!(out, "COVERAGE")?;
            for c in &self.coverage.categories {
                writeln!(out, "  {:<36} {:>4}/{:<4} ({:.2}%)", c.name, c.hit, c.total, c.percent)?;
            }
            writeln!(out, "CORNER CASES")?;
            for c in &self.coverage.corner_cases {
                let mark = if c.hits > 0 { "hit" } else { "MISSED" };
                writeln!(out, "  {:<36} {:>6} {mark}", c.scenario.to_string(), c.hits)?;
            }
            if !self.coverage.uncovered.is_empty() {
                writeln!(out, "UNCOVERED BINS ({})", self.coverage.uncovered.len())?;
                for key in self.coverage.uncovered.iter().take(MAX_LISTED) {
                    writeln!(out, "  {key}")?;
                }
                elided(out, self.coverage.uncovered.len())?;
            }
            writeln!(out, "{SEPARATOR}")?;
        }
        if want("failures") && !self.failures.is_empty() {
            writeln!(out, "FAILURES ({})", self.failures.len())?;
            for v in self.failures.iter().take(MAX_LISTED) {
                writeln!(out, "  {v}")?;
            }
            elided(out, self.failures.len())?;
            writeln!(out, "{SEPARATOR}")?;
        }
        Ok(())
    }
}

fn elided(out: &mut String, total: usize) -> fmt::Result {
    if total > MAX_LISTED {
        writeln!(out, "  ... {} more", total - MAX_LISTED)?;
    }
    Ok(())
}
