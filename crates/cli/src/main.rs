//! MIMO verification engine CLI.
//!
//! This binary drives the engine against the built-in software DUT model. It provides:
//! 1. **Run:** One session from a JSON config (or the defaults), with optional seed,
//!    transaction-count, and fault overrides.
//! 2. **Regress:** Several sessions back to back with merged coverage.
//! 3. **Defaults:** Print the default session config as JSON, as a starting point
//!    for writing one.
//!
//! Exit code 0 means every session passed, 1 means a session failed, and 2 means
//! the configuration could not be loaded or was rejected.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mimoverif_core::config::SessionConfig;
use mimoverif_core::dut::{DutFaults, SoftwareDut};
use mimoverif_core::regression::{Regression, RegressionReport};
use mimoverif_core::report::SessionReport;
use mimoverif_core::session::Session;
use mimoverif_core::transaction::Stage;
use mimoverif_core::{Result, VerifyError};

#[derive(Parser, Debug)]
#[command(
    name = "mimoverif",
    author,
    version,
    about = "MIMO encoder/decoder/channel-estimator verification engine",
    long_about = "Generate constrained-random MIMO stimuli, drive them through a device under test, \
and score every output against the reference model.\n\nExamples:\n  mimoverif run --config cfg/4x4_qpsk.json --seed 42\n  \
mimoverif run --sections summary --sections failures --drop 57\n  mimoverif regress --config a.json --config b.json\n  \
mimoverif defaults > session.json"
)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one verification session against the software DUT.
    Run {
        /// Session config (JSON). Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the stimulus seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of transactions.
        #[arg(short = 'n', long)]
        transactions: Option<usize>,

        /// Print the report as JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Report sections to print (summary, verdicts, coverage, failures). All when omitted.
        #[arg(long)]
        sections: Vec<String>,

        /// Make the DUT drop every output of this sequence number. Repeatable.
        #[arg(long = "drop", value_name = "SEQ")]
        drops: Vec<u64>,

        /// Restrict `--drop` to one stage (encoder, decoder, estimator).
        #[arg(long, value_parser = parse_stage)]
        drop_stage: Option<Stage>,

        /// Waive a missing output for this sequence number. Repeatable.
        #[arg(long = "expect-drop", value_name = "SEQ")]
        expected_drops: Vec<u64>,

        /// Real offset added to every DUT output sample.
        #[arg(long, default_value_t = 0.0)]
        perturb: f64,
    },

    /// Run several sessions and merge their coverage.
    Regress {
        /// Session configs (JSON), run in the given order.
        #[arg(short, long, required = true)]
        config: Vec<PathBuf>,

        /// Print the report as JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Report sections to print for each session. All when omitted.
        #[arg(long)]
        sections: Vec<String>,
    },

    /// Print the default session config as JSON.
    Defaults,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Commands::Run {
            config,
            seed,
            transactions,
            json,
            sections,
            drops,
            drop_stage,
            expected_drops,
            perturb,
        } => {
            let faults = DutFaults {
                dropped: drops.into_iter().collect(),
                dropped_stage: drop_stage,
                perturbation: perturb,
                ..DutFaults::default()
            };
            load(config.as_ref())
                .map(|mut c| {
                    if let Some(seed) = seed {
                        c.options.seed = seed;
                    }
                    if let Some(n) = transactions {
                        c.options.transaction_count = n;
                    }
                    c.options.expected_drops.extend(expected_drops);
                    c
                })
                .and_then(|c| cmd_run(c, faults, json, &sections))
        }
        Commands::Regress {
            config,
            json,
            sections,
        } => cmd_regress(&config, json, &sections),
        Commands::Defaults => cmd_defaults(),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "verification did not complete");
            eprintln!("error: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Installs the fmt subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<&PathBuf>) -> Result<SessionConfig> {
    match path {
        Some(p) => {
            info!(path = %p.display(), "loading session config");
            SessionConfig::load(p)
        }
        None => Ok(SessionConfig::default()),
    }
}

/// Runs one session and prints its report.
///
/// # Arguments
///
/// * `config` - Session config with CLI overrides applied.
/// * `faults` - Faults the software DUT should exhibit.
/// * `json` - Print JSON instead of text sections.
/// * `sections` - Text sections to print; all when empty.
///
/// Returns whether the session passed.
fn cmd_run(config: SessionConfig, faults: DutFaults, json: bool, sections: &[String]) -> Result<bool> {
    let session = Session::new(config)?;
    let mut dut = SoftwareDut::with_faults(faults);
    let report = session.run(&mut dut)?;
    emit(&report, json, sections)?;
    Ok(report.passed())
}

/// Runs every config as one regression and prints the merged report.
fn cmd_regress(paths: &[PathBuf], json: bool, sections: &[String]) -> Result<bool> {
    let regression = paths
        .iter()
        .try_fold(Regression::new(), |r, p| load(Some(p)).map(|c| r.with_session(c)))?;
    let report = regression.run()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_regression(&report, sections);
    }
    Ok(report.passed)
}

fn cmd_defaults() -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(&SessionConfig::default())?);
    Ok(true)
}

fn emit(report: &SessionReport, json: bool, sections: &[String]) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        report.print_sections(sections);
    }
    Ok(())
}

fn print_regression(report: &RegressionReport, sections: &[String]) {
    for session in &report.sessions {
        session.print_sections(sections);
    }
    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("REGRESSION SUMMARY");
    println!("{rule}");
    println!("sessions                 {}", report.sessions.len());
    println!("sessions.failed          {}", report.failed_sessions().count());
    println!("coverage.merged          {:.2}%", report.coverage.overall_percent);
    println!("coverage.samples         {}", report.coverage.samples);
    println!("corner_cases.all_hit     {}", report.coverage.all_corner_cases_hit);
    println!("result                   {}", if report.passed { "PASS" } else { "FAIL" });
    println!("{}", "-".repeat(60));
}

fn exit_code(e: &VerifyError) -> u8 {
    match e {
        VerifyError::ConfigurationInvalid(_) | VerifyError::Io(_) | VerifyError::Json(_) => 2,
        _ => 1,
    }
}

fn parse_stage(s: &str) -> std::result::Result<Stage, String> {
    Stage::ALL
        .into_iter()
        .find(|st| st.label().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown stage '{s}' (expected encoder, decoder, or estimator)"))
}
