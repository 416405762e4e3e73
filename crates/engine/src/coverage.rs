//! Functional coverage model.
//!
//! Bins are enumerated once, when the model is built, from a `CoverageSpace`:
//! 1. **Dimensions:** One bin per legal value of each declared dimension
//!    (MIMO mode, streams, modulation, detection, pilots, noise, channel
//!    condition, error injection). A dimension the space leaves undeclared is
//!    not sampled.
//! 2. **Crosses:** One bin per legal combination of the dimensions in each
//!    declared cross. Combinations the pipeline cannot produce (more streams
//!    than antennas, an ill-conditioned single-antenna channel) are never
//!    enumerated.
//! 3. **Corner cases:** Tracked separately, so a session can report whether
//!    every required corner case was exercised independent of the percentage.
//!
//! Bins are stored in a flat map from a canonical key such as
//! `antennas=4x4,streams=2` to a hit counter. Samples are deduplicated by
//! sequence number, so replaying a transaction never increases a count.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::{trace, warn};

use crate::common::error::VerifyError;
use crate::common::matrix::ChannelCondition;
use crate::config::{
    Configuration, DetectionAlgorithm, MAX_ANTENNAS, Modulation, NoiseClass, PilotPattern, VALID_ANTENNA_COUNTS,
};
use crate::stimulus::is_feasible;
use crate::transaction::{ErrorInjection, ScenarioKind, SeqNum, Stage, Stimulus, Transaction};

/// Coverage dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// MIMO mode, `tx x rx`.
    Antennas,
    /// Active spatial streams.
    Streams,
    /// Constellation.
    Modulation,
    /// Detector.
    Detection,
    /// Pilot pattern.
    Pilot,
    /// Noise class the stimulus was drawn with.
    Noise,
    /// Measured conditioning of the channel.
    ChannelCondition,
    /// Deliberate fault requested by the stimulus.
    Injection,
}

impl Dimension {
    /// Every dimension, in key order.
    pub const ALL: [Self; 8] = [
        Self::Antennas,
        Self::Streams,
        Self::Modulation,
        Self::Detection,
        Self::Pilot,
        Self::Noise,
        Self::ChannelCondition,
        Self::Injection,
    ];

    /// Name used in bin keys.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Antennas => "antennas",
            Self::Streams => "streams",
            Self::Modulation => "modulation",
            Self::Detection => "detection",
            Self::Pilot => "pilot",
            Self::Noise => "noise",
            Self::ChannelCondition => "channel_condition",
            Self::Injection => "injection",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Value of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinValue {
    /// Antenna pair.
    Antennas {
        /// Transmit antennas.
        tx: usize,
        /// Receive antennas.
        rx: usize,
    },
    /// Active streams.
    Streams(usize),
    /// Constellation.
    Modulation(Modulation),
    /// Detector.
    Detection(DetectionAlgorithm),
    /// Pilot pattern.
    Pilot(PilotPattern),
    /// Noise class.
    Noise(NoiseClass),
    /// Channel conditioning.
    Condition(ChannelCondition),
    /// Stage whose output the stimulus asks to drop, `None` for no injection.
    Injection(Option<Stage>),
}

impl BinValue {
    /// Dimension this value belongs to.
    pub const fn dimension(self) -> Dimension {
        match self {
            Self::Antennas { .. } => Dimension::Antennas,
            Self::Streams(_) => Dimension::Streams,
            Self::Modulation(_) => Dimension::Modulation,
            Self::Detection(_) => Dimension::Detection,
            Self::Pilot(_) => Dimension::Pilot,
            Self::Noise(_) => Dimension::Noise,
            Self::Condition(_) => Dimension::ChannelCondition,
            Self::Injection(_) => Dimension::Injection,
        }
    }
}

impl fmt::Display for BinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Antennas { tx, rx } => write!(f, "{tx}x{rx}"),
            Self::Streams(n) => write!(f, "{n}"),
            Self::Modulation(m) => f.write_str(m.label()),
            Self::Detection(d) => f.write_str(d.label()),
            Self::Pilot(p) => f.write_str(p.label()),
            Self::Noise(n) => f.write_str(n.label()),
            Self::Condition(c) => f.write_str(c.label()),
            Self::Injection(None) => f.write_str("none"),
            Self::Injection(Some(stage)) => write!(f, "drop_{}", stage.label()),
        }
    }
}

/// Canonical key of one bin.
pub type BinKey = String;

fn key(values: &[BinValue]) -> BinKey {
    values
        .iter()
        .map(|v| format!("{}={v}", v.dimension().name()))
        .collect::<Vec<_>>()
        .join(",")
}

fn category(dims: &[Dimension]) -> String {
    dims.iter().map(|d| d.name()).collect::<Vec<_>>().join(" x ")
}

/// Returns false for value combinations the pipeline can never produce.
fn is_legal(values: &[BinValue]) -> bool {
    let antennas = values.iter().find_map(|v| match v {
        BinValue::Antennas { tx, rx } => Some((*tx).min(*rx)),
        _ => None,
    });
    let Some(limit) = antennas else {
        return true;
    };
    values.iter().all(|v| match v {
        BinValue::Streams(n) => *n <= limit,
        BinValue::Condition(ChannelCondition::IllConditioned) => limit >= 2,
        _ => true,
    })
}

/// Attributes of one stimulus, one value per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    values: [BinValue; 8],
    stream_limit: usize,
    max_antennas: bool,
}

impl Sample {
    /// Extracts the sample of a stimulus, measuring the channel's conditioning.
    pub fn from_stimulus(config: &Configuration, stimulus: &Stimulus) -> Self {
        let condition = ChannelCondition::classify(stimulus.channel.condition_number());
        Self {
            values: [
                BinValue::Antennas {
                    tx: config.tx_antennas,
                    rx: config.rx_antennas,
                },
                BinValue::Streams(stimulus.active_streams),
                BinValue::Modulation(config.modulation_scheme),
                BinValue::Detection(config.detection_algorithm),
                BinValue::Pilot(config.pilot_pattern),
                BinValue::Noise(stimulus.noise_class),
                BinValue::Condition(condition),
                BinValue::Injection(stimulus.injection.map(|ErrorInjection::DropOutput(stage)| stage)),
            ],
            stream_limit: config.num_data_streams,
            max_antennas: config.uses_max_antennas(),
        }
    }

    /// Extracts the sample of a stimulus transaction.
    pub fn from_transaction(txn: &Transaction) -> Option<Self> {
        txn.as_stimulus().map(|s| Self::from_stimulus(&txn.config, s))
    }

    /// Value of one dimension.
    pub const fn value(&self, dim: Dimension) -> BinValue {
        self.values[dim.index()]
    }

    /// Corner cases this sample exercises.
    pub fn corner_cases(&self) -> Vec<ScenarioKind> {
        let mut out = Vec::new();
        match self.value(Dimension::ChannelCondition) {
            BinValue::Condition(ChannelCondition::Singular) => out.push(ScenarioKind::SingularChannel),
            BinValue::Condition(ChannelCondition::IllConditioned) => out.push(ScenarioKind::IllConditionedChannel),
            _ => {}
        }
        if self.value(Dimension::Streams) == BinValue::Streams(self.stream_limit) {
            out.push(ScenarioKind::MaxStreams);
        }
        if self.value(Dimension::Noise) == BinValue::Noise(NoiseClass::Extreme) {
            out.push(ScenarioKind::ExtremeNoise);
        }
        if self.max_antennas {
            out.push(ScenarioKind::MaxAntennas);
        }
        out
    }
}

/// Declared coverage space: dimension values, crosses, and required corner cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageSpace {
    values: BTreeMap<Dimension, Vec<BinValue>>,
    crosses: Vec<Vec<Dimension>>,
    corner_cases: BTreeSet<ScenarioKind>,
}

impl CoverageSpace {
    /// Crosses declared by the built-in spaces.
    pub fn default_crosses() -> Vec<Vec<Dimension>> {
        vec![
            vec![Dimension::Antennas, Dimension::Streams],
            vec![Dimension::Antennas, Dimension::ChannelCondition],
            vec![Dimension::Modulation, Dimension::Noise],
            vec![Dimension::Detection, Dimension::ChannelCondition],
            vec![Dimension::Antennas, Dimension::Injection],
        ]
    }

    fn injection_values() -> Vec<BinValue> {
        std::iter::once(BinValue::Injection(None))
            .chain(Stage::ALL.into_iter().map(|s| BinValue::Injection(Some(s))))
            .collect()
    }

    /// Space reachable by a session running `config`.
    ///
    /// The injection dimension is declared only when the configuration
    /// enables error injection.
    pub fn for_configuration(config: &Configuration) -> Self {
        let mut noise = vec![BinValue::Noise(config.noise_level_class)];
        if config.noise_level_class != NoiseClass::Extreme {
            noise.push(BinValue::Noise(NoiseClass::Extreme));
        }
        let mut values = BTreeMap::from([
            (
                Dimension::Antennas,
                vec![BinValue::Antennas {
                    tx: config.tx_antennas,
                    rx: config.rx_antennas,
                }],
            ),
            (
                Dimension::Streams,
                (1..=config.num_data_streams).map(BinValue::Streams).collect(),
            ),
            (Dimension::Modulation, vec![BinValue::Modulation(config.modulation_scheme)]),
            (Dimension::Detection, vec![BinValue::Detection(config.detection_algorithm)]),
            (Dimension::Pilot, vec![BinValue::Pilot(config.pilot_pattern)]),
            (Dimension::Noise, noise),
            (
                Dimension::ChannelCondition,
                ChannelCondition::ALL
                    .into_iter()
                    .filter(|c| *c != ChannelCondition::IllConditioned || config.stream_limit() >= 2)
                    .map(BinValue::Condition)
                    .collect(),
            ),
        ]);
        if config.error_injection_enabled {
            let _ = values.insert(Dimension::Injection, Self::injection_values());
        }
        let corner_cases = ScenarioKind::COVERAGE_CORNER_CASES
            .into_iter()
            .filter(|k| is_feasible(*k, config))
            .collect();
        Self {
            values,
            crosses: Self::default_crosses(),
            corner_cases,
        }
    }

    /// Every value of every dimension, for merging regressions.
    pub fn full() -> Self {
        let antennas = VALID_ANTENNA_COUNTS
            .iter()
            .flat_map(|&tx| VALID_ANTENNA_COUNTS.iter().map(move |&rx| BinValue::Antennas { tx, rx }))
            .collect();
        let values = BTreeMap::from([
            (Dimension::Antennas, antennas),
            (Dimension::Streams, (1..=MAX_ANTENNAS).map(BinValue::Streams).collect()),
            (
                Dimension::Modulation,
                Modulation::ALL.into_iter().map(BinValue::Modulation).collect(),
            ),
            (
                Dimension::Detection,
                DetectionAlgorithm::ALL.into_iter().map(BinValue::Detection).collect(),
            ),
            (Dimension::Pilot, PilotPattern::ALL.into_iter().map(BinValue::Pilot).collect()),
            (Dimension::Noise, NoiseClass::ALL.into_iter().map(BinValue::Noise).collect()),
            (
                Dimension::ChannelCondition,
                ChannelCondition::ALL.into_iter().map(BinValue::Condition).collect(),
            ),
            (Dimension::Injection, Self::injection_values()),
        ]);
        Self {
            values,
            crosses: Self::default_crosses(),
            corner_cases: ScenarioKind::COVERAGE_CORNER_CASES.into_iter().collect(),
        }
    }

    /// Replaces the declared crosses.
    #[must_use]
    pub fn with_crosses(mut self, crosses: Vec<Vec<Dimension>>) -> Self {
        self.crosses = crosses;
        self
    }

    /// Declared values of a dimension.
    pub fn values(&self, dim: Dimension) -> &[BinValue] {
        self.values.get(&dim).map(Vec::as_slice).unwrap_or_default()
    }

    /// Required corner cases.
    pub fn corner_cases(&self) -> impl Iterator<Item = ScenarioKind> + '_ {
        self.corner_cases.iter().copied()
    }

    /// Enumerates `(category, key)` for every legal bin.
    fn enumerate(&self) -> Vec<(String, BinKey)> {
        let mut out = Vec::new();
        for dim in Dimension::ALL {
            for v in self.values(dim) {
                out.push((dim.name().to_string(), key(&[*v])));
            }
        }
        for cross in &self.crosses {
            let name = category(cross);
            let mut combos: Vec<Vec<BinValue>> = vec![Vec::new()];
            for dim in cross {
                combos = combos
                    .into_iter()
                    .flat_map(|prefix| {
                        self.values(*dim).iter().map(move |v| {
                            let mut next = prefix.clone();
                            next.push(*v);
                            next
                        })
                    })
                    .filter(|c| is_legal(c))
                    .collect();
            }
            out.extend(combos.into_iter().map(|c| (name.clone(), key(&c))));
        }
        out
    }
}

/// Hit counts of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCoverage {
    /// Dimension or cross name.
    pub name: String,
    /// Bins hit at least once.
    pub hit: usize,
    /// Bins declared.
    pub total: usize,
    /// `hit / total` in percent.
    pub percent: f64,
}

/// Hits of one required corner case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CornerCaseCoverage {
    /// Corner case.
    pub scenario: ScenarioKind,
    /// Transactions that exercised it.
    pub hits: u64,
}

/// Coverage snapshot for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSummary {
    /// Bins hit over bins declared, in percent.
    pub overall_percent: f64,
    /// Per-category breakdown.
    pub categories: Vec<CategoryCoverage>,
    /// Keys of bins never hit.
    pub uncovered: Vec<BinKey>,
    /// Required corner cases and their hits.
    pub corner_cases: Vec<CornerCaseCoverage>,
    /// Whether every required corner case was hit.
    pub all_corner_cases_hit: bool,
    /// Distinct transactions sampled.
    pub samples: u64,
    /// Sample values that matched no declared bin.
    pub undefined_hits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bin {
    category: String,
    hits: u64,
}

/// Hit counters over a coverage space.
#[derive(Debug, Clone)]
pub struct CoverageModel {
    space: CoverageSpace,
    bins: BTreeMap<BinKey, Bin>,
    categories: Vec<String>,
    corner_hits: BTreeMap<ScenarioKind, u64>,
    seen: BTreeSet<SeqNum>,
    samples: u64,
    undefined: u64,
}

impl CoverageModel {
    /// Enumerates every bin of `space` with a zero count.
    pub fn new(space: CoverageSpace) -> Self {
        let mut categories: Vec<String> = Vec::new();
        let mut bins = BTreeMap::new();
        for (cat, k) in space.enumerate() {
            if !categories.contains(&cat) {
                categories.push(cat.clone());
            }
            let _ = bins.insert(k, Bin { category: cat, hits: 0 });
        }
        let corner_hits = space.corner_cases().map(|k| (k, 0)).collect();
        Self {
            space,
            bins,
            categories,
            corner_hits,
            seen: BTreeSet::new(),
            samples: 0,
            undefined: 0,
        }
    }

    /// Model over [`CoverageSpace::for_configuration`].
    pub fn for_configuration(config: &Configuration) -> Self {
        Self::new(CoverageSpace::for_configuration(config))
    }

    /// Declared space.
    pub const fn space(&self) -> &CoverageSpace {
        &self.space
    }

    /// Number of declared bins.
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Hits of one bin, `None` when the key was never declared.
    pub fn hits(&self, key: &str) -> Option<u64> {
        self.bins.get(key).map(|b| b.hits)
    }

    /// Iterates `(key, hits)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.bins.iter().map(|(k, b)| (k.as_str(), b.hits))
    }

    /// Counts a stimulus transaction once. Returns false for replays and
    /// non-stimulus transactions.
    pub fn sample(&mut self, txn: &Transaction) -> bool {
        Sample::from_transaction(txn).is_some_and(|s| self.record(txn.seq, &s))
    }

    /// Counts a precomputed sample once per sequence number.
    pub fn record(&mut self, seq: SeqNum, sample: &Sample) -> bool {
        if !self.seen.insert(seq) {
            return false;
        }
        self.samples += 1;
        for dim in Dimension::ALL {
            if self.space.values(dim).is_empty() {
                continue;
            }
            let v = sample.value(dim);
            if !self.bump(&key(&[v])) {
                self.undefined += 1;
                let err = VerifyError::CoverageBinUndefined {
                    dimension: dim.name().to_string(),
                    value: v.to_string(),
                };
                warn!(target: "mimoverif::coverage", seq = seq.0, error = %err, "sample outside declared bins");
            }
        }
        let crosses: Vec<BinKey> = self
            .space
            .crosses
            .iter()
            .map(|cross| key(&cross.iter().map(|d| sample.value(*d)).collect::<Vec<_>>()))
            .collect();
        for k in crosses {
            let _ = self.bump(&k);
        }
        for corner in sample.corner_cases() {
            if let Some(h) = self.corner_hits.get_mut(&corner) {
                *h += 1;
            }
        }
        true
    }

    fn bump(&mut self, k: &str) -> bool {
        match self.bins.get_mut(k) {
            Some(bin) => {
                bin.hits += 1;
                trace!(target: "mimoverif::coverage", bin = k, hits = bin.hits, "bin hit");
                true
            }
            None => false,
        }
    }

    /// Adds the counts of `other` for bins both models declare.
    ///
    /// Bins only `other` declares are ignored. Sequence numbers are per session,
    /// so merged samples are not deduplicated against each other.
    pub fn merge(&mut self, other: &Self) {
        for (k, b) in &other.bins {
            if let Some(mine) = self.bins.get_mut(k) {
                mine.hits += b.hits;
            }
        }
        for (k, h) in &other.corner_hits {
            if let Some(mine) = self.corner_hits.get_mut(k) {
                *mine += h;
            }
        }
        self.samples += other.samples;
        self.undefined += other.undefined;
    }

    /// Bins hit over bins declared, in percent.
    pub fn percent(&self) -> f64 {
        percent(self.bins.values().filter(|b| b.hits > 0).count(), self.bins.len())
    }

    /// Coverage of one category in percent, `None` when undeclared.
    pub fn category_percent(&self, name: &str) -> Option<f64> {
        let (hit, total) = self.category_counts(name);
        (total > 0).then(|| percent(hit, total))
    }

    fn category_counts(&self, name: &str) -> (usize, usize) {
        self.bins
            .values()
            .filter(|b| b.category == name)
            .fold((0, 0), |(h, t), b| (h + usize::from(b.hits > 0), t + 1))
    }

    /// Whether every required corner case was hit.
    pub fn all_corner_cases_hit(&self) -> bool {
        self.corner_hits.values().all(|h| *h > 0)
    }

    /// Snapshot for reports.
    pub fn summary(&self) -> CoverageSummary {
        let categories = self
            .categories
            .iter()
            .map(|name| {
                let (hit, total) = self.category_counts(name);
                CategoryCoverage {
                    name: name.clone(),
                    hit,
                    total,
                    percent: percent(hit, total),
                }
            })
            .collect();
        CoverageSummary {
            overall_percent: self.percent(),
            categories,
            uncovered: self
                .bins
                .iter()
                .filter(|(_, b)| b.hits == 0)
                .map(|(k, _)| k.clone())
                .collect(),
            corner_cases: self
                .corner_hits
                .iter()
                .map(|(k, h)| CornerCaseCoverage { scenario: *k, hits: *h })
                .collect(),
            all_corner_cases_hit: self.all_corner_cases_hit(),
            samples: self.samples,
            undefined_hits: self.undefined,
        }
    }
}

fn percent(hit: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        100.0 * hit as f64 / total as f64
    }
}
