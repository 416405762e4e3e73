//! Scenario selection and realisation.
//!
//! Corner cases are picked by prioritized sampling: the configured corner-case
//! weight is split across the corner scenarios the configuration can express,
//! in proportion to their priority, and the rest goes to nominal traffic.

use num_complex::Complex64;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand_distr::StandardNormal;

use crate::common::matrix::CMatrix;
use crate::config::{Configuration, NoiseClass};
use crate::transaction::{ErrorInjection, ScenarioKind, Stage, Stimulus};

/// Perturbation separating the two nearly collinear channel columns (or rows).
const ILL_CONDITIONED_EPSILON: f64 = 1e-3;

/// Relative selection priority among corner cases.
const fn priority(kind: ScenarioKind) -> f64 {
    match kind {
        ScenarioKind::SingularChannel => 4.0,
        ScenarioKind::IllConditionedChannel => 3.0,
        ScenarioKind::MaxStreams => 2.0,
        ScenarioKind::ExtremeNoise => 1.0,
        ScenarioKind::Nominal | ScenarioKind::MaxAntennas | ScenarioKind::Streams(_) => 0.0,
    }
}

/// Returns true when `kind` can be realised under `config`.
pub fn is_feasible(kind: ScenarioKind, config: &Configuration) -> bool {
    match kind {
        ScenarioKind::IllConditionedChannel => config.stream_limit() >= 2,
        ScenarioKind::MaxAntennas => config.uses_max_antennas(),
        ScenarioKind::Streams(n) => (1..=config.num_data_streams).contains(&n),
        _ => true,
    }
}

/// Weighted choice between nominal traffic and feasible corner cases.
#[derive(Debug, Clone)]
pub struct ScenarioWeights {
    kinds: Vec<ScenarioKind>,
    weights: Vec<f64>,
    index: Option<WeightedIndex<f64>>,
}

impl ScenarioWeights {
    /// Splits `corner_weight` across the corner cases feasible for `config`.
    pub fn new(config: &Configuration, corner_weight: f64) -> Self {
        let corners: Vec<ScenarioKind> = ScenarioKind::CORNER_CASES
            .into_iter()
            .filter(|k| is_feasible(*k, config))
            .collect();
        let total: f64 = corners.iter().map(|k| priority(*k)).sum();

        let mut kinds = vec![ScenarioKind::Nominal];
        let mut weights = vec![1.0 - corner_weight];
        for k in corners {
            kinds.push(k);
            weights.push(corner_weight * priority(k) / total);
        }
        let index = WeightedIndex::new(&weights).ok();
        Self { kinds, weights, index }
    }

    /// Probability assigned to `kind`.
    pub fn probability(&self, kind: ScenarioKind) -> f64 {
        if self.index.is_none() {
            return f64::from(u8::from(kind == ScenarioKind::Nominal));
        }
        let total: f64 = self.weights.iter().sum();
        self.kinds
            .iter()
            .zip(&self.weights)
            .find(|(k, _)| **k == kind)
            .map_or(0.0, |(_, w)| w / total)
    }

    /// Draws one scenario.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ScenarioKind {
        self.index
            .as_ref()
            .map_or(ScenarioKind::Nominal, |index| self.kinds[index.sample(rng)])
    }
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R, variance: f64) -> Complex64 {
    if variance == 0.0 {
        return Complex64::new(0.0, 0.0);
    }
    let sigma = (variance / 2.0).sqrt();
    let re: f64 = StandardNormal.sample(rng);
    let im: f64 = StandardNormal.sample(rng);
    Complex64::new(re * sigma, im * sigma)
}

fn rayleigh<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> CMatrix {
    CMatrix::from_fn(rows, cols, |_, _| gaussian(rng, 1.0))
}

fn noise<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize, class: NoiseClass) -> CMatrix {
    let variance = class.noise_variance();
    CMatrix::from_fn(rows, cols, |_, _| gaussian(rng, variance))
}

/// Channel matrix for a scenario.
fn channel<R: Rng + ?Sized>(rng: &mut R, kind: ScenarioKind, config: &Configuration) -> CMatrix {
    let (rx, tx) = (config.rx_antennas, config.tx_antennas);
    match kind {
        ScenarioKind::SingularChannel if rx.min(tx) == 1 => CMatrix::zeros(rx, tx),
        ScenarioKind::SingularChannel => {
            let u: Vec<Complex64> = (0..rx).map(|_| gaussian(rng, 1.0)).collect();
            let v: Vec<Complex64> = (0..tx).map(|_| gaussian(rng, 1.0)).collect();
            CMatrix::from_fn(rx, tx, |r, c| u[r] * v[c].conj())
        }
        ScenarioKind::IllConditionedChannel => {
            let mut h = rayleigh(rng, rx, tx);
            if rx >= tx {
                for r in 0..rx {
                    let z = h.get(r, 0) + gaussian(rng, 1.0) * ILL_CONDITIONED_EPSILON;
                    h.set(r, tx - 1, z);
                }
            } else {
                for c in 0..tx {
                    let z = h.get(0, c) + gaussian(rng, 1.0) * ILL_CONDITIONED_EPSILON;
                    h.set(rx - 1, c, z);
                }
            }
            h
        }
        _ => rayleigh(rng, rx, tx),
    }
}

/// Draws a complete stimulus for `kind`.
///
/// Returns `None` when the scenario cannot be expressed under `config`; the
/// caller resamples.
pub fn realize<R: Rng + ?Sized>(
    rng: &mut R,
    kind: ScenarioKind,
    config: &Configuration,
    injection_rate: f64,
) -> Option<Stimulus> {
    if !is_feasible(kind, config) {
        return None;
    }
    let max = config.num_data_streams;
    let active_streams = match kind {
        ScenarioKind::MaxStreams | ScenarioKind::SingularChannel => max,
        ScenarioKind::Streams(n) => n,
        _ => rng.gen_range(1..=max),
    };
    let noise_class = match kind {
        ScenarioKind::ExtremeNoise => NoiseClass::Extreme,
        _ => config.noise_level_class,
    };

    let order = config.modulation_scheme.order() as u16;
    let symbols = (0..active_streams)
        .map(|_| (0..config.symbol_width).map(|_| rng.gen_range(0..order)).collect())
        .collect();
    let channel = channel(rng, kind, config);
    let rx = config.rx_antennas;
    let noise_m = noise(rng, rx, config.symbol_width, noise_class);
    let pilot_noise = noise(rng, rx, config.pilot_pattern.slots(config.tx_antennas), noise_class);

    let injection = (config.error_injection_enabled && rng.gen_bool(injection_rate))
        .then(|| ErrorInjection::DropOutput(Stage::ALL[rng.gen_range(0..Stage::ALL.len())]));

    Some(Stimulus {
        scenario: kind,
        active_streams,
        noise_class,
        symbols,
        channel,
        noise: noise_m,
        pilot_noise,
        injection,
    })
}
