//! Optimizer strategies.
//!
//! Strategies search the unit cube of a [`ParameterSpace`]; the task maps
//! candidates back to named parameters. Each strategy keeps its own state
//! across pause/resume since the task holds on to the same instance.

mod cma;
mod linalg;
mod one_plus_one;

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

pub use cma::Cma;
pub use one_plus_one::OnePlusOne;

use crate::models::{Algorithm, OptimizerConfig, ParameterSpace};

/// A point proposed by an optimizer, in unit-cube coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub point: Vec<f64>,
    /// Strategy-specific bookkeeping (CMA generation).
    pub generation: u64,
}

impl Candidate {
    pub fn new(point: Vec<f64>, generation: u64) -> Self {
        Self { point, generation }
    }
}

/// Ask/tell interface shared by all strategies.
pub trait Optimizer: Send {
    /// Propose `n` candidates. Every coordinate is within `[0, 1]`.
    fn propose(&mut self, n: usize) -> Vec<Candidate>;

    /// Report the score of a previously proposed candidate.
    fn tell(&mut self, candidate: &Candidate, score: f64);

    fn algorithm(&self) -> Algorithm;
}

/// Build the strategy selected in `config` for `space`.
pub fn build(config: &OptimizerConfig, space: &ParameterSpace) -> Box<dyn Optimizer> {
    let seed = config.seed.unwrap_or_else(rand::random::<u64>);
    let rng = StdRng::seed_from_u64(seed);
    let start = space.initial_point();
    match config.algorithm {
        Algorithm::OnePlusOne => Box::new(OnePlusOne::new(start, rng)),
        Algorithm::Cma => Box::new(Cma::new(start, rng)),
    }
}

/// Standard normal sample via Box-Muller.
pub(crate) fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

pub(crate) fn clip_unit(point: &mut [f64]) {
    for x in point.iter_mut() {
        *x = x.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
pub(crate) fn sphere_around(point: &[f64], center: f64) -> f64 {
    point.iter().map(|x| (x - center).powi(2)).sum()
}
