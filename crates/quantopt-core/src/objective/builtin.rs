//! Built-in benchmark objectives.
//!
//! The classic test functions treat every parameter as one coordinate, in
//! name order. `QubitPulse` is a small physics example with fixed names.

use std::f64::consts::{E, PI};
use std::ops::{Add, Mul};

use anyhow::bail;
use async_trait::async_trait;

use super::Objective;
use crate::models::Parameters;

fn coordinates(params: &Parameters) -> Vec<f64> {
    params.values().copied().collect()
}

/// Sum of squares. Minimum 0 at the origin.
pub struct Sphere;

#[async_trait]
impl Objective for Sphere {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64> {
        Ok(params.values().map(|x| x * x).sum())
    }
}

/// Minimum 0 at (1, ..., 1).
pub struct Rosenbrock;

#[async_trait]
impl Objective for Rosenbrock {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64> {
        let x = coordinates(params);
        Ok(x.windows(2)
            .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
            .sum())
    }
}

/// Highly multimodal. Minimum 0 at the origin.
pub struct Rastrigin;

#[async_trait]
impl Objective for Rastrigin {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64> {
        let x = coordinates(params);
        let n = x.len() as f64;
        Ok(10.0 * n
            + x.iter()
                .map(|xi| xi * xi - 10.0 * (2.0 * PI * xi).cos())
                .sum::<f64>())
    }
}

/// Minimum 0 at the origin.
pub struct Ackley;

#[async_trait]
impl Objective for Ackley {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64> {
        let x = coordinates(params);
        if x.is_empty() {
            return Ok(0.0);
        }
        let n = x.len() as f64;
        let square_mean = x.iter().map(|xi| xi * xi).sum::<f64>() / n;
        let cos_mean = x.iter().map(|xi| (2.0 * PI * xi).cos()).sum::<f64>() / n;
        Ok(-20.0 * (-0.2 * square_mean.sqrt()).exp() - cos_mean.exp() + 20.0 + E)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    const ZERO: Complex = Complex { re: 0.0, im: 0.0 };

    fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Multiply by -i.
    fn times_minus_i(self) -> Self {
        Self::new(self.im, -self.re)
    }

    fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }
}

impl Add for Complex {
    type Output = Complex;

    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Mul<f64> for Complex {
    type Output = Complex;

    fn mul(self, rhs: f64) -> Complex {
        Complex::new(self.re * rhs, self.im * rhs)
    }
}

type State = [Complex; 2];

/// Negative fidelity of a driven two-level system with the |+> state.
///
/// H(t) = w/2 sz + A sin(2 pi f t + phi) sx, starting in |0>, with the pulse
/// sampled on a fixed grid and held constant between samples.
pub struct QubitPulse {
    qubit_frequency: f64,
    samples: usize,
    substeps: usize,
}

impl Default for QubitPulse {
    fn default() -> Self {
        Self {
            qubit_frequency: 1.0,
            samples: 100,
            substeps: 20,
        }
    }
}

impl QubitPulse {
    const NAMES: [&'static str; 4] = ["amplitude", "duration", "frequency", "phase"];

    fn derivative(&self, state: &State, drive: f64) -> State {
        let half = 0.5 * self.qubit_frequency;
        // H psi, then multiply by -i.
        let h0 = state[0] * half + state[1] * drive;
        let h1 = state[0] * drive + state[1] * (-half);
        [h0.times_minus_i(), h1.times_minus_i()]
    }

    fn rk4_step(&self, state: &State, drive: f64, dt: f64) -> State {
        let shift = |s: &State, k: &State, h: f64| [s[0] + k[0] * h, s[1] + k[1] * h];
        let k1 = self.derivative(state, drive);
        let k2 = self.derivative(&shift(state, &k1, dt / 2.0), drive);
        let k3 = self.derivative(&shift(state, &k2, dt / 2.0), drive);
        let k4 = self.derivative(&shift(state, &k3, dt), drive);
        let mut next = [Complex::ZERO; 2];
        for i in 0..2 {
            next[i] = state[i] + (k1[i] + k2[i] * 2.0 + k3[i] * 2.0 + k4[i]) * (dt / 6.0);
        }
        next
    }

    pub fn fidelity(&self, amplitude: f64, frequency: f64, duration: f64, phase: f64) -> f64 {
        let intervals = self.samples.saturating_sub(1).max(1);
        let grid_step = duration / intervals as f64;
        let dt = grid_step / self.substeps as f64;
        let mut state: State = [Complex::new(1.0, 0.0), Complex::ZERO];
        for sample in 0..intervals {
            let t = sample as f64 * grid_step;
            let drive = amplitude * (2.0 * PI * frequency * t + phase).sin();
            for _ in 0..self.substeps {
                state = self.rk4_step(&state, drive, dt);
            }
        }
        // |<+|psi>|^2 with |+> = (|0> + |1>)/sqrt(2)
        (state[0] + state[1]).norm_sqr() / 2.0
    }
}

#[async_trait]
impl Objective for QubitPulse {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64> {
        let get = |name: &str, default: f64| params.get(name).copied().unwrap_or(default);
        let duration = get("duration", 1.0);
        if duration <= 0.0 {
            bail!("duration must be positive, got {duration}");
        }
        let fidelity = self.fidelity(
            get("amplitude", 1.0),
            get("frequency", 1.0),
            duration,
            get("phase", 0.0),
        );
        Ok(-fidelity)
    }

    fn parameter_names(&self) -> Option<Vec<String>> {
        Some(Self::NAMES.iter().map(|s| s.to_string()).collect())
    }
}
