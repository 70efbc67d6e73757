//! (mu/mu_w, lambda)-CMA-ES.
//!
//! Candidates carry the generation they were sampled from. A generation is
//! closed once `lambda` of its candidates have been scored; scores arriving
//! for an older generation are dropped.

use rand::rngs::StdRng;

use super::linalg::{Matrix, identity, mat_t_vec, mat_vec, norm, symmetric_eigen};
use super::{Candidate, Optimizer, clip_unit, gaussian};
use crate::models::Algorithm;

const INITIAL_SIGMA: f64 = 0.3;
const MIN_SIGMA: f64 = 1e-12;
const MAX_SIGMA: f64 = 1.0;
const MIN_EIGENVALUE: f64 = 1e-20;

struct Strategy {
    lambda: usize,
    weights: Vec<f64>,
    mu_eff: f64,
    c_sigma: f64,
    d_sigma: f64,
    c_c: f64,
    c_1: f64,
    c_mu: f64,
    chi_n: f64,
}

impl Strategy {
    fn new(n: usize) -> Self {
        let nf = n as f64;
        let lambda = 4 + (3.0 * nf.ln()).floor() as usize;
        let mu = lambda / 2;
        let raw: Vec<f64> = (1..=mu)
            .map(|i| (mu as f64 + 0.5).ln() - (i as f64).ln())
            .collect();
        let total: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();
        let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let c_sigma = (mu_eff + 2.0) / (nf + mu_eff + 5.0);
        let d_sigma = 1.0 + 2.0 * (((mu_eff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0) + c_sigma;
        let c_c = (4.0 + mu_eff / nf) / (nf + 4.0 + 2.0 * mu_eff / nf);
        let c_1 = 2.0 / ((nf + 1.3).powi(2) + mu_eff);
        let c_mu = (1.0 - c_1)
            .min(2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((nf + 2.0).powi(2) + mu_eff));
        let chi_n = nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf));

        Self {
            lambda,
            weights,
            mu_eff,
            c_sigma,
            d_sigma,
            c_c,
            c_1,
            c_mu,
            chi_n,
        }
    }
}

pub struct Cma {
    strategy: Strategy,
    mean: Vec<f64>,
    sigma: f64,
    covariance: Matrix,
    basis: Matrix,
    scales: Vec<f64>,
    path_sigma: Vec<f64>,
    path_c: Vec<f64>,
    generation: u64,
    scored: Vec<(Vec<f64>, f64)>,
    rng: StdRng,
}

impl Cma {
    pub fn new(start: Vec<f64>, rng: StdRng) -> Self {
        let n = start.len();
        Self {
            strategy: Strategy::new(n),
            mean: start,
            sigma: INITIAL_SIGMA,
            covariance: identity(n),
            basis: identity(n),
            scales: vec![1.0; n],
            path_sigma: vec![0.0; n],
            path_c: vec![0.0; n],
            generation: 0,
            scored: Vec::new(),
            rng,
        }
    }

    pub fn population_size(&self) -> usize {
        self.strategy.lambda
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn sample(&mut self) -> Vec<f64> {
        let z: Vec<f64> = (0..self.mean.len())
            .map(|_| gaussian(&mut self.rng))
            .collect();
        let scaled: Vec<f64> = z.iter().zip(&self.scales).map(|(z, d)| z * d).collect();
        let y = mat_vec(&self.basis, &scaled);
        let mut x: Vec<f64> = self
            .mean
            .iter()
            .zip(&y)
            .map(|(m, y)| m + self.sigma * y)
            .collect();
        clip_unit(&mut x);
        x
    }

    /// `C^{-1/2} v = B D^{-1} B^T v`
    fn inv_sqrt_times(&self, v: &[f64]) -> Vec<f64> {
        let projected = mat_t_vec(&self.basis, v);
        let scaled: Vec<f64> = projected
            .iter()
            .zip(&self.scales)
            .map(|(p, d)| p / d)
            .collect();
        mat_vec(&self.basis, &scaled)
    }

    fn update(&mut self) {
        let n = self.mean.len();
        let s = &self.strategy;
        let mut ranked = std::mem::take(&mut self.scored);
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        let steps: Vec<Vec<f64>> = ranked
            .iter()
            .take(s.weights.len())
            .map(|(x, _)| {
                x.iter()
                    .zip(&self.mean)
                    .map(|(xi, mi)| (xi - mi) / self.sigma)
                    .collect()
            })
            .collect();
        let mut y_w = vec![0.0; n];
        for (w, y) in s.weights.iter().zip(&steps) {
            for i in 0..n {
                y_w[i] += w * y[i];
            }
        }

        for i in 0..n {
            self.mean[i] += self.sigma * y_w[i];
        }

        let whitened = self.inv_sqrt_times(&y_w);
        let sigma_gain = (s.c_sigma * (2.0 - s.c_sigma) * s.mu_eff).sqrt();
        for i in 0..n {
            self.path_sigma[i] = (1.0 - s.c_sigma) * self.path_sigma[i] + sigma_gain * whitened[i];
        }

        let path_norm = norm(&self.path_sigma);
        let generations = (self.generation + 1) as i32;
        let correction = (1.0 - (1.0 - s.c_sigma).powi(2 * generations)).sqrt();
        let h_sigma = if path_norm / correction < (1.4 + 2.0 / (n as f64 + 1.0)) * s.chi_n {
            1.0
        } else {
            0.0
        };

        let c_gain = (s.c_c * (2.0 - s.c_c) * s.mu_eff).sqrt();
        for i in 0..n {
            self.path_c[i] = (1.0 - s.c_c) * self.path_c[i] + h_sigma * c_gain * y_w[i];
        }

        let delta = (1.0 - h_sigma) * s.c_c * (2.0 - s.c_c);
        for i in 0..n {
            for j in 0..n {
                let rank_one = self.path_c[i] * self.path_c[j] + delta * self.covariance[i][j];
                let rank_mu: f64 = s
                    .weights
                    .iter()
                    .zip(&steps)
                    .map(|(w, y)| w * y[i] * y[j])
                    .sum();
                self.covariance[i][j] = (1.0 - s.c_1 - s.c_mu) * self.covariance[i][j]
                    + s.c_1 * rank_one
                    + s.c_mu * rank_mu;
            }
        }

        self.sigma *= ((s.c_sigma / s.d_sigma) * (path_norm / s.chi_n - 1.0)).exp();
        self.sigma = self.sigma.clamp(MIN_SIGMA, MAX_SIGMA);

        self.refresh_eigen();
        self.generation += 1;
    }

    fn refresh_eigen(&mut self) {
        let n = self.covariance.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = 0.5 * (self.covariance[i][j] + self.covariance[j][i]);
                self.covariance[i][j] = avg;
                self.covariance[j][i] = avg;
            }
        }
        let (values, vectors) = symmetric_eigen(&self.covariance);
        self.scales = values
            .iter()
            .map(|v| v.max(MIN_EIGENVALUE).sqrt())
            .collect();
        self.basis = vectors;
    }
}

impl Optimizer for Cma {
    fn propose(&mut self, n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|_| Candidate::new(self.sample(), self.generation))
            .collect()
    }

    fn tell(&mut self, candidate: &Candidate, score: f64) {
        if candidate.generation != self.generation {
            return;
        }
        self.scored.push((candidate.point.clone(), score));
        if self.scored.len() >= self.strategy.lambda {
            self.update();
        }
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Cma
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::sphere_around;
    use rand::SeedableRng;

    #[test]
    fn test_population_size() {
        let cma = Cma::new(vec![0.5; 2], StdRng::seed_from_u64(0));
        assert_eq!(cma.population_size(), 6);
        let cma = Cma::new(vec![0.5; 10], StdRng::seed_from_u64(0));
        assert_eq!(cma.population_size(), 10);
    }

    #[test]
    fn test_generation_advances_after_lambda_scores() {
        let mut cma = Cma::new(vec![0.5; 2], StdRng::seed_from_u64(1));
        let lambda = cma.population_size();
        let batch = cma.propose(lambda + 2);
        for candidate in &batch[..lambda - 1] {
            cma.tell(candidate, sphere_around(&candidate.point, 0.3));
        }
        assert_eq!(cma.generation(), 0);
        cma.tell(&batch[lambda - 1], 1.0);
        assert_eq!(cma.generation(), 1);

        // Late scores from generation 0 are ignored.
        cma.tell(&batch[lambda], 0.0);
        cma.tell(&batch[lambda + 1], 0.0);
        assert!(cma.scored.is_empty());
    }

    #[test]
    fn test_converges_on_sphere() {
        let mut cma = Cma::new(vec![0.5, 0.5], StdRng::seed_from_u64(5));
        let mut best = f64::INFINITY;
        for _ in 0..1000 {
            let candidate = cma.propose(1).remove(0);
            let score = sphere_around(&candidate.point, 0.3);
            best = best.min(score);
            cma.tell(&candidate, score);
        }
        assert!(best < 1e-6, "best {best}");
    }
}
