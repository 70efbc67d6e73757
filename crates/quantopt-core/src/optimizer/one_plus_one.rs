use rand::rngs::StdRng;

use super::{Candidate, Optimizer, clip_unit, gaussian};
use crate::models::Algorithm;

const INITIAL_SIGMA: f64 = 0.2;
const MIN_SIGMA: f64 = 1e-8;
const MAX_SIGMA: f64 = 1.0;

/// (1+1) evolution strategy with the one-fifth success rule.
pub struct OnePlusOne {
    parent: Vec<f64>,
    parent_score: Option<f64>,
    sigma: f64,
    initial_proposed: bool,
    rng: StdRng,
}

impl OnePlusOne {
    pub fn new(start: Vec<f64>, rng: StdRng) -> Self {
        Self {
            parent: start,
            parent_score: None,
            sigma: INITIAL_SIGMA,
            initial_proposed: false,
            rng,
        }
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    fn mutate(&mut self) -> Vec<f64> {
        let mut child: Vec<f64> = self
            .parent
            .clone()
            .into_iter()
            .map(|x| x + self.sigma * gaussian(&mut self.rng))
            .collect();
        clip_unit(&mut child);
        child
    }
}

impl Optimizer for OnePlusOne {
    fn propose(&mut self, n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|_| {
                if !self.initial_proposed {
                    self.initial_proposed = true;
                    Candidate::new(self.parent.clone(), 0)
                } else {
                    Candidate::new(self.mutate(), 0)
                }
            })
            .collect()
    }

    fn tell(&mut self, candidate: &Candidate, score: f64) {
        match self.parent_score {
            None => {
                self.parent = candidate.point.clone();
                self.parent_score = Some(score);
            }
            Some(best) if score <= best => {
                self.parent = candidate.point.clone();
                self.parent_score = Some(score);
                self.sigma *= (1.0_f64 / 3.0).exp();
            }
            Some(_) => {
                self.sigma *= (-1.0_f64 / 12.0).exp();
            }
        }
        self.sigma = self.sigma.clamp(MIN_SIGMA, MAX_SIGMA);
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::OnePlusOne
    }
}
