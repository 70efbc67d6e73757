//! Parameter bounds and the normalised search space.
//!
//! Every optimizer works inside the unit cube `[0, 1]^d`. The
//! [`ParameterSpace`] maps between that cube and the user's named
//! parameters, applying the per-parameter scale transform.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizationError, Result};

/// Named parameter values. Ordered by name so the vector layout is stable.
pub type Parameters = BTreeMap<String, f64>;

/// Scale on which a parameter is searched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Linear,
    Log,
}

/// Bounds and starting point for one parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Starting value. Defaults to the (geometric, for log scale) midpoint.
    #[serde(default, alias = "initial_value", skip_serializing_if = "Option::is_none")]
    pub init: Option<f64>,
    #[serde(default)]
    pub scale: Scale,
}

impl ParameterSpec {
    pub fn linear(lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            lower_bound,
            upper_bound,
            init: None,
            scale: Scale::Linear,
        }
    }

    pub fn log(lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            scale: Scale::Log,
            ..Self::linear(lower_bound, upper_bound)
        }
    }

    pub fn with_init(mut self, init: f64) -> Self {
        self.init = Some(init);
        self
    }

    /// Check bounds, scale and initial value for the named parameter.
    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(OptimizationError::validation(format!(
                "parameter '{name}': bounds must be finite"
            )));
        }
        if self.lower_bound >= self.upper_bound {
            return Err(OptimizationError::validation(format!(
                "parameter '{name}': upper_bound ({}) must be greater than lower_bound ({})",
                self.upper_bound, self.lower_bound
            )));
        }
        if self.scale == Scale::Log && self.lower_bound <= 0.0 {
            return Err(OptimizationError::validation(format!(
                "parameter '{name}': log scale requires strictly positive bounds"
            )));
        }
        if let Some(init) = self.init
            && !(init.is_finite() && init >= self.lower_bound && init <= self.upper_bound)
        {
            return Err(OptimizationError::validation(format!(
                "parameter '{name}': init {init} is outside [{}, {}]",
                self.lower_bound, self.upper_bound
            )));
        }
        Ok(())
    }

    /// Initial value, falling back to the midpoint of the bounds.
    pub fn initial_value(&self) -> f64 {
        self.init.unwrap_or_else(|| match self.scale {
            Scale::Linear => 0.5 * (self.lower_bound + self.upper_bound),
            Scale::Log => (self.lower_bound * self.upper_bound).sqrt(),
        })
    }

    fn normalize(&self, value: f64) -> f64 {
        let u = match self.scale {
            Scale::Linear => (value - self.lower_bound) / (self.upper_bound - self.lower_bound),
            Scale::Log => {
                (value.ln() - self.lower_bound.ln())
                    / (self.upper_bound.ln() - self.lower_bound.ln())
            }
        };
        u.clamp(0.0, 1.0)
    }

    fn denormalize(&self, u: f64) -> f64 {
        let u = if u.is_nan() { 0.5 } else { u.clamp(0.0, 1.0) };
        let value = match self.scale {
            Scale::Linear => self.lower_bound + u * (self.upper_bound - self.lower_bound),
            Scale::Log => {
                (self.lower_bound.ln() + u * (self.upper_bound.ln() - self.lower_bound.ln())).exp()
            }
        };
        value.clamp(self.lower_bound, self.upper_bound)
    }
}

/// Validated, ordered set of parameter specs.
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    names: Vec<String>,
    specs: Vec<ParameterSpec>,
}

impl ParameterSpace {
    pub fn new(config: &BTreeMap<String, ParameterSpec>) -> Result<Self> {
        if config.is_empty() {
            return Err(OptimizationError::validation(
                "parameter_config must define at least one parameter",
            ));
        }
        for (name, spec) in config {
            spec.validate(name)?;
        }
        Ok(Self {
            names: config.keys().cloned().collect(),
            specs: config.values().cloned().collect(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Initial point in the unit cube.
    pub fn initial_point(&self) -> Vec<f64> {
        self.specs
            .iter()
            .map(|spec| spec.normalize(spec.initial_value()))
            .collect()
    }

    /// Map a unit-cube vector to named parameters. Out-of-cube coordinates are clipped.
    pub fn decode(&self, point: &[f64]) -> Parameters {
        self.names
            .iter()
            .zip(&self.specs)
            .zip(point)
            .map(|((name, spec), u)| (name.clone(), spec.denormalize(*u)))
            .collect()
    }

    /// Map named parameters into the unit cube. Missing names take their initial value.
    pub fn encode(&self, params: &Parameters) -> Vec<f64> {
        self.names
            .iter()
            .zip(&self.specs)
            .map(|(name, spec)| {
                let value = params
                    .get(name)
                    .copied()
                    .unwrap_or_else(|| spec.initial_value());
                spec.normalize(value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(entries: &[(&str, ParameterSpec)]) -> Result<ParameterSpace> {
        let config = entries
            .iter()
            .map(|(name, spec)| (name.to_string(), spec.clone()))
            .collect();
        ParameterSpace::new(&config)
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = space(&[("x", ParameterSpec::linear(5.0, -5.0))]).unwrap_err();
        assert!(matches!(err, OptimizationError::Validation(_)));
    }

    #[test]
    fn test_rejects_non_positive_log_bounds() {
        assert!(space(&[("x", ParameterSpec::log(0.0, 1.0))]).is_err());
        assert!(space(&[("x", ParameterSpec::log(-1.0, 1.0))]).is_err());
        assert!(space(&[("x", ParameterSpec::log(1e-3, 1.0))]).is_ok());
    }

    #[test]
    fn test_rejects_init_outside_bounds() {
        let spec = ParameterSpec::linear(0.0, 1.0).with_init(2.0);
        assert!(space(&[("x", spec)]).is_err());
    }

    #[test]
    fn test_rejects_empty_config() {
        assert!(ParameterSpace::new(&BTreeMap::new()).is_err());
    }

    #[test]
    fn test_default_init_is_midpoint() {
        assert_eq!(ParameterSpec::linear(-5.0, 5.0).initial_value(), 0.0);
        let log = ParameterSpec::log(1e-2, 1e2).initial_value();
        assert!((log - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_decode_clips_to_bounds() {
        let space = space(&[
            ("a", ParameterSpec::linear(-1.0, 1.0)),
            ("b", ParameterSpec::log(1.0, 100.0)),
        ])
        .unwrap();
        let params = space.decode(&[1.7, -0.3]);
        assert_eq!(params["a"], 1.0);
        assert_eq!(params["b"], 1.0);
    }

    #[test]
    fn test_log_scale_midpoint_maps_to_half() {
        let space = space(&[("b", ParameterSpec::log(1.0, 100.0))]).unwrap();
        let u = space.encode(&Parameters::from([("b".to_string(), 10.0)]));
        assert!((u[0] - 0.5).abs() < 1e-12);
        let back = space.decode(&u);
        assert!((back["b"] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_names_are_sorted() {
        let space = space(&[
            ("zeta", ParameterSpec::linear(0.0, 1.0)),
            ("alpha", ParameterSpec::linear(0.0, 1.0)),
        ])
        .unwrap();
        assert_eq!(space.names(), ["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_initial_value_alias_deserializes() {
        let spec: ParameterSpec =
            serde_json::from_str(r#"{"lower_bound":0,"upper_bound":4,"initial_value":1}"#)
                .unwrap();
        assert_eq!(spec.init, Some(1.0));
        assert_eq!(spec.scale, Scale::Linear);
    }
}
