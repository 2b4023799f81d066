use std::fmt;
use std::sync::Arc;

use rand::prelude::*;
use rand_distr::Exp1;

use crate::error::ConfigError;
use crate::formula::Formula;

/// Externally supplied sampler for "custom" service times.
#[derive(Clone)]
pub struct CustomSampler {
    label: String,
    sample: Arc<dyn Fn(&mut dyn RngCore) -> f64 + Send + Sync>,
}

impl CustomSampler {
    pub fn new<F>(label: impl Into<String>, sample: F) -> Self
    where
        F: Fn(&mut dyn RngCore) -> f64 + Send + Sync + 'static,
    {
        CustomSampler {
            label: label.into(),
            sample: Arc::new(sample),
        }
    }

    /// Sampler driven by a parsed inverse-CDF formula.
    pub fn from_formula(formula: Formula, mu: f64) -> Self {
        let label = formula.source().to_string();
        CustomSampler::new(label, move |rng| formula.eval(rng.r#gen::<f64>(), mu))
    }

}

impl fmt::Debug for CustomSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomSampler").field(&self.label).finish()
    }
}

/// Truncated Pareto on `[lower, upper]` with shape `alpha`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedPareto {
    alpha: f64,
    lower: f64,
    upper: f64,
}

impl BoundedPareto {
    pub fn new(alpha: f64, lower: f64, upper: f64) -> Result<Self, ConfigError> {
        if !(alpha > 0.0) || !(lower > 0.0) || !(upper >= lower) || !upper.is_finite() {
            return Err(ConfigError::invalid(format!(
                "bounded pareto requires alpha > 0 and 0 < L <= U (got alpha={alpha}, L={lower}, U={upper})"
            )));
        }
        Ok(BoundedPareto {
            alpha,
            lower,
            upper,
        })
    }

    pub fn mean(&self) -> f64 {
        let (a, l, u) = (self.alpha, self.lower, self.upper);
        if l == u {
            return l;
        }
        // written in terms of L/U so that large bounds do not overflow
        let r = l / u;
        if a == 1.0 {
            // limit of the general expression as alpha -> 1
            return l * (u / l).ln() / (1.0 - r);
        }
        (a / (a - 1.0)) * l * (1.0 - r.powf(a - 1.0)) / (1.0 - r.powf(a))
    }

    // inverse cdf
    fn quantile(&self, x: f64) -> f64 {
        let (a, l, u) = (self.alpha, self.lower, self.upper);
        let q = l * (1.0 - x * (1.0 - (l / u).powf(a))).powf(-1.0 / a);
        if q.is_nan() { l } else { q.clamp(l, u) }
    }
}

#[derive(Debug, Clone)]
pub enum Dist {
    Expon(f64),
    // Uniform(0, bound)
    Uniform(f64),
    BoundedPareto(BoundedPareto),
    Custom(CustomSampler),
}

impl Dist {
    pub fn expon(rate: f64) -> Result<Dist, ConfigError> {
        if !(rate > 0.0) || !rate.is_finite() {
            return Err(ConfigError::invalid(format!(
                "exponential rate must be positive and finite (got {rate})"
            )));
        }
        Ok(Dist::Expon(rate))
    }

    pub fn uniform(bound: f64) -> Result<Dist, ConfigError> {
        if !(bound > 0.0) || !bound.is_finite() {
            return Err(ConfigError::invalid(format!(
                "uniform bound must be positive and finite (got {bound})"
            )));
        }
        Ok(Dist::Uniform(bound))
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        // take a nonnegative sample from a given distribution
        match self {
            Dist::Expon(rate) => rng.sample::<f64, _>(Exp1) / rate,
            Dist::Uniform(bound) => rng.gen_range(0.0..*bound),
            Dist::BoundedPareto(bp) => bp.quantile(rng.r#gen::<f64>()),
            Dist::Custom(custom) => {
                let x = (custom.sample)(rng as &mut dyn RngCore);
                if x.is_finite() { x.max(0.0) } else { 0.0 }
            }
        }
    }

    /// Mean of the distribution, when it is known in closed form.
    pub fn mean(&self) -> Option<f64> {
        match self {
            Dist::Expon(rate) => Some(1.0 / rate),
            Dist::Uniform(bound) => Some(bound / 2.0),
            Dist::BoundedPareto(bp) => Some(bp.mean()),
            Dist::Custom(_) => None,
        }
    }
}

impl fmt::Display for Dist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dist::Expon(rate) => write!(f, "Exponential({rate})"),
            Dist::Uniform(bound) => write!(f, "Uniform(0, {bound})"),
            Dist::BoundedPareto(bp) => write!(
                f,
                "BoundedPareto(alpha={}, L={}, U={})",
                bp.alpha, bp.lower, bp.upper
            ),
            Dist::Custom(custom) => write!(f, "Custom({})", custom.label),
        }
    }
}

/// Percent estimation error drawn once per job from `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorRange {
    min: f64,
    max: f64,
}

impl ErrorRange {
    pub const EXACT: ErrorRange = ErrorRange { min: 0.0, max: 0.0 };

    pub fn new(min: f64, max: f64) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ConfigError::invalid(format!(
                "percent error range must satisfy min <= max (got [{min}, {max}])"
            )));
        }
        if min < -100.0 {
            return Err(ConfigError::invalid(format!(
                "percent error below -100 would make estimates negative (got min={min})"
            )));
        }
        Ok(ErrorRange { min, max })
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.min == self.max {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}
