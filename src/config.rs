//! TOML run configuration.
//!
//! A [`SimConfig`] is checked as a whole by [`validate`] and then resolved into
//! [`EngineParams`]. Nothing here touches engine state, so every parameter
//! problem surfaces before a run starts.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::dist::{BoundedPareto, CustomSampler, Dist, ErrorRange};
use crate::engine::{EngineParams, Policy, TerminalOrder};
use crate::error::ConfigError;
use crate::formula::Formula;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Target utilization; the arrival rate becomes `load * processing rate`.
    #[serde(default)]
    pub load: Option<f64>,
    #[serde(default)]
    pub arrival_rate: Option<f64>,
    /// Ignored for bounded Pareto service, which uses `1 / mean`.
    #[serde(default)]
    pub processing_rate: Option<f64>,
    pub num_classes: usize,
    pub simulation_length: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub terminal_order: TerminalOrder,
    pub service: ServiceSpec,
    #[serde(default)]
    pub error: ErrorSpec,
    #[serde(default)]
    pub output: OutputSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServiceSpec {
    Exponential,
    /// Uniform on `[0, processing_rate)`.
    Uniform,
    BoundedPareto {
        alpha: f64,
        lower: f64,
        upper: f64,
    },
    /// Inverse-CDF formula in `x` (a uniform draw) and `mu` (the processing rate).
    Custom { formula: String },
}

/// Percent error range, `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorSpec {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    #[serde(default)]
    pub arrivals: Option<PathBuf>,
    #[serde(default)]
    pub load_per_class: Option<PathBuf>,
}

/// Reads, parses and validates a configuration file.
pub fn load_from_file(path: &Path) -> Result<SimConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// `source_name` only shows up in error messages.
pub fn load_from_str(content: &str, source_name: &str) -> Result<SimConfig, ConfigError> {
    let config: SimConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validate(&config)?;
    Ok(config)
}

/// Checks every constraint and reports all violations at once.
pub fn validate(config: &SimConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    match (config.load, config.arrival_rate) {
        (Some(_), Some(_)) => errors.push("give either `load` or `arrival_rate`, not both".to_string()),
        (None, None) => errors.push("one of `load` or `arrival_rate` is required".to_string()),
        (Some(load), None) if !(load > 0.0 && load.is_finite()) => {
            errors.push(format!("load must be positive (got {load})"))
        }
        (None, Some(rate)) if !(rate > 0.0 && rate.is_finite()) => {
            errors.push(format!("arrival_rate must be positive (got {rate})"))
        }
        _ => {}
    }

    match (&config.service, config.processing_rate) {
        (ServiceSpec::BoundedPareto { .. }, _) => {}
        (_, None) => errors.push(format!(
            "processing_rate is required for {} service",
            config.service.kind()
        )),
        (_, Some(rate)) if !(rate > 0.0 && rate.is_finite()) => {
            errors.push(format!("processing_rate must be positive (got {rate})"))
        }
        _ => {}
    }

    if config.num_classes == 0 {
        errors.push("num_classes must be at least 1".to_string());
    }
    if !(config.simulation_length > 0.0) {
        errors.push(format!(
            "simulation_length must be positive (got {})",
            config.simulation_length
        ));
    }
    if let Err(e) = ErrorRange::new(config.error.min, config.error.max) {
        errors.push(describe(e));
    }
    match &config.service {
        ServiceSpec::BoundedPareto {
            alpha,
            lower,
            upper,
        } => {
            if let Err(e) = BoundedPareto::new(*alpha, *lower, *upper) {
                errors.push(describe(e));
            }
        }
        ServiceSpec::Custom { formula } => {
            if let Err(e) = Formula::parse(formula) {
                errors.push(format!("service formula: {e}"));
            }
        }
        ServiceSpec::Exponential | ServiceSpec::Uniform => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors.join("; ")))
    }
}

fn describe(e: ConfigError) -> String {
    match e {
        ConfigError::Invalid(msg) => msg,
        other => other.to_string(),
    }
}

impl ServiceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceSpec::Exponential => "exponential",
            ServiceSpec::Uniform => "uniform",
            ServiceSpec::BoundedPareto { .. } => "bounded-pareto",
            ServiceSpec::Custom { .. } => "custom",
        }
    }
}

impl SimConfig {
    /// Effective processing rate and the service distribution built on it.
    fn service_dist(&self) -> Result<(Dist, f64), ConfigError> {
        let required = || {
            self.processing_rate
                .ok_or_else(|| ConfigError::invalid("processing_rate is required"))
        };
        match &self.service {
            ServiceSpec::BoundedPareto {
                alpha,
                lower,
                upper,
            } => {
                let bp = BoundedPareto::new(*alpha, *lower, *upper)?;
                let rate = 1.0 / bp.mean();
                if let Some(given) = self.processing_rate {
                    warn!(given, derived = rate, "processing_rate ignored for bounded pareto service");
                }
                Ok((Dist::BoundedPareto(bp), rate))
            }
            ServiceSpec::Exponential => {
                let mu = required()?;
                Ok((Dist::expon(mu)?, mu))
            }
            ServiceSpec::Uniform => {
                let mu = required()?;
                Ok((Dist::uniform(mu)?, mu))
            }
            ServiceSpec::Custom { formula } => {
                let mu = required()?;
                let sampler = CustomSampler::from_formula(Formula::parse(formula)?, mu);
                Ok((Dist::Custom(sampler), mu))
            }
        }
    }

    /// Validates and turns the configuration into engine parameters,
    /// drawing a seed when none is configured.
    pub fn resolve(&self) -> Result<EngineParams, ConfigError> {
        validate(self)?;

        let (service, process_rate) = self.service_dist()?;
        let arrival_rate = match (self.load, self.arrival_rate) {
            (Some(load), None) => load * process_rate,
            (None, Some(rate)) => rate,
            _ => return Err(ConfigError::invalid("give exactly one of `load` or `arrival_rate`")),
        };

        let params = EngineParams {
            arrival_rate,
            process_rate,
            interarrival: Dist::expon(arrival_rate)?,
            service,
            error: ErrorRange::new(self.error.min, self.error.max)?,
            num_classes: self.num_classes,
            simulation_length: self.simulation_length,
            seed: self.seed.unwrap_or_else(rand::random),
            policy: self.policy,
            terminal_order: self.terminal_order,
        };
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_TOML: &str = r#"
load = 0.95
processing_rate = 0.5
num_classes = 4
simulation_length = 1000.0
seed = 994863731
policy = "approx-srpt"
terminal_order = "estimate"

[service]
kind = "exponential"

[error]
min = -10.0
max = 10.0

[output]
arrivals = "arrivals.csv"
load_per_class = "load_per_class.csv"
"#;

    fn with_service(service: &str) -> String {
        format!(
            "load = 0.5\nprocessing_rate = 2.0\nnum_classes = 3\nsimulation_length = 10.0\n\n[service]\n{service}\n"
        )
    }

    fn invalid_message(result: Result<SimConfig, ConfigError>) -> String {
        match result {
            Err(ConfigError::Invalid(msg)) => msg,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn parses_full_config() {
        let config = load_from_str(FULL_TOML, "test").unwrap();
        assert_eq!(config.load, Some(0.95));
        assert_eq!(config.num_classes, 4);
        assert_eq!(config.seed, Some(994863731));
        assert_eq!(config.policy, Policy::ApproxSrpt);
        assert_eq!(config.terminal_order, TerminalOrder::Estimate);
        assert_eq!(config.service, ServiceSpec::Exponential);
        assert_eq!(config.error, ErrorSpec { min: -10.0, max: 10.0 });
        assert_eq!(config.output.arrivals, Some(PathBuf::from("arrivals.csv")));

        let params = config.resolve().unwrap();
        assert!((params.arrival_rate - 0.475).abs() < 1e-12);
        assert_eq!(params.process_rate, 0.5);
        assert_eq!(params.seed, 994863731);
        assert_eq!(params.interarrival.mean(), Some(1.0 / params.arrival_rate));
    }

    #[test]
    fn defaults() {
        let config = load_from_str(&with_service("kind = \"uniform\""), "test").unwrap();
        assert_eq!(config.policy, Policy::ApproxSrpt);
        assert_eq!(config.terminal_order, TerminalOrder::Lcfs);
        assert_eq!(config.error, ErrorSpec::default());
        assert_eq!(config.output, OutputSpec::default());
        assert_eq!(config.seed, None);

        let params = config.resolve().unwrap();
        assert_eq!(params.error, ErrorRange::EXACT);
        assert_eq!(params.service.mean(), Some(1.0));
    }

    #[test]
    fn explicit_arrival_rate() {
        let toml = "arrival_rate = 0.4\nprocessing_rate = 0.5\nnum_classes = 2\nsimulation_length = 5.0\npolicy = \"fcfs\"\n[service]\nkind = \"exponential\"\n";
        let params = load_from_str(toml, "test").unwrap().resolve().unwrap();
        assert_eq!(params.arrival_rate, 0.4);
        assert_eq!(params.policy, Policy::Fcfs);
    }

    #[test]
    fn bounded_pareto_derives_processing_rate() {
        let toml = "load = 0.5\nnum_classes = 2\nsimulation_length = 5.0\n[service]\nkind = \"bounded-pareto\"\nalpha = 1.5\nlower = 1.0\nupper = 1000.0\n";
        let params = load_from_str(toml, "test").unwrap().resolve().unwrap();
        let mean = BoundedPareto::new(1.5, 1.0, 1000.0).unwrap().mean();
        assert!((params.process_rate - 1.0 / mean).abs() < 1e-12);
        assert!((params.arrival_rate - 0.5 / mean).abs() < 1e-12);
    }

    #[test]
    fn custom_formula_service() {
        let config = load_from_str(&with_service("kind = \"custom\"\nformula = \"-ln(1 - x)/mu\""), "test").unwrap();
        let params = config.resolve().unwrap();
        assert!(matches!(params.service, Dist::Custom(_)));

        let bad = load_from_str(&with_service("kind = \"custom\"\nformula = \"-ln(1 - y)/mu\""), "test");
        assert!(invalid_message(bad).contains("service formula"));
    }

    #[test]
    fn rejects_both_or_neither_rate() {
        let both = "load = 0.5\narrival_rate = 0.2\nprocessing_rate = 1.0\nnum_classes = 2\nsimulation_length = 5.0\n[service]\nkind = \"exponential\"\n";
        assert!(invalid_message(load_from_str(both, "t")).contains("not both"));

        let neither = "processing_rate = 1.0\nnum_classes = 2\nsimulation_length = 5.0\n[service]\nkind = \"exponential\"\n";
        assert!(invalid_message(load_from_str(neither, "t")).contains("required"));
    }

    #[test]
    fn reports_every_violation() {
        let toml = "load = -1.0\nprocessing_rate = 0.0\nnum_classes = 0\nsimulation_length = 0.0\n[service]\nkind = \"exponential\"\n[error]\nmin = 5.0\nmax = -5.0\n";
        let msg = invalid_message(load_from_str(toml, "t"));
        for needle in ["load", "processing_rate", "num_classes", "simulation_length"] {
            assert!(msg.contains(needle), "{needle} missing from {msg}");
        }
        assert_eq!(msg.split("; ").count(), 5);
    }

    #[test]
    fn bad_pareto_bounds() {
        let toml = "load = 0.5\nnum_classes = 2\nsimulation_length = 5.0\n[service]\nkind = \"bounded-pareto\"\nalpha = 1.5\nlower = 10.0\nupper = 1.0\n";
        assert!(matches!(load_from_str(toml, "t"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn parse_errors_name_the_source() {
        let err = load_from_str("load = ", "broken.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));

        let unknown = with_service("kind = \"weibull\"");
        assert!(matches!(load_from_str(&unknown, "t"), Err(ConfigError::Parse { .. })));

        let extra = format!("bogus_field = true\n{}", with_service("kind = \"uniform\""));
        assert!(matches!(load_from_str(&extra, "t"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_from_file(Path::new("/nonexistent/approx-srpt.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/approx-srpt.toml"));
    }
}
