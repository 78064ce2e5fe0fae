//! Run configuration: algorithm selection, direction, and the operator-facing
//! raw form it is resolved from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::bounds::{BoundsSet, RawBound};
use crate::config_error;
use crate::errors::{CfError, CfResult};

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// Tolerance used when the operator leaves the field at its default.
pub const DEFAULT_TOLERANCE: f64 = 1.0;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Minimize,
    Maximize,
}

impl Direction {
    /// Factor that maps a true objective value into minimize form and back.
    pub fn factor(self) -> f64 {
        match self {
            Direction::Minimize => 1.0,
            Direction::Maximize => -1.0,
        }
    }
}

impl FromStr for Direction {
    type Err = CfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimize" | "min" => Ok(Direction::Minimize),
            "maximize" | "max" => Ok(Direction::Maximize),
            other => Err(config_error!(
                "direction must be `minimize` or `maximize`, got `{other}`"
            )),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Minimize => write!(f, "minimize"),
            Direction::Maximize => write!(f, "maximize"),
        }
    }
}

// ---------------------------------------------------------------------------
// Algorithm selection
// ---------------------------------------------------------------------------

/// Options honored by both partition+sample variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShgoSettings {
    pub workers: usize,
    /// Function tolerance handed to each local refinement.
    pub tolerance: f64,
    /// Sampling points per iteration; `None` uses the library default.
    pub samples: Option<usize>,
    pub iterations: usize,
}

impl Default for ShgoSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            tolerance: DEFAULT_TOLERANCE,
            samples: None,
            iterations: 1,
        }
    }
}

/// Options honored by differential evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeSettings {
    pub workers: usize,
    /// Absolute tolerance on the spread (standard deviation) of population energies.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Population size is `population_multiplier * dimensions`.
    pub population_multiplier: usize,
    pub seed: Option<u64>,
}

impl Default for DeSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: 1000,
            population_multiplier: 15,
            seed: None,
        }
    }
}

/// Options honored by dual annealing. It has no worker count and no tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealingSettings {
    pub max_iterations: usize,
    pub seed: Option<u64>,
}

impl Default for AnnealingSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            seed: None,
        }
    }
}

/// The closed set of supported strategies, each carrying only what it honors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Algorithm {
    PartitionSampleSobol(ShgoSettings),
    PartitionSampleSimplicial(ShgoSettings),
    DifferentialEvolution(DeSettings),
    DualAnnealing(AnnealingSettings),
}

impl Algorithm {
    /// Selector name as the operator types it.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::PartitionSampleSobol(_) => "shgo_sobol",
            Algorithm::PartitionSampleSimplicial(_) => "shgo_simplicial",
            Algorithm::DifferentialEvolution(_) => "differential_evolution",
            Algorithm::DualAnnealing(_) => "dual_annealing",
        }
    }

    /// Worker units the algorithm will actually use.
    pub fn workers(&self) -> usize {
        match self {
            Algorithm::PartitionSampleSobol(s) | Algorithm::PartitionSampleSimplicial(s) => {
                s.workers
            }
            Algorithm::DifferentialEvolution(s) => s.workers,
            Algorithm::DualAnnealing(_) => 1,
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::PartitionSampleSimplicial(ShgoSettings::default())
    }
}

/// Algorithm selector before options are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    ShgoSobol,
    ShgoSimplicial,
    DifferentialEvolution,
    DualAnnealing,
}

impl FromStr for AlgorithmKind {
    type Err = CfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "shgo_sobol" => Ok(AlgorithmKind::ShgoSobol),
            "shgo_simplicial" => Ok(AlgorithmKind::ShgoSimplicial),
            "differential_evolution" => Ok(AlgorithmKind::DifferentialEvolution),
            "dual_annealing" => Ok(AlgorithmKind::DualAnnealing),
            "basinhopping" => Err(config_error!("basinhopping is not supported yet")),
            other => Err(config_error!(
                "unknown optimization method `{other}` (expected shgo_sobol, \
                 shgo_simplicial, differential_evolution or dual_annealing)"
            )),
        }
    }
}

impl AlgorithmKind {
    /// Operator options the method accepts but does not honor.
    pub fn ignored_options(self) -> &'static [&'static str] {
        match self {
            AlgorithmKind::DualAnnealing => &["workers", "tolerance"],
            _ => &[],
        }
    }
}

/// Worker count as typed by the operator: anything that is not a positive
/// integer falls back to 1.
pub fn parse_workers(text: &str) -> usize {
    text.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

fn parse_tolerance(text: &str) -> CfResult<f64> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| config_error!("tolerance is not a number: `{text}`"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(config_error!("tolerance must be a finite value >= 0, got {value}"));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Validated, immutable configuration for one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub id: RunId,
    pub algorithm: Algorithm,
    /// Program plus optional fixed leading arguments.
    pub executable: String,
    /// Where the export collaborator writes the result table.
    pub output_path: PathBuf,
    pub direction: Direction,
    pub bounds: BoundsSet,
    /// Per-evaluation limit. `None` lets a child run indefinitely.
    pub timeout: Option<Duration>,
    pub created_at: DateTime<Utc>,
}

impl RunConfig {
    pub fn new(executable: impl Into<String>, bounds: BoundsSet, algorithm: Algorithm) -> Self {
        Self {
            id: Uuid::new_v4(),
            algorithm,
            executable: executable.into(),
            output_path: PathBuf::from("results.csv"),
            direction: Direction::Minimize,
            bounds,
            timeout: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> CfResult<()> {
        if self.executable.trim().is_empty() {
            return Err(config_error!("executable must not be empty"));
        }
        self.bounds.validate()
    }
}

/// Operator input exactly as collected (CLI flags or a JSON file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRunConfig {
    pub algorithm: String,
    pub executable: String,
    pub output: String,
    #[serde(deserialize_with = "text_or_number")]
    pub tolerance: String,
    pub direction: String,
    #[serde(deserialize_with = "text_or_number")]
    pub workers: String,
    pub bounds: Vec<RawBound>,
    pub samples: Option<usize>,
    pub iterations: Option<usize>,
    pub max_iterations: Option<usize>,
    pub seed: Option<u64>,
    pub timeout_secs: Option<f64>,
}

impl Default for RawRunConfig {
    fn default() -> Self {
        Self {
            algorithm: "shgo_simplicial".to_string(),
            executable: String::new(),
            output: "results.csv".to_string(),
            tolerance: "1".to_string(),
            direction: "minimize".to_string(),
            workers: "1".to_string(),
            bounds: Vec::new(),
            samples: None,
            iterations: None,
            max_iterations: None,
            seed: None,
            timeout_secs: None,
        }
    }
}

impl RawRunConfig {
    /// Resolve operator text into a validated [`RunConfig`].
    pub fn resolve(&self) -> CfResult<RunConfig> {
        let kind: AlgorithmKind = self.algorithm.parse()?;
        let tolerance = parse_tolerance(&self.tolerance)?;
        let workers = parse_workers(&self.workers);
        let direction: Direction = self.direction.parse()?;
        let bounds = BoundsSet::from_rows(&self.bounds)?;

        let algorithm = match kind {
            AlgorithmKind::ShgoSobol | AlgorithmKind::ShgoSimplicial => {
                let settings = ShgoSettings {
                    workers,
                    tolerance,
                    samples: self.samples,
                    iterations: self.iterations.unwrap_or(1).max(1),
                };
                if kind == AlgorithmKind::ShgoSobol {
                    Algorithm::PartitionSampleSobol(settings)
                } else {
                    Algorithm::PartitionSampleSimplicial(settings)
                }
            }
            AlgorithmKind::DifferentialEvolution => {
                let defaults = DeSettings::default();
                Algorithm::DifferentialEvolution(DeSettings {
                    workers,
                    tolerance,
                    max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
                    seed: self.seed,
                    ..defaults
                })
            }
            AlgorithmKind::DualAnnealing => {
                warn!(
                    ignored = ?kind.ignored_options(),
                    workers,
                    tolerance,
                    "dual annealing does not support these options; they are ignored"
                );
                let defaults = AnnealingSettings::default();
                Algorithm::DualAnnealing(AnnealingSettings {
                    max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
                    seed: self.seed,
                })
            }
        };

        let mut config = RunConfig::new(self.executable.trim(), bounds, algorithm)
            .with_direction(direction)
            .with_output(self.output.trim());
        if let Some(secs) = self.timeout_secs {
            let timeout = Duration::try_from_secs_f64(secs)
                .map_err(|_| config_error!("timeout must be a positive number of seconds"))?;
            if !timeout.is_zero() {
                config = config.with_timeout(timeout);
            }
        }
        config.validate()?;
        Ok(config)
    }
}

/// Accept either a JSON string or a JSON number for operator text fields.
pub(crate) fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawRunConfig {
        RawRunConfig {
            algorithm: "differential_evolution".into(),
            executable: "python eggholder.py".into(),
            tolerance: "0.5".into(),
            workers: "3".into(),
            bounds: vec![
                RawBound::new("x1", "-512", "512"),
                RawBound::new("x2", "-512", "512"),
                RawBound::default(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn worker_count_fallback() {
        assert_eq!(parse_workers("4"), 4);
        assert_eq!(parse_workers(" 2 "), 2);
        assert_eq!(parse_workers("abc"), 1);
        assert_eq!(parse_workers(""), 1);
        assert_eq!(parse_workers("0"), 1);
        assert_eq!(parse_workers("-3"), 1);
    }

    #[test]
    fn resolve_differential_evolution() {
        let config = sample_raw().resolve().unwrap();
        assert_eq!(config.bounds.len(), 2);
        assert_eq!(config.direction, Direction::Minimize);
        match &config.algorithm {
            Algorithm::DifferentialEvolution(s) => {
                assert_eq!(s.workers, 3);
                assert_eq!(s.tolerance, 0.5);
            }
            other => panic!("unexpected algorithm {other:?}"),
        }
        assert_eq!(config.algorithm.workers(), 3);
    }

    #[test]
    fn resolve_non_numeric_workers_is_not_an_error() {
        let mut raw = sample_raw();
        raw.workers = "lots".into();
        let config = raw.resolve().unwrap();
        assert_eq!(config.algorithm.workers(), 1);
    }

    #[test]
    fn dual_annealing_drops_unsupported_options() {
        let mut raw = sample_raw();
        raw.algorithm = "dual_annealing".into();
        raw.max_iterations = Some(50);
        let config = raw.resolve().unwrap();
        assert_eq!(
            config.algorithm,
            Algorithm::DualAnnealing(AnnealingSettings {
                max_iterations: 50,
                seed: None
            })
        );
        assert_eq!(config.algorithm.workers(), 1);
    }

    #[test]
    fn only_dual_annealing_ignores_options() {
        assert_eq!(
            AlgorithmKind::DualAnnealing.ignored_options(),
            &["workers", "tolerance"]
        );
        for kind in [
            AlgorithmKind::ShgoSobol,
            AlgorithmKind::ShgoSimplicial,
            AlgorithmKind::DifferentialEvolution,
        ] {
            assert!(kind.ignored_options().is_empty(), "{kind:?}");
        }
    }

    #[test]
    fn shgo_variants_carry_tolerance() {
        let mut raw = sample_raw();
        raw.algorithm = "shgo_sobol".into();
        raw.samples = Some(64);
        let config = raw.resolve().unwrap();
        match config.algorithm {
            Algorithm::PartitionSampleSobol(s) => {
                assert_eq!(s.samples, Some(64));
                assert_eq!(s.tolerance, 0.5);
                assert_eq!(s.iterations, 1);
            }
            other => panic!("unexpected algorithm {other:?}"),
        }
    }

    #[test]
    fn unknown_and_placeholder_algorithms_rejected() {
        let mut raw = sample_raw();
        raw.algorithm = "basinhopping".into();
        let err = raw.resolve().unwrap_err();
        assert!(err.to_string().contains("not supported"));

        raw.algorithm = "nelder".into();
        assert!(raw.resolve().unwrap_err().is_config());
    }

    #[test]
    fn bad_tolerance_and_empty_bounds_rejected() {
        let mut raw = sample_raw();
        raw.tolerance = "tight".into();
        assert!(raw.resolve().unwrap_err().is_config());

        raw.tolerance = "-1".into();
        assert!(raw.resolve().unwrap_err().is_config());

        let mut raw = sample_raw();
        raw.bounds = vec![RawBound::default()];
        assert!(raw.resolve().unwrap_err().is_config());

        let mut raw = sample_raw();
        raw.executable = "   ".into();
        assert!(raw.resolve().unwrap_err().is_config());
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("maximize".parse::<Direction>().unwrap(), Direction::Maximize);
        assert_eq!("Minimize".parse::<Direction>().unwrap(), Direction::Minimize);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::Maximize.factor(), -1.0);
        assert_eq!(Direction::Minimize.to_string(), "minimize");
    }

    #[test]
    fn raw_config_from_json_accepts_numbers() {
        let json = serde_json::json!({
            "algorithm": "shgo_simplicial",
            "executable": "./prog",
            "tolerance": 0.25,
            "workers": 2,
            "direction": "maximize",
            "timeout_secs": 5.0,
            "bounds": [
                {"name": "a", "lower": -1, "upper": 1},
                {"name": "", "lower": "", "upper": ""}
            ]
        });
        let raw: RawRunConfig = serde_json::from_value(json).unwrap();
        assert_eq!(raw.tolerance, "0.25");
        assert_eq!(raw.output, "results.csv");

        let config = raw.resolve().unwrap();
        assert_eq!(config.direction, Direction::Maximize);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.bounds.names(), vec!["a".to_string()]);
    }

    #[test]
    fn algorithm_serialization_is_tagged() {
        let algo = Algorithm::DualAnnealing(AnnealingSettings::default());
        let json = serde_json::to_value(&algo).unwrap();
        assert_eq!(json["kind"], "dual_annealing");
        let back: Algorithm = serde_json::from_value(json).unwrap();
        assert_eq!(back, algo);
    }
}
