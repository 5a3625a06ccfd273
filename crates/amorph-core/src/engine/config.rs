use crate::core::eos::models::EosModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Thermostat/barostat family a molecular-dynamics run is performed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ensemble {
    Nve,
    #[default]
    Nvt,
    Npt,
}

/// Fully resolved parameters for one molecular-dynamics call: a linear thermostat
/// ramp from `start_temperature` to `end_temperature` (K) over `n_steps` steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdParams {
    pub start_temperature: f64,
    pub end_temperature: f64,
    pub n_steps: u64,
    #[serde(default)]
    pub time_step_fs: Option<f64>,
    #[serde(default)]
    pub ensemble: Ensemble,
}

impl MdParams {
    /// A constant-temperature hold, the most common schedule in the pipeline.
    pub fn hold(temperature: f64, n_steps: u64) -> Self {
        Self {
            start_temperature: temperature,
            end_temperature: temperature,
            n_steps,
            time_step_fs: None,
            ensemble: Ensemble::Nvt,
        }
    }
}

/// Per-stage overrides layered on top of the search stage's base MD parameters.
///
/// A field left `None` inherits the base value, so a production stage only has to
/// state what it changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MdOverrides {
    pub start_temperature: Option<f64>,
    pub end_temperature: Option<f64>,
    pub time_step_fs: Option<f64>,
    pub ensemble: Option<Ensemble>,
}

impl MdOverrides {
    pub fn resolved(&self, base: &MdParams, n_steps: u64) -> MdParams {
        MdParams {
            start_temperature: self.start_temperature.unwrap_or(base.start_temperature),
            end_temperature: self.end_temperature.unwrap_or(base.end_temperature),
            n_steps,
            time_step_fs: self.time_step_fs.or(base.time_step_fs),
            ensemble: self.ensemble.unwrap_or(base.ensemble),
        }
    }
}

fn default_scale_factors() -> [f64; 3] {
    [0.8, 1.0, 1.2]
}

fn default_max_rounds() -> usize {
    5
}

fn default_eos_models() -> Vec<String> {
    EosModel::PREFERENCE_ORDER
        .iter()
        .map(|model| model.name().to_string())
        .collect()
}

/// Configuration of the equilibrium-volume search stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Initial volume bracket as scale factors relative to the input structure.
    #[serde(default = "default_scale_factors")]
    pub initial_scale_factors: [f64; 3],
    /// Re-bracketing rounds allowed before the search gives up.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// EOS models to attempt, in preference order; the first successful fit wins.
    #[serde(default = "default_eos_models")]
    pub eos_models: Vec<String>,
    /// Base MD parameters; each volume trial runs this schedule.
    pub md: MdParams,
}

/// Configuration of the production MD stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionConfig {
    pub n_steps: u64,
    #[serde(default)]
    pub md: MdOverrides,
}

/// Configuration of the slow (staged) quench.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowQuenchConfig {
    /// Temperature the descent starts from; defaults to the temperature the
    /// production stage ended at.
    #[serde(default)]
    pub start_temperature: Option<f64>,
    pub end_temperature: f64,
    pub n_stages: usize,
    pub steps_per_stage: u64,
}

/// Quench flavour run after production, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuenchConfig {
    /// Instantaneous quench to 0 K: geometry relaxation followed by a static
    /// energy evaluation.
    Fast,
    /// Staged temperature descent with a constant-temperature MD hold per stage.
    Slow(SlowQuenchConfig),
}

/// Complete configuration of the amorphization pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpMorphConfig {
    pub search: SearchConfig,
    pub production: ProductionConfig,
    #[serde(default)]
    pub quench: Option<QuenchConfig>,
    /// Root directory for per-stage engine working directories and sample tables.
    pub workdir: PathBuf,
}

impl MpMorphConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let factors = &self.search.initial_scale_factors;
        if factors.iter().any(|&f| !(f > 0.0)) {
            return Err(ConfigError::InvalidParameter {
                name: "search.initial_scale_factors",
                reason: format!("factors must be positive, got {factors:?}"),
            });
        }
        if !(factors[0] < factors[1] && factors[1] < factors[2]) {
            return Err(ConfigError::InvalidParameter {
                name: "search.initial_scale_factors",
                reason: format!("factors must be strictly increasing, got {factors:?}"),
            });
        }
        if self.search.max_rounds == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "search.max_rounds",
                reason: "at least one round is required".to_string(),
            });
        }
        if self.search.eos_models.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "search.eos_models",
                reason: "at least one model is required".to_string(),
            });
        }
        if self.search.md.n_steps == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "search.md.n_steps",
                reason: "trial MD must run at least one step".to_string(),
            });
        }
        if self.production.n_steps == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "production.n_steps",
                reason: "production MD must run at least one step".to_string(),
            });
        }
        if let Some(QuenchConfig::Slow(slow)) = &self.quench {
            if slow.n_stages == 0 {
                return Err(ConfigError::InvalidParameter {
                    name: "quench.n_stages",
                    reason: "at least one stage is required".to_string(),
                });
            }
            if slow.steps_per_stage == 0 {
                return Err(ConfigError::InvalidParameter {
                    name: "quench.steps_per_stage",
                    reason: "each stage must run at least one step".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MpMorphConfigBuilder {
    temperature: Option<f64>,
    search_n_steps: Option<u64>,
    initial_scale_factors: Option<[f64; 3]>,
    max_rounds: Option<usize>,
    eos_models: Option<Vec<String>>,
    production_n_steps: Option<u64>,
    production_md: Option<MdOverrides>,
    quench: Option<QuenchConfig>,
    workdir: Option<PathBuf>,
}

impl MpMorphConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Temperature (K) held during trial MD; also the default production and
    /// slow-quench start temperature.
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn search_n_steps(mut self, n: u64) -> Self {
        self.search_n_steps = Some(n);
        self
    }
    pub fn initial_scale_factors(mut self, factors: [f64; 3]) -> Self {
        self.initial_scale_factors = Some(factors);
        self
    }
    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = Some(rounds);
        self
    }
    pub fn eos_models(mut self, models: Vec<String>) -> Self {
        self.eos_models = Some(models);
        self
    }
    pub fn production_n_steps(mut self, n: u64) -> Self {
        self.production_n_steps = Some(n);
        self
    }
    pub fn production_md(mut self, overrides: MdOverrides) -> Self {
        self.production_md = Some(overrides);
        self
    }
    pub fn quench(mut self, quench: QuenchConfig) -> Self {
        self.quench = Some(quench);
        self
    }
    pub fn workdir(mut self, path: PathBuf) -> Self {
        self.workdir = Some(path);
        self
    }

    pub fn build(self) -> Result<MpMorphConfig, ConfigError> {
        let temperature = self
            .temperature
            .ok_or(ConfigError::MissingParameter("temperature"))?;
        let config = MpMorphConfig {
            search: SearchConfig {
                initial_scale_factors: self
                    .initial_scale_factors
                    .unwrap_or_else(default_scale_factors),
                max_rounds: self.max_rounds.unwrap_or_else(default_max_rounds),
                eos_models: self.eos_models.unwrap_or_else(default_eos_models),
                md: MdParams::hold(
                    temperature,
                    self.search_n_steps
                        .ok_or(ConfigError::MissingParameter("search_n_steps"))?,
                ),
            },
            production: ProductionConfig {
                n_steps: self
                    .production_n_steps
                    .ok_or(ConfigError::MissingParameter("production_n_steps"))?,
                md: self.production_md.unwrap_or_default(),
            },
            quench: self.quench,
            workdir: self.workdir.ok_or(ConfigError::MissingParameter("workdir"))?,
        };
        config.validate()?;
        Ok(config)
    }
}
