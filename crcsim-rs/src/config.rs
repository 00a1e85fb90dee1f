use std::fmt;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    #[default]
    Baseline,
    Alternative,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Baseline => f.write_str("baseline"),
            Scenario::Alternative => f.write_str("alternative"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScreeningAlgorithmConfig {
    pub scenario: Scenario,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub population_size: usize,
    pub age_start: f64,
    pub age_end: f64,
    /// Simulants stop being tracked once they reach this age.
    pub exit_age: Option<f64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            population_size: 10_000,
            age_start: 15.0,
            age_end: 95.0,
            exit_age: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Days per step.
    pub step_size: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2040, 12, 31).unwrap_or_default(),
            step_size: 36.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub by_year: bool,
    pub by_sex: bool,
    pub by_age_cohort: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            by_year: true,
            by_sex: true,
            by_age_cohort: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// Used when no exposure table is supplied.
    pub proportion_exposed: f64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            proportion_exposed: 0.15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskEffectConfig {
    /// Distribution of the log relative risk; validated to exactly `mean`
    /// and `se` when the risk effect is set up.
    pub incidence_rate: serde_json::Map<String, Value>,
}

impl Default for RiskEffectConfig {
    fn default() -> Self {
        let mut incidence_rate = serde_json::Map::new();
        incidence_rate.insert("mean".to_string(), Value::from(1.0));
        incidence_rate.insert("se".to_string(), Value::from(0.1));
        Self { incidence_rate }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Make attendance depend on whether the previous screening was attended.
    pub use_attendance_history: bool,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            use_attendance_history: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub location: String,
    pub input_draw_number: u32,
    pub random_seed: Option<String>,
    pub screening_algorithm: ScreeningAlgorithmConfig,
    pub population: PopulationConfig,
    pub time: TimeConfig,
    pub metrics: MetricsConfig,
    pub family_history_or_adenoma: ExposureConfig,
    #[serde(rename = "effect_of_family_history_or_adenoma_on_preclinical_colon_and_rectum_cancer")]
    pub risk_effect: RiskEffectConfig,
    pub screening: ScreeningConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            location: "SwissRE Coverage".to_string(),
            input_draw_number: 0,
            random_seed: None,
            screening_algorithm: ScreeningAlgorithmConfig::default(),
            population: PopulationConfig::default(),
            time: TimeConfig::default(),
            metrics: MetricsConfig::default(),
            family_history_or_adenoma: ExposureConfig::default(),
            risk_effect: RiskEffectConfig::default(),
            screening: ScreeningConfig::default(),
        }
    }
}

impl SimConfig {
    /// Reads a TOML configuration file as a JSON object so it can sit under
    /// the run input. Dates must be written as quoted strings.
    pub fn read_base(path: &Path) -> Result<serde_json::Map<String, Value>> {
        let raw = fs::read_to_string(path)?;
        let table: toml::Table = toml::from_str(&raw)?;
        match serde_json::to_value(table)? {
            Value::Object(map) => Ok(map),
            _ => Err(SimError::Config(format!(
                "{} is not a configuration table",
                path.display()
            ))),
        }
    }

    pub fn random_seed_or(&self, fallback: u64) -> String {
        self.random_seed
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.population.population_size == 0 {
            return Err(SimError::Config("population_size must be positive".to_string()));
        }
        if !(self.population.age_end > self.population.age_start) || self.population.age_start < 0.0 {
            return Err(SimError::Config(format!(
                "invalid initial age range [{}, {})",
                self.population.age_start, self.population.age_end
            )));
        }
        if let Some(exit_age) = self.population.exit_age
            && exit_age <= self.population.age_start
        {
            return Err(SimError::Config(format!(
                "exit_age {exit_age} is below the youngest initial age"
            )));
        }
        if !(self.time.step_size > 0.0) {
            return Err(SimError::Config("time.step_size must be positive".to_string()));
        }
        if self.time.end <= self.time.start {
            return Err(SimError::Config("time.end must be after time.start".to_string()));
        }
        let p = self.family_history_or_adenoma.proportion_exposed;
        if !(0.0..=1.0).contains(&p) {
            return Err(SimError::Config(format!(
                "proportion_exposed must be a probability, got {p}"
            )));
        }
        Ok(())
    }
}
