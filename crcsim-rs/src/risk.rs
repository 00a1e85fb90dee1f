//! Family-history-or-adenoma exposure and its log-normal effect on
//! preclinical incidence.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use log::info;
use rand::distr::Distribution;
use rand_distr::Normal;
use serde_json::Value;

use crate::config::ExposureConfig;
use crate::disease::RateModifier;
use crate::error::{Result, SimError};
use crate::lookup::LookupTable;
use crate::population::{PopulationTable, Simulant};
use crate::randomness::{Randomness, RandomnessStream};

pub const RISK_NAME: &str = "family_history_or_adenoma";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureCategory {
    /// Exposed
    Cat1,
    /// Unexposed
    Cat2,
}

#[derive(Debug, Clone)]
pub struct RiskExposure {
    proportion_exposed: LookupTable,
    randomness: RandomnessStream,
}

impl RiskExposure {
    pub fn new(proportion_exposed: LookupTable, randomness: RandomnessStream) -> Result<Self> {
        proportion_exposed.validate_range(0.0, 1.0)?;
        Ok(Self {
            proportion_exposed,
            randomness,
        })
    }

    pub fn from_config(
        table: Option<LookupTable>,
        config: &ExposureConfig,
        randomness: &Randomness,
    ) -> Result<Self> {
        let table = table.unwrap_or_else(|| {
            LookupTable::constant(format!("{RISK_NAME}.exposure"), config.proportion_exposed)
        });
        Self::new(table, randomness.get_stream(format!("initial_{RISK_NAME}_propensity")))
    }

    pub fn on_initialize_simulants(&self, pop: &mut PopulationTable, time: NaiveDateTime) {
        let draws = self.randomness.get_draw(&pop.ids(), time, "");
        for (simulant, propensity) in pop.iter_mut().zip(draws) {
            simulant.exposure_propensity = propensity;
        }
    }

    pub fn proportion_exposed(&self, simulant: &Simulant, year: f64) -> Result<f64> {
        self.proportion_exposed.lookup(simulant.age, simulant.sex, year)
    }

    pub fn exposure(&self, simulant: &Simulant, year: f64) -> Result<ExposureCategory> {
        let p = self.proportion_exposed(simulant, year)?;
        Ok(if simulant.exposure_propensity < p {
            ExposureCategory::Cat1
        } else {
            ExposureCategory::Cat2
        })
    }
}

/// Multiplies a rate pipeline by `exp(X)` for exposed simulants, where `X`
/// is drawn once per run from the configured normal distribution.
#[derive(Debug, Clone)]
pub struct LogNormalRiskEffect {
    target: String,
    exposure: RiskExposure,
    exposed_relative_risk: f64,
}

impl LogNormalRiskEffect {
    pub fn new(
        target: impl Into<String>,
        exposure: RiskExposure,
        parameters: &serde_json::Map<String, Value>,
        randomness: &Randomness,
        input_draw: u32,
    ) -> Result<Self> {
        let target = target.into();
        let source_key = format!("effect_of_{RISK_NAME}_on_{target}");
        let (mean, se) = validate_config(&source_key, parameters)?;
        let distribution = Normal::new(mean, se)
            .map_err(|e| SimError::Config(format!("{source_key}: {e}")))?;
        let mut rng = randomness.get_stream(source_key.as_str()).run_rng(input_draw);
        let exposed_relative_risk = distribution.sample(&mut rng).exp();
        info!("{source_key}: relative risk for exposed simulants is {exposed_relative_risk:.4}");
        Ok(Self {
            target,
            exposure,
            exposed_relative_risk,
        })
    }

    pub fn exposed_relative_risk(&self) -> f64 {
        self.exposed_relative_risk
    }

    pub fn category_relative_risk(&self, category: ExposureCategory) -> f64 {
        match category {
            ExposureCategory::Cat1 => self.exposed_relative_risk,
            ExposureCategory::Cat2 => 1.0,
        }
    }

    /// `(mean_rr - 1) / mean_rr` with the mean taken over the exposure
    /// distribution.
    pub fn paf_for_exposure(&self, proportion_exposed: f64) -> f64 {
        let mean_rr = proportion_exposed * self.exposed_relative_risk + (1.0 - proportion_exposed);
        (mean_rr - 1.0) / mean_rr
    }
}

impl RateModifier for LogNormalRiskEffect {
    fn target(&self) -> &str {
        &self.target
    }

    fn relative_risk(&self, simulant: &Simulant, year: f64) -> Result<f64> {
        Ok(self.category_relative_risk(self.exposure.exposure(simulant, year)?))
    }

    fn population_attributable_fraction(&self, simulant: &Simulant, year: f64) -> Result<f64> {
        Ok(self.paf_for_exposure(self.exposure.proportion_exposed(simulant, year)?))
    }
}

fn validate_config(source_key: &str, parameters: &serde_json::Map<String, Value>) -> Result<(f64, f64)> {
    let provided: BTreeSet<&str> = parameters
        .iter()
        .filter(|(_, v)| v.is_number())
        .map(|(k, _)| k.as_str())
        .collect();
    if provided != BTreeSet::from(["mean", "se"]) {
        return Err(SimError::Config(format!(
            "The acceptable parameter options for specifying relative risk are: \
             {{\"mean\", \"se\"}}. You provided {provided:?} for {source_key}."
        )));
    }
    let get = |key: &str| parameters.get(key).and_then(Value::as_f64).unwrap_or(f64::NAN);
    let (mean, se) = (get("mean"), get("se"));
    if !mean.is_finite() || !(se >= 0.0) {
        return Err(SimError::Config(format!(
            "{source_key}: invalid relative risk distribution mean={mean} se={se}"
        )));
    }
    Ok((mean, se))
}
