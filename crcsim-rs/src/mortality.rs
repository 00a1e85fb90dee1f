//! All-cause mortality split into other causes and the disease's excess
//! mortality.

use log::{debug, info};

use crate::artifact::Artifact;
use crate::disease::DiseaseModel;
use crate::error::{Result, SimError};
use crate::lookup::LookupTable;
use crate::population::{CauseOfDeath, PopulationTable, Simulant};
use crate::randomness::{Randomness, RandomnessStream};
use crate::time::{Clock, data_year};

#[derive(Debug, Clone)]
pub struct Mortality {
    other_causes: LookupTable,
    life_expectancy: LookupTable,
    randomness: RandomnessStream,
}

impl Mortality {
    /// Other-cause mortality is `acmr - csmr`; a negative difference is an
    /// input error.
    pub fn new(artifact: &Artifact, randomness: &Randomness) -> Result<Self> {
        let other_causes = artifact
            .acmr
            .zip_with(&artifact.csmr, |acmr, csmr| acmr - csmr)?
            .renamed("mortality_rate.other_causes");
        other_causes.validate_non_negative().map_err(|e| {
            SimError::Data(format!("cause-specific mortality exceeds all-cause mortality: {e}"))
        })?;
        artifact.life_expectancy.validate_non_negative()?;
        info!("Built mortality from all-cause and cause-specific rates");
        Ok(Self {
            other_causes,
            life_expectancy: artifact.life_expectancy.clone(),
            randomness: randomness.get_stream("mortality_handler"),
        })
    }

    /// `(other causes, excess mortality of the current disease state)`.
    pub fn cause_rates(&self, simulant: &Simulant, disease: &DiseaseModel, year: f64) -> Result<(f64, f64)> {
        let other = self.other_causes.lookup(simulant.age, simulant.sex, year)?;
        let excess = disease.excess_mortality_rate(simulant, year)?;
        Ok((other, excess))
    }

    pub fn life_expectancy(&self, simulant: &Simulant, year: f64) -> Result<f64> {
        self.life_expectancy.lookup(simulant.age, simulant.sex, year)
    }

    /// Returns the number of deaths this step.
    pub fn on_time_step(&self, pop: &mut PopulationTable, disease: &DiseaseModel, clock: &Clock) -> Result<usize> {
        let now = clock.now();
        let year = data_year(now);
        let dt = clock.step_years();
        let ids = pop.active_ids();
        let death_draws = self.randomness.get_draw(&ids, now, "death");
        let cause_draws = self.randomness.get_draw(&ids, now, "cause_of_death");

        let mut deaths = 0;
        for ((&id, death_draw), cause_draw) in ids.iter().zip(death_draws).zip(cause_draws) {
            let simulant = pop.get(id);
            let (other, excess) = self.cause_rates(simulant, disease, year)?;
            let rate = other + excess;
            if death_draw >= 1.0 - (-rate * dt).exp() {
                continue;
            }
            let cause = if cause_draw * rate < other {
                CauseOfDeath::OtherCauses
            } else {
                CauseOfDeath::Disease(simulant.disease_state)
            };
            let years_of_life_lost = self.life_expectancy(simulant, year)?;

            let simulant = pop.get_mut(id);
            simulant.alive = false;
            simulant.exit_time = Some(clock.event_time());
            simulant.cause_of_death = Some(cause);
            simulant.years_of_life_lost = years_of_life_lost;
            deaths += 1;
        }
        debug!("{deaths} deaths at {now}");
        Ok(deaths)
    }
}
