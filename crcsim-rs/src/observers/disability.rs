use chrono::Datelike;

use crate::config::MetricsConfig;
use crate::constants::TOTAL_YLDS_COLUMN;
use crate::disease::DiseaseModel;
use crate::error::Result;
use crate::observers::{Metrics, ResultsStratifier, accumulate, measure_key};
use crate::population::{DiseaseState, PopulationTable, Sex};
use crate::time::{Clock, data_year};

/// Years lived with disability: each step every active simulant accrues
/// the disability weight of its current state times the step length.
#[derive(Debug, Clone)]
pub struct DisabilityObserver {
    causes: Vec<DiseaseState>,
    config: MetricsConfig,
    ylds: Metrics,
}

impl DisabilityObserver {
    pub fn new(causes: Vec<DiseaseState>, config: MetricsConfig) -> Self {
        Self {
            causes,
            config,
            ylds: Metrics::new(),
        }
    }

    pub fn on_time_step_prepare(
        &mut self,
        pop: &mut PopulationTable,
        disease: &DiseaseModel,
        clock: &Clock,
        stratifier: &ResultsStratifier,
    ) -> Result<()> {
        let year = clock.now().year();
        let lookup_year = data_year(clock.now());
        let step_years = clock.step_years();

        let mut accrued = vec![0.0; pop.len()];
        for simulant in pop.iter().filter(|s| s.is_active()) {
            accrued[simulant.id] = disease.disability_weight(simulant, lookup_year)? * step_years;
        }

        for (label, members) in stratifier.group(pop.iter().filter(|s| s.is_active())) {
            let mut measures = Metrics::new();
            for sex in Sex::ALL {
                for &cause in &self.causes {
                    let ylds: f64 = members
                        .iter()
                        .filter(|s| s.sex == sex && s.disease_state == cause)
                        .map(|s| accrued[s.id])
                        .sum();
                    let measure = format!("ylds_due_to_{}", cause.name());
                    accumulate(&mut measures, measure_key(&measure, year, sex, &self.config), ylds);
                }
            }
            for (key, value) in ResultsStratifier::update_labels(measures, label) {
                accumulate(&mut self.ylds, key, value);
            }
        }

        for simulant in pop.iter_mut() {
            simulant.years_lived_with_disability += accrued[simulant.id];
        }
        Ok(())
    }

    pub fn metrics(&self, pop: &PopulationTable, metrics: &mut Metrics) {
        metrics.extend(self.ylds.iter().map(|(k, v)| (k.clone(), *v)));
        metrics.insert(
            TOTAL_YLDS_COLUMN.to_string(),
            pop.iter().map(|s| s.years_lived_with_disability).sum(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::{RateSource, State};
    use crate::population::Simulant;
    use crate::randomness::Randomness;
    use chrono::NaiveDate;

    #[test]
    fn test_ylds_accrue_weight_times_step() {
        let states = vec![
            State::new(DiseaseState::Susceptible).allow_self_transitions(),
            State::new(DiseaseState::Clinical)
                .allow_self_transitions()
                .with_disability_weight(RateSource::Constant(0.3)),
        ];
        let disease = DiseaseModel::new("test", states, Randomness::new("0").get_stream("t")).unwrap();
        let mut clock = Clock::new(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            365.25 / 4.0,
        )
        .unwrap();
        let mut pop = PopulationTable::from_simulants(
            (0..3).map(|id| Simulant::new(id, 60.0, Sex::Male, clock.now())).collect(),
        );
        pop.get_mut(0).disease_state = DiseaseState::Clinical;
        pop.get_mut(1).disease_state = DiseaseState::Clinical;
        pop.get_mut(1).alive = false;

        let mut stratifier = ResultsStratifier::unstratified();
        stratifier.set_stratification_groups(&pop);
        let mut observer = DisabilityObserver::new(vec![DiseaseState::Clinical], MetricsConfig::default());
        for _ in 0..2 {
            observer.on_time_step_prepare(&mut pop, &disease, &clock, &stratifier).unwrap();
            clock.advance();
        }

        assert!(f64::abs(pop.get(0).years_lived_with_disability - 0.15) < 1e-9);
        assert_eq!(pop.get(1).years_lived_with_disability, 0.0);
        assert_eq!(pop.get(2).years_lived_with_disability, 0.0);
        let mut metrics = Metrics::new();
        observer.metrics(&pop, &mut metrics);
        let key = format!("ylds_due_to_{}_in_2020_among_male", DiseaseState::Clinical.name());
        assert!(f64::abs(metrics[&key] - 0.15) < 1e-9);
        assert!(f64::abs(metrics[TOTAL_YLDS_COLUMN] - 0.15) < 1e-9);
        let key = format!("ylds_due_to_{}_in_2020_among_female", DiseaseState::Clinical.name());
        assert_eq!(metrics[&key], 0.0);
    }
}
