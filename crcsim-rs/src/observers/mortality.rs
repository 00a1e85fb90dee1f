use chrono::{Datelike, NaiveDateTime};

use crate::config::MetricsConfig;
use crate::constants::TOTAL_YLLS_COLUMN;
use crate::observers::{Metrics, ResultsStratifier, accumulate, measure_key};
use crate::population::{CauseOfDeath, PopulationTable, Sex, Simulant};
use crate::time::Clock;

/// Person time, deaths and years of life lost by cause, plus population
/// totals at the end of the run.
#[derive(Debug, Clone)]
pub struct MortalityObserver {
    causes: Vec<CauseOfDeath>,
    config: MetricsConfig,
    person_time: Metrics,
    deaths: Metrics,
    ylls: Metrics,
}

impl MortalityObserver {
    pub fn new(causes: Vec<CauseOfDeath>, config: MetricsConfig) -> Self {
        Self {
            causes,
            config,
            person_time: Metrics::new(),
            deaths: Metrics::new(),
            ylls: Metrics::new(),
        }
    }

    pub fn on_time_step_prepare(&mut self, pop: &PopulationTable, clock: &Clock, stratifier: &ResultsStratifier) {
        let year = clock.now().year();
        for (label, members) in stratifier.group(pop.iter().filter(|s| s.is_active())) {
            let mut measures = Metrics::new();
            for sex in Sex::ALL {
                let count = members.iter().filter(|s| s.sex == sex).count();
                accumulate(
                    &mut measures,
                    measure_key("person_time", year, sex, &self.config),
                    count as f64 * clock.step_years(),
                );
            }
            for (key, value) in ResultsStratifier::update_labels(measures, label) {
                accumulate(&mut self.person_time, key, value);
            }
        }
    }

    /// Counts the simulants who died during the step ending at `event_time`.
    pub fn on_collect_metrics(&mut self, pop: &PopulationTable, event_time: NaiveDateTime, stratifier: &ResultsStratifier) {
        let year = event_time.year();
        let died_now = pop
            .iter()
            .filter(|s| !s.alive && s.exit_time == Some(event_time));
        for (label, members) in stratifier.group(died_now) {
            let mut deaths = Metrics::new();
            let mut ylls = Metrics::new();
            for sex in Sex::ALL {
                for cause in &self.causes {
                    let dead: Vec<_> = members
                        .iter()
                        .filter(|s| s.sex == sex && s.cause_of_death == Some(*cause))
                        .collect();
                    let measure = format!("death_due_to_{}", cause.name());
                    accumulate(&mut deaths, measure_key(&measure, year, sex, &self.config), dead.len() as f64);
                    let measure = format!("ylls_due_to_{}", cause.name());
                    let lost: f64 = dead.iter().map(|s| s.years_of_life_lost).sum();
                    accumulate(&mut ylls, measure_key(&measure, year, sex, &self.config), lost);
                }
            }
            for (key, value) in ResultsStratifier::update_labels(deaths, label) {
                accumulate(&mut self.deaths, key, value);
            }
            for (key, value) in ResultsStratifier::update_labels(ylls, label) {
                accumulate(&mut self.ylls, key, value);
            }
        }
    }

    pub fn metrics(&self, pop: &PopulationTable, metrics: &mut Metrics) {
        for measures in [&self.person_time, &self.deaths, &self.ylls] {
            metrics.extend(measures.iter().map(|(k, v)| (k.clone(), *v)));
        }
        let count = |pred: fn(&Simulant) -> bool| pop.iter().filter(|s| pred(s)).count() as f64;
        metrics.insert("total_population".to_string(), pop.len() as f64);
        metrics.insert("total_population_living".to_string(), count(Simulant::is_active));
        metrics.insert("total_population_dead".to_string(), count(|s| !s.alive));
        metrics.insert("total_population_tracked".to_string(), count(|s| s.tracked));
        metrics.insert("total_population_untracked".to_string(), count(|s| !s.tracked));
        metrics.insert(
            TOTAL_YLLS_COLUMN.to_string(),
            pop.iter().filter(|s| !s.alive).map(|s| s.years_of_life_lost).sum(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::DiseaseState;
    use chrono::NaiveDate;

    fn clock() -> Clock {
        Clock::new(
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            36.525,
        )
        .unwrap()
    }

    fn observer() -> MortalityObserver {
        MortalityObserver::new(
            vec![CauseOfDeath::OtherCauses, CauseOfDeath::Disease(DiseaseState::Clinical)],
            MetricsConfig {
                by_age_cohort: false,
                ..MetricsConfig::default()
            },
        )
    }

    #[test]
    fn test_deaths_and_totals() {
        let clock = clock();
        let mut pop = PopulationTable::from_simulants(
            (0..4).map(|id| Simulant::new(id, 60.0, Sex::Female, clock.now())).collect(),
        );
        let mut stratifier = ResultsStratifier::unstratified();
        stratifier.set_stratification_groups(&pop);
        let mut observer = observer();
        observer.on_time_step_prepare(&pop, &clock, &stratifier);

        let dead = pop.get_mut(1);
        dead.alive = false;
        dead.exit_time = Some(clock.event_time());
        dead.cause_of_death = Some(CauseOfDeath::Disease(DiseaseState::Clinical));
        dead.years_of_life_lost = 20.0;
        pop.get_mut(2).tracked = false;
        observer.on_collect_metrics(&pop, clock.event_time(), &stratifier);
        // a second collection at a later time must not recount the death
        observer.on_collect_metrics(&pop, clock.event_time() + clock.step_size(), &stratifier);

        let mut metrics = Metrics::new();
        observer.metrics(&pop, &mut metrics);
        let clinical = DiseaseState::Clinical.name();
        assert_eq!(metrics[&format!("death_due_to_{clinical}_in_2021_among_female")], 1.0);
        assert_eq!(metrics[&format!("ylls_due_to_{clinical}_in_2021_among_female")], 20.0);
        assert_eq!(metrics["death_due_to_other_causes_in_2021_among_male"], 0.0);
        assert!(f64::abs(metrics["person_time_in_2021_among_female"] - 0.4) < 1e-9);
        assert_eq!(metrics["person_time_in_2021_among_male"], 0.0);
        assert_eq!(metrics["total_population"], 4.0);
        assert_eq!(metrics["total_population_living"], 2.0);
        assert_eq!(metrics["total_population_dead"], 1.0);
        assert_eq!(metrics["total_population_tracked"], 3.0);
        assert_eq!(metrics["total_population_untracked"], 1.0);
        assert_eq!(metrics[TOTAL_YLLS_COLUMN], 20.0);
    }
}
