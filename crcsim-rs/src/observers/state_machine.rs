use chrono::{Datelike, NaiveDateTime};

use crate::config::MetricsConfig;
use crate::disease::DiseaseModel;
use crate::observers::{Metrics, ResultsStratifier, accumulate, measure_key};
use crate::population::{DiseaseState, PopulationTable, Sex};
use crate::time::Clock;

/// Person time per disease state and transition counts per declared
/// transition.
#[derive(Debug, Clone)]
pub struct StateMachineObserver {
    states: Vec<DiseaseState>,
    transitions: Vec<(DiseaseState, DiseaseState)>,
    config: MetricsConfig,
    person_time: Metrics,
    counts: Metrics,
}

pub fn transition_name(from: DiseaseState, to: DiseaseState) -> String {
    format!("{}_to_{}", from.name(), to.name())
}

impl StateMachineObserver {
    pub fn new(disease: &DiseaseModel, config: MetricsConfig) -> Self {
        Self {
            states: disease.states().iter().map(|s| s.id).collect(),
            transitions: disease.transitions(),
            config,
            person_time: Metrics::new(),
            counts: Metrics::new(),
        }
    }

    pub fn on_initialize_simulants(&self, pop: &mut PopulationTable) {
        for simulant in pop.iter_mut() {
            simulant.previous_disease_state = None;
        }
    }

    /// Accrues this step's person time from the state table as it stands
    /// before any update, then snapshots the current state for transition
    /// detection.
    pub fn on_time_step_prepare(&mut self, pop: &mut PopulationTable, clock: &Clock, stratifier: &ResultsStratifier) {
        let year = clock.now().year();
        let step_years = clock.step_years();
        for (label, members) in stratifier.group(pop.iter().filter(|s| s.is_active())) {
            for &state in &self.states {
                let mut measures = Metrics::new();
                for sex in Sex::ALL {
                    let count = members
                        .iter()
                        .filter(|s| s.sex == sex && s.disease_state == state)
                        .count();
                    let key = measure_key(&format!("{}_person_time", state.name()), year, sex, &self.config);
                    accumulate(&mut measures, key, count as f64 * step_years);
                }
                for (key, value) in ResultsStratifier::update_labels(measures, label) {
                    accumulate(&mut self.person_time, key, value);
                }
            }
        }
        for simulant in pop.iter_mut() {
            simulant.previous_disease_state = Some(simulant.disease_state);
        }
    }

    pub fn on_collect_metrics(&mut self, pop: &PopulationTable, event_time: NaiveDateTime, stratifier: &ResultsStratifier) {
        let year = event_time.year();
        for (label, members) in stratifier.group(pop.iter()) {
            for &(from, to) in &self.transitions {
                let mut measures = Metrics::new();
                for sex in Sex::ALL {
                    let count = members
                        .iter()
                        .filter(|s| s.sex == sex && s.previous_disease_state == Some(from) && s.disease_state == to)
                        .count();
                    let key = measure_key(&format!("{}_event_count", transition_name(from, to)), year, sex, &self.config);
                    accumulate(&mut measures, key, count as f64);
                }
                for (key, value) in ResultsStratifier::update_labels(measures, label) {
                    accumulate(&mut self.counts, key, value);
                }
            }
        }
    }

    pub fn metrics(&self, metrics: &mut Metrics) {
        metrics.extend(self.counts.iter().map(|(k, v)| (k.clone(), *v)));
        metrics.extend(self.person_time.iter().map(|(k, v)| (k.clone(), *v)));
    }

    pub fn total_person_time(&self) -> f64 {
        self.person_time.values().sum()
    }

    pub fn total_transitions(&self) -> f64 {
        self.counts.values().sum()
    }
}
