use chrono::{Datelike, NaiveDateTime};

use crate::config::MetricsConfig;
use crate::constants::{SCREENING_ATTENDED, SCREENING_SCHEDULED};
use crate::observers::{Metrics, ResultsStratifier, accumulate, measure_key};
use crate::population::{PopulationTable, Sex, SimulantId};
use crate::screening::ScreeningEvents;

/// Screenings offered and attended.
#[derive(Debug, Clone)]
pub struct ScreeningObserver {
    config: MetricsConfig,
    counts: Metrics,
}

impl ScreeningObserver {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            counts: Metrics::new(),
        }
    }

    pub fn on_collect_metrics(
        &mut self,
        pop: &PopulationTable,
        events: &ScreeningEvents,
        time: NaiveDateTime,
        stratifier: &ResultsStratifier,
    ) {
        let year = time.year();
        for (measure, ids) in [(SCREENING_SCHEDULED, &events.scheduled), (SCREENING_ATTENDED, &events.attended)] {
            self.count(pop, measure, ids, year, stratifier);
        }
    }

    fn count(&mut self, pop: &PopulationTable, measure: &str, ids: &[SimulantId], year: i32, stratifier: &ResultsStratifier) {
        for (label, members) in stratifier.group(ids.iter().map(|&id| pop.get(id))) {
            let mut measures = Metrics::new();
            for sex in Sex::ALL {
                let count = members.iter().filter(|s| s.sex == sex).count();
                accumulate(&mut measures, measure_key(measure, year, sex, &self.config), count as f64);
            }
            for (key, value) in ResultsStratifier::update_labels(measures, label) {
                accumulate(&mut self.counts, key, value);
            }
        }
    }

    pub fn metrics(&self, metrics: &mut Metrics) {
        metrics.extend(self.counts.iter().map(|(k, v)| (k.clone(), *v)));
    }
}
