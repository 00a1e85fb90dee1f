//! Stratified result accumulation.
//!
//! Observers accumulate running totals keyed by
//! `<measure>_in_<year>_among_<sex>_<stratum>`; the year and sex parts follow
//! the metrics configuration and the stratum suffix is omitted for the
//! default stratum.

pub mod disability;
pub mod mortality;
pub mod screening;
pub mod state_machine;
pub mod stratify;

use std::collections::BTreeMap;

use crate::config::MetricsConfig;
use crate::population::Sex;

pub use disability::DisabilityObserver;
pub use mortality::MortalityObserver;
pub use screening::ScreeningObserver;
pub use state_machine::StateMachineObserver;
pub use stratify::{Category, ResultsStratifier, StratificationLevel};

pub type Metrics = BTreeMap<String, f64>;

pub fn measure_key(measure: &str, year: i32, sex: Sex, config: &MetricsConfig) -> String {
    let mut key = measure.to_string();
    if config.by_year {
        key.push_str(&format!("_in_{year}"));
    }
    if config.by_sex {
        key.push_str(&format!("_among_{}", sex.label()));
    }
    key
}

/// Adds `value` to `key`, creating the key at zero first so empty strata
/// still produce a column.
pub(crate) fn accumulate(metrics: &mut Metrics, key: String, value: f64) {
    *metrics.entry(key).or_insert(0.0) += value;
}
