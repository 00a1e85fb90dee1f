//! Partition of the population into disjoint result cohorts.

use std::fmt;

use crate::constants::age_cohorts;
use crate::observers::Metrics;
use crate::population::{PopulationTable, Simulant};

type Predicate = Box<dyn Fn(&Simulant) -> bool>;

pub struct Category {
    name: String,
    predicate: Predicate,
}

impl Category {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Simulant) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

/// One stratification dimension, e.g. `age_cohort`.
pub struct StratificationLevel {
    name: String,
    categories: Vec<Category>,
}

impl StratificationLevel {
    pub fn new(name: impl Into<String>, categories: Vec<Category>) -> Self {
        Self {
            name: name.into(),
            categories,
        }
    }

    /// Birth-year cohorts relative to `reference_year`. Membership is fixed
    /// by age at initialization.
    pub fn age_cohort(reference_year: i32) -> Self {
        let categories = age_cohorts(reference_year)
            .into_iter()
            .map(|(born_from, born_to)| {
                let youngest = f64::from(reference_year - born_to);
                let oldest = f64::from(reference_year - born_from);
                Category::new(format!("{born_from}_to_{born_to}"), move |s: &Simulant| {
                    youngest <= s.age && s.age < oldest
                })
            })
            .collect();
        Self::new("age_cohort", categories)
    }
}

/// Assigns every simulant to exactly one stratum: the first full cross of
/// category matches, or the default empty stratum when none matches.
pub struct ResultsStratifier {
    levels: Vec<StratificationLevel>,
    groups: Vec<usize>,
    labels: Vec<String>,
}

impl fmt::Debug for ResultsStratifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultsStratifier")
            .field("labels", &self.labels)
            .field("assigned", &self.groups.len())
            .finish()
    }
}

impl ResultsStratifier {
    pub fn new(levels: Vec<StratificationLevel>) -> Self {
        let mut labels: Vec<String> = cross(&levels)
            .iter()
            .map(|combo| label(&levels, combo))
            .filter(|l| !l.is_empty())
            .collect();
        labels.push(String::new());
        Self {
            levels,
            groups: Vec::new(),
            labels,
        }
    }

    pub fn unstratified() -> Self {
        Self::new(Vec::new())
    }

    /// Stratum labels; the empty default is always last.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn set_stratification_groups(&mut self, pop: &PopulationTable) {
        let default = self.labels.len() - 1;
        let combos = cross(&self.levels);
        self.groups = pop
            .iter()
            .map(|simulant| {
                if self.levels.is_empty() {
                    return default;
                }
                combos
                    .iter()
                    .position(|combo| {
                        combo
                            .iter()
                            .zip(&self.levels)
                            .all(|(&c, level)| (level.categories[c].predicate)(simulant))
                    })
                    .unwrap_or(default)
            })
            .collect();
    }

    pub fn label_of(&self, simulant: &Simulant) -> &str {
        let default = self.labels.len() - 1;
        let idx = self.groups.get(simulant.id).copied().unwrap_or(default);
        &self.labels[idx]
    }

    /// Every stratum label paired with its members among `simulants`,
    /// including strata with no members.
    pub fn group<'a>(&self, simulants: impl IntoIterator<Item = &'a Simulant>) -> Vec<(&str, Vec<&'a Simulant>)> {
        let mut grouped: Vec<(&str, Vec<&'a Simulant>)> =
            self.labels.iter().map(|l| (l.as_str(), Vec::new())).collect();
        let default = self.labels.len() - 1;
        for simulant in simulants {
            let idx = self.groups.get(simulant.id).copied().unwrap_or(default);
            grouped[idx].1.push(simulant);
        }
        grouped
    }

    pub fn update_labels(measures: Metrics, label: &str) -> Metrics {
        if label.is_empty() {
            return measures;
        }
        measures
            .into_iter()
            .map(|(key, value)| (format!("{key}_{label}"), value))
            .collect()
    }
}

/// Index combinations over the categories of each level.
fn cross(levels: &[StratificationLevel]) -> Vec<Vec<usize>> {
    levels.iter().fold(vec![Vec::new()], |acc, level| {
        acc.iter()
            .flat_map(|prefix| {
                (0..level.categories.len()).map(move |c| {
                    let mut combo = prefix.clone();
                    combo.push(c);
                    combo
                })
            })
            .collect()
    })
}

fn label(levels: &[StratificationLevel], combo: &[usize]) -> String {
    combo
        .iter()
        .zip(levels)
        .map(|(&c, level)| format!("{}_{}", level.name, level.categories[c].name))
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::Sex;
    use crate::randomness::Randomness;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn population(n: usize) -> PopulationTable {
        let time = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let stream = Randomness::new("11").get_stream("population");
        PopulationTable::initialize(n, 0.0, 110.0, time, &stream).unwrap()
    }

    #[test]
    fn test_groups_partition_the_population() {
        let pop = population(5_000);
        let mut stratifier = ResultsStratifier::new(vec![StratificationLevel::age_cohort(2020)]);
        stratifier.set_stratification_groups(&pop);
        let grouped = stratifier.group(pop.iter());
        assert_eq!(grouped.len(), 15);
        let mut seen = HashSet::new();
        for (_, members) in &grouped {
            for s in members {
                assert!(seen.insert(s.id), "simulant {} in two strata", s.id);
            }
        }
        assert_eq!(seen.len(), pop.len());
        // under 15 and 85 or over fall in the default stratum
        let (default_label, default_members) = grouped.last().unwrap();
        assert_eq!(*default_label, "");
        assert!(default_members.iter().all(|s| s.age < 15.0 || s.age >= 85.0));
    }

    #[test]
    fn test_age_cohort_labels_and_membership() {
        let time = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let pop = PopulationTable::from_simulants(vec![
            Simulant::new(0, 15.0, Sex::Male, time),
            Simulant::new(1, 19.99, Sex::Male, time),
            Simulant::new(2, 84.5, Sex::Female, time),
            Simulant::new(3, 10.0, Sex::Female, time),
        ]);
        let mut stratifier = ResultsStratifier::new(vec![StratificationLevel::age_cohort(2020)]);
        stratifier.set_stratification_groups(&pop);
        assert_eq!(stratifier.label_of(pop.get(0)), "age_cohort_2000_to_2005");
        assert_eq!(stratifier.label_of(pop.get(1)), "age_cohort_2000_to_2005");
        assert_eq!(stratifier.label_of(pop.get(2)), "age_cohort_1935_to_1940");
        assert_eq!(stratifier.label_of(pop.get(3)), "");
    }

    #[test]
    fn test_groups_are_static_after_initialization() {
        let time = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let mut pop = PopulationTable::from_simulants(vec![Simulant::new(0, 19.5, Sex::Male, time)]);
        let mut stratifier = ResultsStratifier::new(vec![StratificationLevel::age_cohort(2020)]);
        stratifier.set_stratification_groups(&pop);
        pop.get_mut(0).age = 21.0;
        assert_eq!(stratifier.label_of(pop.get(0)), "age_cohort_2000_to_2005");
    }

    #[test]
    fn test_unstratified_has_single_global_label() {
        let pop = population(10);
        let mut stratifier = ResultsStratifier::unstratified();
        stratifier.set_stratification_groups(&pop);
        let grouped = stratifier.group(pop.iter());
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, "");
        assert_eq!(grouped[0].1.len(), 10);
    }

    #[test]
    fn test_update_labels() {
        let measures = Metrics::from([("deaths".to_string(), 2.0)]);
        assert_eq!(
            ResultsStratifier::update_labels(measures.clone(), "age_cohort_1990_to_1995"),
            Metrics::from([("deaths_age_cohort_1990_to_1995".to_string(), 2.0)])
        );
        assert_eq!(ResultsStratifier::update_labels(measures.clone(), ""), measures);
    }

    #[test]
    fn test_crossed_levels() {
        let sex = StratificationLevel::new(
            "sex",
            vec![
                Category::new("male", |s: &Simulant| s.sex == Sex::Male),
                Category::new("female", |s: &Simulant| s.sex == Sex::Female),
            ],
        );
        let old = StratificationLevel::new("old", vec![Category::new("yes", |s: &Simulant| s.age >= 60.0)]);
        let stratifier = ResultsStratifier::new(vec![sex, old]);
        assert_eq!(
            stratifier.labels(),
            &["sex_male_old_yes".to_string(), "sex_female_old_yes".to_string(), String::new()]
        );
    }
}
