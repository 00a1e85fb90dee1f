//! Screening scheduler and diagnostic outcomes.
//!
//! Every simulant carries a screening result (negative, high risk, positive)
//! and a previous/next screening date. Each step the simulants who are due,
//! or who present with symptoms, are offered a screening; attenders get a
//! fresh result from the test matching their perceived risk group, and
//! everyone offered a screening gets a new due date.

use std::fmt;

use chrono::NaiveDateTime;
use log::{debug, info};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::constants::{
    ATTENDED_PREVIOUS_SCREENING_MULTIPLIER, BASE_ATTENDANCE, COLONOSCOPY_SENSITIVITY,
    DAYS_UNTIL_NEXT_ANNUAL, DAYS_UNTIL_NEXT_QUINQUENNIAL, FIRST_SCREENING_AGE, FOBT_SPECIFICITY,
    LAST_SCREENING_AGE, LagDistribution, PROBABILITY_ATTENDING_SCREENING_KEY, SCREENING_BASELINE,
};
use crate::error::{Result, SimError};
use crate::population::{DiseaseState, PopulationTable, ScreeningResult, Simulant, SimulantId};
use crate::randomness::{Randomness, RandomnessStream};
use crate::risk::{ExposureCategory, RiskExposure};
use crate::time::{Clock, data_year, days, to_years, years};

pub fn within_screening_age(age: f64) -> bool {
    (FIRST_SCREENING_AGE..=LAST_SCREENING_AGE).contains(&age)
}

/// Clinical disease that has not yet been picked up by screening.
pub fn is_symptomatic_presentation(simulant: &Simulant) -> bool {
    simulant.disease_state == DiseaseState::Clinical && simulant.screening_result != ScreeningResult::Positive
}

/// Days until the next screening at quantile `u` of the lag distribution.
pub fn lag_days(distribution: LagDistribution, u: f64) -> Result<f64> {
    let standard = Normal::new(0.0, 1.0).map_err(|e| SimError::Config(e.to_string()))?;
    let z = standard.inverse_cdf(u.clamp(0.0, 1.0));
    Ok(distribution.loc + distribution.scale * (distribution.shape * z).exp())
}

/// Annual FOBT follow-up after a negative result, quinquennial colonoscopy
/// follow-up otherwise.
pub fn lag_distribution(result: ScreeningResult) -> LagDistribution {
    match result {
        ScreeningResult::Negative => DAYS_UNTIL_NEXT_ANNUAL,
        ScreeningResult::HighRisk | ScreeningResult::Positive => DAYS_UNTIL_NEXT_QUINQUENNIAL,
    }
}

/// Screening parameters drawn once per input draw.
#[derive(Debug, Clone, Copy)]
pub struct ScreeningParameters {
    pub fobt_specificity: f64,
    pub colonoscopy_sensitivity: f64,
    pub base_attendance: f64,
    pub attended_previous_multiplier: f64,
}

impl ScreeningParameters {
    pub fn sample(input_draw: u32) -> Result<Self> {
        Ok(Self {
            fobt_specificity: FOBT_SPECIFICITY.sample(input_draw)?,
            colonoscopy_sensitivity: COLONOSCOPY_SENSITIVITY.sample(input_draw)?,
            base_attendance: BASE_ATTENDANCE.sample(input_draw)?,
            attended_previous_multiplier: ATTENDED_PREVIOUS_SCREENING_MULTIPLIER
                .sample(input_draw)?
                .max(0.0),
        })
    }
}

/// A change to the population-level attendance probability.
pub trait AttendanceModifier: fmt::Debug {
    fn name(&self) -> &str;
    fn modify(&self, simulant: &Simulant, now: NaiveDateTime, target: f64) -> f64;
}

/// The `probability_attending_screening` value: a baseline coverage, any
/// registered modifiers applied in order, then optionally split by whether
/// the previous screening was attended.
#[derive(Debug)]
pub struct AttendancePipeline {
    source: f64,
    modifiers: Vec<Box<dyn AttendanceModifier>>,
    attended_previous_multiplier: Option<f64>,
}

impl AttendancePipeline {
    pub fn new(source: f64, attended_previous_multiplier: Option<f64>) -> Self {
        Self {
            source,
            modifiers: Vec::new(),
            attended_previous_multiplier,
        }
    }

    pub fn name(&self) -> &str {
        PROBABILITY_ATTENDING_SCREENING_KEY
    }

    pub fn add_modifier(&mut self, modifier: Box<dyn AttendanceModifier>) {
        info!("{} modified by {}", self.name(), modifier.name());
        self.modifiers.push(modifier);
    }

    /// Population coverage before conditioning on attendance history.
    pub fn coverage(&self, simulant: &Simulant, now: NaiveDateTime) -> f64 {
        self.modifiers
            .iter()
            .fold(self.source, |target, m| m.modify(simulant, now, target))
            .clamp(0.0, 1.0)
    }

    /// With multiplier `m`, non-attenders get `p / (m p + 1 - p)` and
    /// attenders `m` times that, capped at one, which keeps the overall
    /// coverage at `p` when a share `p` attended last time.
    pub fn value(&self, simulant: &Simulant, now: NaiveDateTime) -> f64 {
        let p = self.coverage(simulant, now);
        match self.attended_previous_multiplier {
            None => p,
            Some(m) => {
                let not_attended = p / (m * p + 1.0 - p);
                if simulant.attended_last_screening {
                    (m * not_attended).min(1.0)
                } else {
                    not_attended
                }
            }
        }
    }
}

/// Ids offered and attending a screening in one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreeningEvents {
    pub scheduled: Vec<SimulantId>,
    pub attended: Vec<SimulantId>,
}

#[derive(Debug)]
pub struct ScreeningAlgorithm {
    parameters: ScreeningParameters,
    attendance: AttendancePipeline,
    exposure: RiskExposure,
    randomness: RandomnessStream,
}

impl ScreeningAlgorithm {
    pub fn new(
        parameters: ScreeningParameters,
        exposure: RiskExposure,
        use_attendance_history: bool,
        randomness: &Randomness,
    ) -> Self {
        let multiplier = use_attendance_history.then_some(parameters.attended_previous_multiplier);
        info!(
            "Screening: FOBT specificity {:.3}, colonoscopy sensitivity {:.3}, base attendance {:.3}",
            parameters.fobt_specificity, parameters.colonoscopy_sensitivity, parameters.base_attendance
        );
        Self {
            parameters,
            attendance: AttendancePipeline::new(SCREENING_BASELINE, multiplier),
            exposure,
            randomness: randomness.get_stream("screening_algorithm"),
        }
    }

    pub fn parameters(&self) -> &ScreeningParameters {
        &self.parameters
    }

    pub fn attendance(&self) -> &AttendancePipeline {
        &self.attendance
    }

    pub fn attendance_mut(&mut self) -> &mut AttendancePipeline {
        &mut self.attendance
    }

    fn is_high_risk(&self, simulant: &Simulant, year: f64) -> Result<bool> {
        Ok(self.exposure.exposure(simulant, year)? == ExposureCategory::Cat1)
    }

    /// Result of an attended screening, decided in priority order:
    /// clinical disease is always found; perceived medium risk (a negative
    /// last result) gets an FOBT; perceived high risk gets a colonoscopy.
    /// A past positive without clinical disease falls back to negative.
    pub fn do_screening(&self, simulant: &Simulant, time: NaiveDateTime) -> Result<ScreeningResult> {
        if simulant.disease_state == DiseaseState::Clinical {
            return Ok(ScreeningResult::Positive);
        }
        let has_disease = simulant.disease_state != DiseaseState::Susceptible;
        match simulant.screening_result {
            ScreeningResult::Negative => {
                let draw = self.randomness.draw_one(simulant.id, time, "fobt_sensitivity");
                if has_disease && draw < self.parameters.fobt_specificity {
                    Ok(ScreeningResult::Positive)
                } else if self.is_high_risk(simulant, data_year(time))? {
                    Ok(ScreeningResult::HighRisk)
                } else {
                    Ok(ScreeningResult::Negative)
                }
            }
            ScreeningResult::HighRisk => {
                let draw = self.randomness.draw_one(simulant.id, time, "colonoscopy_sensitivity");
                if has_disease && draw < self.parameters.colonoscopy_sensitivity {
                    Ok(ScreeningResult::Positive)
                } else {
                    Ok(ScreeningResult::HighRisk)
                }
            }
            ScreeningResult::Positive => Ok(ScreeningResult::Negative),
        }
    }

    /// Next appointment after a screening on `from` with the given result.
    pub fn schedule_screening(
        &self,
        id: SimulantId,
        from: NaiveDateTime,
        result: ScreeningResult,
        time: NaiveDateTime,
    ) -> Result<NaiveDateTime> {
        let u = self.randomness.draw_one(id, time, "schedule_next");
        Ok(from + days(lag_days(lag_distribution(result), u)?))
    }

    pub fn on_initialize_simulants(&self, pop: &mut PopulationTable, time: NaiveDateTime) -> Result<()> {
        let year = data_year(time);
        let ids = pop.ids();
        let attended_draws = self.randomness.get_draw(&ids, time, "attended_previous");
        let progress_draws = self.randomness.get_draw(&ids, time, "progress_to_next_screening");

        for (&id, (attended_draw, progress)) in ids.iter().zip(attended_draws.into_iter().zip(progress_draws)) {
            let simulant = pop.get(id);
            let attended = attended_draw < self.parameters.base_attendance;
            let result = if attended && self.is_high_risk(simulant, year)? {
                ScreeningResult::HighRisk
            } else {
                ScreeningResult::Negative
            };
            let (previous, next) = if simulant.age < FIRST_SCREENING_AGE {
                (None, Some(time + years(FIRST_SCREENING_AGE - simulant.age)))
            } else if within_screening_age(simulant.age) {
                let gap = self.schedule_screening(id, time, result, time)? - time;
                let previous = time - years(progress * to_years(gap));
                (Some(previous), Some(previous + gap))
            } else {
                (None, None)
            };

            let simulant = pop.get_mut(id);
            simulant.attended_last_screening = attended;
            simulant.screening_result = result;
            simulant.previous_screening_date = previous;
            simulant.next_screening_date = next;
        }
        Ok(())
    }

    pub fn on_time_step(&self, pop: &mut PopulationTable, clock: &Clock) -> Result<ScreeningEvents> {
        let now = clock.now();
        let ids = pop.active_ids();
        let attendance_draws = self.randomness.get_draw(&ids, now, "attendance");

        let mut events = ScreeningEvents::default();
        for (&id, attendance_draw) in ids.iter().zip(attendance_draws) {
            let simulant = pop.get(id);
            let symptomatic = is_symptomatic_presentation(simulant);
            let due = if symptomatic { Some(now) } else { simulant.next_screening_date };
            let scheduled = symptomatic
                || (due.is_some_and(|d| d <= now) && within_screening_age(simulant.age));
            let Some(due) = due.filter(|_| scheduled) else {
                continue;
            };
            let attended = symptomatic || attendance_draw < self.attendance.value(simulant, now);
            let result = if attended {
                self.do_screening(simulant, now)?
            } else {
                simulant.screening_result
            };
            let next = self.schedule_screening(id, due, result, now)?;

            let simulant = pop.get_mut(id);
            simulant.attended_last_screening = attended;
            simulant.screening_result = result;
            simulant.previous_screening_date = Some(due);
            simulant.next_screening_date = Some(next);
            events.scheduled.push(id);
            if attended {
                events.attended.push(id);
            }
        }
        debug!(
            "{} screenings scheduled, {} attended at {now}",
            events.scheduled.len(),
            events.attended.len()
        );
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExposureConfig;
    use crate::population::Sex;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn parameters() -> ScreeningParameters {
        ScreeningParameters {
            fobt_specificity: 0.88,
            colonoscopy_sensitivity: 0.98,
            base_attendance: 0.25,
            attended_previous_multiplier: 1.89,
        }
    }

    fn algorithm(seed: &str, proportion_exposed: f64, use_history: bool) -> ScreeningAlgorithm {
        let randomness = Randomness::new(seed);
        let exposure = RiskExposure::from_config(
            None,
            &ExposureConfig { proportion_exposed },
            &randomness,
        )
        .unwrap();
        ScreeningAlgorithm::new(parameters(), exposure, use_history, &randomness)
    }

    fn population(n: usize, age: f64, state: DiseaseState, result: ScreeningResult) -> PopulationTable {
        PopulationTable::from_simulants(
            (0..n)
                .map(|id| {
                    let mut s = Simulant::new(id, age, Sex::Female, t0());
                    s.disease_state = state;
                    s.screening_result = result;
                    // spread exposure propensities evenly over [0, 1)
                    s.exposure_propensity = id as f64 / n as f64;
                    s
                })
                .collect(),
        )
    }

    #[test]
    fn test_within_screening_age_bounds() {
        assert!(!within_screening_age(49.0));
        assert!(!within_screening_age(49.999));
        assert!(within_screening_age(50.0));
        assert!(within_screening_age(62.5));
        assert!(within_screening_age(75.0));
        assert!(!within_screening_age(75.001));
        assert!(!within_screening_age(76.0));
    }

    #[test]
    fn test_symptomatic_presentation_cross_product() {
        for state in [DiseaseState::Susceptible, DiseaseState::Preclinical, DiseaseState::Clinical] {
            for result in ScreeningResult::ALL {
                let mut s = Simulant::new(0, 60.0, Sex::Male, t0());
                s.disease_state = state;
                s.screening_result = result;
                let expected = state == DiseaseState::Clinical && result != ScreeningResult::Positive;
                assert_eq!(is_symptomatic_presentation(&s), expected, "{state:?} {result:?}");
            }
        }
    }

    #[test]
    fn test_clinical_always_screens_positive() {
        let algorithm = algorithm("1", 0.3, true);
        for result in ScreeningResult::ALL {
            let pop = population(500, 60.0, DiseaseState::Clinical, result);
            for s in pop.iter() {
                assert_eq!(algorithm.do_screening(s, t0()).unwrap(), ScreeningResult::Positive);
            }
        }
    }

    #[test]
    fn test_susceptible_never_screens_positive() {
        let algorithm = algorithm("2", 0.3, true);
        for result in ScreeningResult::ALL {
            let pop = population(1000, 60.0, DiseaseState::Susceptible, result);
            for s in pop.iter() {
                assert_ne!(algorithm.do_screening(s, t0()).unwrap(), ScreeningResult::Positive);
            }
        }
    }

    #[test]
    fn test_past_positive_without_clinical_disease_falls_back_to_negative() {
        let algorithm = algorithm("12", 0.3, true);
        for state in [DiseaseState::Susceptible, DiseaseState::Preclinical, DiseaseState::Recovered] {
            let pop = population(500, 60.0, state, ScreeningResult::Positive);
            for s in pop.iter() {
                assert_eq!(algorithm.do_screening(s, t0()).unwrap(), ScreeningResult::Negative);
            }
        }
    }

    #[test]
    fn test_preclinical_results_match_sensitivity() {
        let algorithm = algorithm("3", 0.3, true);
        let n = 10_000;
        let pop = population(n, 60.0, DiseaseState::Preclinical, ScreeningResult::Negative);
        let results: Vec<ScreeningResult> = pop
            .iter()
            .map(|s| algorithm.do_screening(s, t0()).unwrap())
            .collect();
        let share = |r| results.iter().filter(|&&x| x == r).count() as f64 / n as f64;
        for r in ScreeningResult::ALL {
            assert!(share(r) > 0.0, "{r:?} missing");
        }
        assert!(f64::abs(share(ScreeningResult::Positive) - 0.88) < 0.015);
        // non-positives split by exposure: 30% exposed
        assert!(f64::abs(share(ScreeningResult::HighRisk) - 0.12 * 0.3) < 0.01);

        let pop = population(n, 60.0, DiseaseState::Preclinical, ScreeningResult::HighRisk);
        let positives = pop
            .iter()
            .filter(|s| algorithm.do_screening(s, t0()).unwrap() == ScreeningResult::Positive)
            .count() as f64;
        assert!(f64::abs(positives / n as f64 - 0.98) < 0.01);
    }

    #[test]
    fn test_schedule_lag_means() {
        let algorithm = algorithm("4", 0.3, true);
        let n = 10_000;
        let mean_days = |result| {
            (0..n)
                .map(|id| {
                    let next = algorithm.schedule_screening(id, t0(), result, t0()).unwrap();
                    to_years(next - t0()) * 365.25
                })
                .sum::<f64>()
                / n as f64
        };
        let annual = mean_days(ScreeningResult::Negative);
        assert!(f64::abs(annual - 365.0) < 0.35 * 365.0, "annual mean {annual}");
        for result in [ScreeningResult::HighRisk, ScreeningResult::Positive] {
            let mean = mean_days(result);
            assert!(f64::abs(mean - 1825.0) < 0.35 * 1825.0, "quinquennial mean {mean}");
        }
    }

    #[test]
    fn test_lag_days_is_monotone_and_above_loc() {
        let low = lag_days(DAYS_UNTIL_NEXT_ANNUAL, 0.1).unwrap();
        let median = lag_days(DAYS_UNTIL_NEXT_ANNUAL, 0.5).unwrap();
        assert!(low < median);
        assert!(f64::abs(median - 430.0) < 1e-9);
        let shortest = lag_days(DAYS_UNTIL_NEXT_ANNUAL, 0.0).unwrap();
        assert!((330.0..331.0).contains(&shortest));
    }

    #[test]
    fn test_initialization() {
        let algorithm = algorithm("5", 0.3, true);
        let stream = Randomness::new("5").get_stream("population");
        let mut pop = PopulationTable::initialize(20_000, 15.0, 95.0, t0(), &stream).unwrap();
        algorithm.on_initialize_simulants(&mut pop, t0()).unwrap();

        let attended = pop.iter().filter(|s| s.attended_last_screening).count() as f64 / 20_000.0;
        assert!(f64::abs(attended - 0.25) < 0.05 * 0.25);

        for s in pop.iter() {
            if !s.attended_last_screening {
                assert_eq!(s.screening_result, ScreeningResult::Negative);
            }
            if s.age < FIRST_SCREENING_AGE {
                assert_eq!(s.previous_screening_date, None);
                let turns_fifty = t0() + years(FIRST_SCREENING_AGE - s.age);
                assert_eq!(s.next_screening_date, Some(turns_fifty));
            } else if within_screening_age(s.age) {
                let previous = s.previous_screening_date.unwrap();
                let next = s.next_screening_date.unwrap();
                assert!(previous <= t0() && t0() <= next);
                assert!(next >= previous);
            } else {
                assert_eq!(s.previous_screening_date, None);
                assert_eq!(s.next_screening_date, None);
            }
        }
        // next dates are spread out rather than synchronized
        let eligible: Vec<_> = pop
            .iter()
            .filter(|s| within_screening_age(s.age))
            .filter_map(|s| s.next_screening_date)
            .collect();
        let first = eligible[0];
        assert!(eligible.iter().any(|&d| d != first));
    }

    #[test]
    fn test_symptomatic_are_screened_immediately() {
        let algorithm = algorithm("6", 0.3, true);
        let mut pop = population(200, 40.0, DiseaseState::Clinical, ScreeningResult::Negative);
        for s in pop.iter_mut() {
            s.next_screening_date = Some(t0() + days(1000.0));
        }
        let clock = Clock::new(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            30.0,
        )
        .unwrap();
        let events = algorithm.on_time_step(&mut pop, &clock).unwrap();
        assert_eq!(events.scheduled.len(), 200);
        assert_eq!(events.attended.len(), 200);
        for s in pop.iter() {
            assert_eq!(s.screening_result, ScreeningResult::Positive);
            assert!(s.attended_last_screening);
            assert_eq!(s.previous_screening_date, Some(t0()));
            assert!(s.next_screening_date.unwrap() > t0() + days(1600.0));
        }
    }

    #[test]
    fn test_only_due_and_eligible_are_scheduled() {
        let algorithm = algorithm("7", 0.3, true);
        let clock = Clock::new(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            30.0,
        )
        .unwrap();
        let mut pop = PopulationTable::from_simulants(vec![
            Simulant::new(0, 60.0, Sex::Male, t0()),
            Simulant::new(1, 60.0, Sex::Male, t0()),
            Simulant::new(2, 80.0, Sex::Male, t0()),
            Simulant::new(3, 60.0, Sex::Male, t0()),
        ]);
        pop.get_mut(0).next_screening_date = Some(t0() - days(3.0));
        pop.get_mut(1).next_screening_date = Some(t0() + days(3.0));
        pop.get_mut(2).next_screening_date = Some(t0() - days(3.0));
        pop.get_mut(3).next_screening_date = Some(t0() - days(3.0));
        pop.get_mut(3).alive = false;
        pop.get_mut(1).attended_last_screening = true;

        let events = algorithm.on_time_step(&mut pop, &clock).unwrap();
        assert_eq!(events.scheduled, vec![0]);
        let s = pop.get(0);
        assert_eq!(s.previous_screening_date, Some(t0() - days(3.0)));
        assert!(s.next_screening_date.unwrap() > t0());
        // not scheduled, so attendance history is untouched
        assert!(pop.get(1).attended_last_screening);
        assert_eq!(pop.get(1).next_screening_date, Some(t0() + days(3.0)));
    }

    #[test]
    fn test_attendance_history_preserves_coverage() {
        let pipeline = AttendancePipeline::new(0.2, Some(1.89));
        let mut attender = Simulant::new(0, 60.0, Sex::Male, t0());
        attender.attended_last_screening = true;
        let non_attender = Simulant::new(1, 60.0, Sex::Male, t0());
        let p1 = pipeline.value(&attender, t0());
        let p2 = pipeline.value(&non_attender, t0());
        assert!(p1 > p2);
        assert!(f64::abs(p1 / p2 - 1.89) < 1e-12);
        assert!(f64::abs(0.2 * p1 + 0.8 * p2 - 0.2) < 1e-12);

        let flat = AttendancePipeline::new(0.2, None);
        assert_eq!(flat.value(&attender, t0()), 0.2);
        assert_eq!(flat.value(&non_attender, t0()), 0.2);
    }
}
