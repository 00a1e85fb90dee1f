//! Screening coverage scale-up under the alternative scenario.

use chrono::NaiveDateTime;

use crate::config::Scenario;
use crate::constants::{SCREENING_BASELINE, SCREENING_SCALE_UP_GOAL_COVERAGE, scale_up_end, scale_up_start};
use crate::population::Simulant;
use crate::screening::AttendanceModifier;
use crate::time::{midnight, to_years};

/// Adds a linearly growing share of `goal - baseline` to the attendance
/// probability between the ramp start and end dates.
#[derive(Debug, Clone)]
pub struct ScreeningScaleUp {
    scenario: Scenario,
    start: NaiveDateTime,
    end: NaiveDateTime,
    max_shift: f64,
}

impl ScreeningScaleUp {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            start: midnight(scale_up_start()),
            end: midnight(scale_up_end()),
            max_shift: SCREENING_SCALE_UP_GOAL_COVERAGE - SCREENING_BASELINE,
        }
    }

    /// Share of the ramp completed at `now`, in [0, 1].
    pub fn progress(&self, now: NaiveDateTime) -> f64 {
        (to_years(now - self.start) / to_years(self.end - self.start)).clamp(0.0, 1.0)
    }
}

impl AttendanceModifier for ScreeningScaleUp {
    fn name(&self) -> &str {
        "screening_scale_up"
    }

    fn modify(&self, _simulant: &Simulant, now: NaiveDateTime, target: f64) -> f64 {
        match self.scenario {
            Scenario::Alternative => target + self.max_shift * self.progress(now),
            Scenario::Baseline => target,
        }
    }
}
