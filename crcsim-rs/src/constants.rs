//! Model parameters that are not read from input data.

use chrono::NaiveDate;

use crate::randomness::{NormalParameter, TruncnormParameter};

pub const MODEL_NAME: &str = "colon_and_rectum_cancer";

// Disease model
pub const MEAN_SOJOURN_TIME: NormalParameter =
    NormalParameter::new("colon_and_rectal_cancer_mean_sojourn_time", 5.0, 0.25);
pub const COLORECTAL_CANCER_REMISSION_RATE: f64 = 0.1;
/// Width in years of the age bins the incidence data is reported in.
pub const AGE_BIN_WIDTH: f64 = 5.0;

// Screening model
pub const FIRST_SCREENING_AGE: f64 = 50.0;
pub const LAST_SCREENING_AGE: f64 = 75.0;

/// Shifted log-normal lag (days) between screenings. Quantile `q` maps to
/// `loc + scale * exp(shape * z(q))`.
#[derive(Debug, Clone, Copy)]
pub struct LagDistribution {
    pub shape: f64,
    pub loc: f64,
    pub scale: f64,
}

pub const DAYS_UNTIL_NEXT_ANNUAL: LagDistribution = LagDistribution {
    shape: 0.7,
    loc: 330.0,
    scale: 100.0,
};
pub const DAYS_UNTIL_NEXT_QUINQUENNIAL: LagDistribution = LagDistribution {
    shape: 0.7,
    loc: 1650.0,
    scale: 100.0,
};

/// Threshold an FOBT draw must fall below to detect disease.
pub const FOBT_SPECIFICITY: TruncnormParameter =
    TruncnormParameter::new("fobt_specificity", 0.88, 0.02);
pub const COLONOSCOPY_SENSITIVITY: TruncnormParameter =
    TruncnormParameter::new("colonoscopy_sensitivity", 0.98, 0.03);
pub const BASE_ATTENDANCE: TruncnormParameter =
    TruncnormParameter::new("start_attendance_base", 0.25, 0.0025);

// 1.89 with 95% CI 1.06-2.49 (Yan et al. 2017)
pub const ATTENDED_PREVIOUS_SCREENING_MULTIPLIER: NormalParameter =
    NormalParameter::new("attended_previous_screening_multiplier", 1.89, 0.3575);

pub const PROBABILITY_ATTENDING_SCREENING_KEY: &str = "probability_attending_screening";

// Scale-up intervention
pub const SCREENING_BASELINE: f64 = 0.20;
pub const SCREENING_SCALE_UP_GOAL_COVERAGE: f64 = 0.60;

pub fn scale_up_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default()
}

pub fn scale_up_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 1).unwrap_or_default()
}

// Results
pub const TOTAL_YLLS_COLUMN: &str = "years_of_life_lost";
pub const TOTAL_YLDS_COLUMN: &str = "years_lived_with_disability";
pub const SCREENING_SCHEDULED: &str = "screening_scheduled_count";
pub const SCREENING_ATTENDED: &str = "screening_attended_count";
pub const INPUT_DRAW_COLUMN: &str = "input_draw";
pub const RANDOM_SEED_COLUMN: &str = "random_seed";
pub const OUTPUT_SCENARIO_COLUMN: &str = "screening_algorithm.scenario";
pub const INPUT_HASH_COLUMN: &str = "input_hash";

/// Birth-year cohorts `(start, end)` reported as `age_cohort_<start>_to_<end>`.
pub fn age_cohorts(reference_year: i32) -> Vec<(i32, i32)> {
    (15..85)
        .step_by(5)
        .map(|x| (reference_year - (x + 5), reference_year - x))
        .collect()
}
