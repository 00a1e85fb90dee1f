//! Colorectal cancer natural history: susceptible, preclinical, clinical,
//! recovered.

use log::info;

use crate::artifact::Artifact;
use crate::constants::{
    AGE_BIN_WIDTH, COLORECTAL_CANCER_REMISSION_RATE, MEAN_SOJOURN_TIME, MODEL_NAME,
    SCREENING_BASELINE,
};
use crate::error::{Result, SimError, safe_divide};
use crate::lookup::LookupTable;
use crate::population::DiseaseState;
use crate::randomness::Randomness;

use super::{DiseaseModel, RateSource, State, Transition};

pub fn incidence_pipeline() -> String {
    format!("{}.incidence_rate", DiseaseState::Preclinical.name())
}

pub fn transition_pipeline(from: DiseaseState, to: DiseaseState) -> String {
    format!("{}_to_{}.transition_rate", from.name(), to.name())
}

/// Incidence into the preclinical state among susceptible simulants: the
/// observed (clinical) incidence read `mean_sojourn_time` years later in
/// life, rescaled from the general population to the susceptible one.
pub fn preclinical_incidence_rate(
    raw_incidence: &LookupTable,
    raw_prevalence: &LookupTable,
    mean_sojourn_time: f64,
) -> Result<LookupTable> {
    let shifted = raw_incidence.age_shifted(mean_sojourn_time, AGE_BIN_WIDTH)?;
    Ok(shifted
        .zip_with(raw_prevalence, |i, p| safe_divide(i, 1.0 - p))?
        .renamed(incidence_pipeline()))
}

pub fn clinical_general_prevalence(raw_prevalence: &LookupTable) -> LookupTable {
    raw_prevalence.map(|p| (1.0 - SCREENING_BASELINE) * p)
}

pub fn preclinical_general_prevalence(preclinical_incidence: &LookupTable, mean_sojourn_time: f64) -> LookupTable {
    preclinical_incidence.map(|i| i * mean_sojourn_time)
}

pub fn preclinical_prevalence(
    preclinical_general_prevalence: &LookupTable,
    clinical_general_prevalence: &LookupTable,
) -> Result<LookupTable> {
    Ok(preclinical_general_prevalence
        .zip_with(clinical_general_prevalence, |pc, c| {
            safe_divide((1.0 - SCREENING_BASELINE) * pc, 1.0 - c)
        })?
        .renamed(format!("{}.prevalence", DiseaseState::Preclinical.name())))
}

pub fn clinical_excess_mortality_rate(
    csmr: &LookupTable,
    clinical_general_prevalence: &LookupTable,
) -> Result<LookupTable> {
    Ok(csmr
        .zip_with(clinical_general_prevalence, safe_divide)?
        .renamed(format!("{}.excess_mortality_rate", DiseaseState::Clinical.name())))
}

/// Rate inputs of the colorectal cancer model for one draw.
#[derive(Debug, Clone)]
pub struct ColorectalCancerData {
    pub mean_sojourn_time: f64,
    pub incidence_rate: LookupTable,
    pub preclinical_prevalence: LookupTable,
    pub clinical_excess_mortality_rate: LookupTable,
    pub clinical_disability_weight: Option<LookupTable>,
}

impl ColorectalCancerData {
    pub fn from_artifact(artifact: &Artifact, input_draw: u32) -> Result<Self> {
        let mean_sojourn_time = MEAN_SOJOURN_TIME.sample(input_draw)?;
        Self::derive(artifact, mean_sojourn_time)
    }

    pub fn derive(artifact: &Artifact, mean_sojourn_time: f64) -> Result<Self> {
        if !(mean_sojourn_time > 0.0) {
            return Err(SimError::Config(format!(
                "mean sojourn time must be positive, got {mean_sojourn_time}"
            )));
        }
        artifact.raw_incidence_rate.validate_non_negative()?;
        artifact.raw_prevalence.validate_range(0.0, 1.0)?;
        artifact.csmr.validate_non_negative()?;

        let incidence_rate = preclinical_incidence_rate(
            &artifact.raw_incidence_rate,
            &artifact.raw_prevalence,
            mean_sojourn_time,
        )?;
        let clinical_gp = clinical_general_prevalence(&artifact.raw_prevalence);
        let preclinical_gp = preclinical_general_prevalence(&incidence_rate, mean_sojourn_time);
        let preclinical_prevalence = preclinical_prevalence(&preclinical_gp, &clinical_gp)?;
        let clinical_excess_mortality_rate = clinical_excess_mortality_rate(&artifact.csmr, &clinical_gp)?;
        info!("Mean sojourn time for this draw is {mean_sojourn_time:.3} years");
        Ok(Self {
            mean_sojourn_time,
            incidence_rate,
            preclinical_prevalence,
            clinical_excess_mortality_rate,
            clinical_disability_weight: artifact.disability_weight.clone(),
        })
    }
}

pub fn colorectal_cancer(data: ColorectalCancerData, randomness: &Randomness) -> Result<DiseaseModel> {
    use DiseaseState::*;

    let clinical_disability_weight = match data.clinical_disability_weight {
        Some(table) => RateSource::Table(table),
        None => RateSource::Constant(0.0),
    };
    let states = vec![
        State::new(Susceptible)
            .allow_self_transitions()
            .add_transition(Transition::rate(
                Preclinical,
                incidence_pipeline(),
                RateSource::Table(data.incidence_rate),
            )),
        State::new(Preclinical)
            .allow_self_transitions()
            .with_prevalence(RateSource::Table(data.preclinical_prevalence))
            .add_transition(Transition::rate(
                Clinical,
                transition_pipeline(Preclinical, Clinical),
                RateSource::Constant(1.0 / data.mean_sojourn_time),
            )),
        State::new(Clinical)
            .allow_self_transitions()
            .with_excess_mortality_rate(RateSource::Table(data.clinical_excess_mortality_rate))
            .with_disability_weight(clinical_disability_weight)
            .add_transition(Transition::rate(
                Recovered,
                transition_pipeline(Clinical, Recovered),
                RateSource::Constant(COLORECTAL_CANCER_REMISSION_RATE),
            )),
        State::new(Recovered).allow_self_transitions(),
    ];
    DiseaseModel::new(MODEL_NAME, states, randomness.get_stream(MODEL_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::Bin;
    use crate::population::{Sex, Simulant};
    use chrono::NaiveDate;

    fn by_age(name: &str, values: &[f64]) -> LookupTable {
        let bins: Vec<Bin> = values
            .iter()
            .enumerate()
            .map(|(i, &value)| Bin {
                sex: None,
                age_start: 5.0 * i as f64,
                age_end: 5.0 * (i + 1) as f64,
                year_start: None,
                year_end: None,
                value,
            })
            .collect();
        LookupTable::from_bins(name, &bins).unwrap()
    }

    fn artifact(prevalence: &[f64]) -> Artifact {
        Artifact {
            raw_incidence_rate: by_age("incidence_rate", &[0.001, 0.002, 0.004, 0.008]),
            raw_prevalence: by_age("prevalence", prevalence),
            csmr: by_age("csmr", &[0.0001, 0.0002, 0.0003, 0.0004]),
            acmr: by_age("acmr", &[0.01, 0.01, 0.02, 0.04]),
            life_expectancy: by_age("life_expectancy", &[80.0, 75.0, 70.0, 65.0]),
            disability_weight: None,
            exposure: None,
        }
    }

    fn simulant(age: f64) -> Simulant {
        let time = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        Simulant::new(0, age, Sex::Male, time)
    }

    #[test]
    fn test_data_functions_are_consistent() {
        let data = ColorectalCancerData::derive(&artifact(&[0.0, 0.01, 0.02, 0.04]), 5.0).unwrap();
        // One whole bin shift: age 2 reads the 5-10 incidence.
        let i_pc = data.incidence_rate.lookup(2.0, Sex::Male, 2020.0).unwrap();
        assert!(f64::abs(i_pc - 0.002) < 1e-12);
        let i_pc = data.incidence_rate.lookup(7.0, Sex::Male, 2020.0).unwrap();
        assert!(f64::abs(i_pc - 0.004 / 0.99) < 1e-12);

        let prev_c_gp = 0.8 * 0.01;
        let expected = 0.8 * (i_pc * 5.0) / (1.0 - prev_c_gp);
        let prevalence = data.preclinical_prevalence.lookup(7.0, Sex::Male, 2020.0).unwrap();
        assert!(f64::abs(prevalence - expected) < 1e-12);

        let emr = data.clinical_excess_mortality_rate.lookup(7.0, Sex::Male, 2020.0).unwrap();
        assert!(f64::abs(emr - 0.0002 / prev_c_gp) < 1e-12);
    }

    #[test]
    fn test_zero_prevalence_gives_zero_emr() {
        let data = ColorectalCancerData::derive(&artifact(&[0.0, 0.01, 0.02, 0.04]), 5.0).unwrap();
        assert_eq!(
            data.clinical_excess_mortality_rate.lookup(2.0, Sex::Female, 2020.0).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_fractional_sojourn_time_mixes_bins() {
        let data = ColorectalCancerData::derive(&artifact(&[0.0; 4]), 7.5).unwrap();
        // halfway between one-bin (0.002) and two-bin (0.004) shifts
        let i_pc = data.incidence_rate.lookup(2.0, Sex::Male, 2020.0).unwrap();
        assert!(f64::abs(i_pc - 0.003) < 1e-12);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        assert!(ColorectalCancerData::derive(&artifact(&[0.0; 4]), 0.0).is_err());
        assert!(ColorectalCancerData::derive(&artifact(&[0.0, 1.5, 0.0, 0.0]), 5.0).is_err());
    }

    #[test]
    fn test_rejects_uneven_incidence_age_bins() {
        let bins: Vec<Bin> = [(0.0, 1.0), (1.0, 5.0), (5.0, 10.0), (10.0, 15.0)]
            .iter()
            .map(|&(age_start, age_end)| Bin {
                sex: None,
                age_start,
                age_end,
                year_start: None,
                year_end: None,
                value: 0.001,
            })
            .collect();
        let mut artifact = artifact(&[0.0; 4]);
        artifact.raw_incidence_rate = LookupTable::from_bins("incidence_rate", &bins).unwrap();
        assert!(matches!(
            ColorectalCancerData::derive(&artifact, 5.0),
            Err(SimError::Data(_))
        ));
    }

    #[test]
    fn test_model_structure() {
        let data = ColorectalCancerData::derive(&artifact(&[0.0, 0.01, 0.02, 0.04]), 4.0).unwrap();
        let model = colorectal_cancer(data, &Randomness::new("0")).unwrap();
        use DiseaseState::*;
        assert_eq!(
            model.transitions(),
            vec![(Susceptible, Preclinical), (Preclinical, Clinical), (Clinical, Recovered)]
        );
        let s = simulant(60.0);
        let progression = model
            .rate(&transition_pipeline(Preclinical, Clinical), &s, 2020.0)
            .unwrap();
        assert!(f64::abs(progression - 0.25) < 1e-12);
        let remission = model
            .rate(&transition_pipeline(Clinical, Recovered), &s, 2020.0)
            .unwrap();
        assert_eq!(remission, COLORECTAL_CANCER_REMISSION_RATE);
        assert_eq!(model.disability_weight(&s, 2020.0).unwrap(), 0.0);
    }

    #[test]
    fn test_mean_sojourn_time_is_per_draw() {
        let a = ColorectalCancerData::from_artifact(&artifact(&[0.0; 4]), 3).unwrap();
        let b = ColorectalCancerData::from_artifact(&artifact(&[0.0; 4]), 3).unwrap();
        assert_eq!(a.mean_sojourn_time, b.mean_sojourn_time);
        assert!(a.mean_sojourn_time > 3.0 && a.mean_sojourn_time < 7.0);
    }
}
