use std::fmt;

use chrono::NaiveDateTime;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::randomness::RandomnessStream;

pub type SimulantId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Male, Sex::Female];

    pub fn label(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }

    pub fn parse(value: &str) -> Result<Sex> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "1" => Ok(Sex::Male),
            "female" | "2" => Ok(Sex::Female),
            other => Err(SimError::Data(format!("unknown sex '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiseaseState {
    Susceptible,
    Preclinical,
    Clinical,
    Recovered,
}

impl DiseaseState {
    pub const ALL: [DiseaseState; 4] = [
        DiseaseState::Susceptible,
        DiseaseState::Preclinical,
        DiseaseState::Clinical,
        DiseaseState::Recovered,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DiseaseState::Susceptible => "susceptible_to_colon_and_rectum_cancer",
            DiseaseState::Preclinical => "preclinical_colon_and_rectum_cancer",
            DiseaseState::Clinical => "clinical_colon_and_rectum_cancer",
            DiseaseState::Recovered => "recovered_from_colon_and_rectum_cancer",
        }
    }
}

impl fmt::Display for DiseaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScreeningResult {
    Negative,
    HighRisk,
    Positive,
}

impl ScreeningResult {
    pub const ALL: [ScreeningResult; 3] = [
        ScreeningResult::Negative,
        ScreeningResult::HighRisk,
        ScreeningResult::Positive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScreeningResult::Negative => "negative_screening",
            ScreeningResult::HighRisk => "high_risk_screening",
            ScreeningResult::Positive => "positive_screening",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseOfDeath {
    OtherCauses,
    Disease(DiseaseState),
}

impl CauseOfDeath {
    pub fn name(&self) -> &'static str {
        match self {
            CauseOfDeath::OtherCauses => "other_causes",
            CauseOfDeath::Disease(state) => state.name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Simulant {
    pub id: SimulantId,
    pub age: f64,
    pub sex: Sex,
    pub alive: bool,
    pub tracked: bool,
    pub entrance_time: NaiveDateTime,
    pub exit_time: Option<NaiveDateTime>,
    pub cause_of_death: Option<CauseOfDeath>,
    pub disease_state: DiseaseState,
    pub previous_disease_state: Option<DiseaseState>,
    pub screening_result: ScreeningResult,
    pub attended_last_screening: bool,
    pub previous_screening_date: Option<NaiveDateTime>,
    pub next_screening_date: Option<NaiveDateTime>,
    pub exposure_propensity: f64,
    pub years_of_life_lost: f64,
    pub years_lived_with_disability: f64,
}

impl Simulant {
    pub fn new(id: SimulantId, age: f64, sex: Sex, entrance_time: NaiveDateTime) -> Self {
        Self {
            id,
            age,
            sex,
            alive: true,
            tracked: true,
            entrance_time,
            exit_time: None,
            cause_of_death: None,
            disease_state: DiseaseState::Susceptible,
            previous_disease_state: None,
            screening_result: ScreeningResult::Negative,
            attended_last_screening: false,
            previous_screening_date: None,
            next_screening_date: None,
            exposure_propensity: 0.0,
            years_of_life_lost: 0.0,
            years_lived_with_disability: 0.0,
        }
    }

    /// Alive and still followed by the simulation.
    pub fn is_active(&self) -> bool {
        self.alive && self.tracked
    }
}

/// Simulants are never removed; ids are positions in the table.
#[derive(Debug, Clone, Default)]
pub struct PopulationTable {
    simulants: Vec<Simulant>,
}

impl PopulationTable {
    /// Ages uniform over `[age_start, age_end)`, sexes split evenly.
    pub fn initialize(
        size: usize,
        age_start: f64,
        age_end: f64,
        time: NaiveDateTime,
        randomness: &RandomnessStream,
    ) -> Result<Self> {
        if !(age_end > age_start) || age_start < 0.0 {
            return Err(SimError::Config(format!(
                "invalid initial age range [{age_start}, {age_end})"
            )));
        }
        let ids: Vec<SimulantId> = (0..size).collect();
        let age_draws = randomness.get_draw(&ids, time, "age");
        let sex_draws = randomness.get_draw(&ids, time, "sex");
        let simulants = ids
            .iter()
            .map(|&id| {
                let age = age_start + age_draws[id] * (age_end - age_start);
                let sex = if sex_draws[id] < 0.5 { Sex::Male } else { Sex::Female };
                Simulant::new(id, age, sex, time)
            })
            .collect();
        info!("Initialized {size} simulants aged {age_start} to {age_end}");
        Ok(Self { simulants })
    }

    pub fn from_simulants(mut simulants: Vec<Simulant>) -> Self {
        for (id, simulant) in simulants.iter_mut().enumerate() {
            simulant.id = id;
        }
        Self { simulants }
    }

    pub fn len(&self) -> usize {
        self.simulants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.simulants.is_empty()
    }

    pub fn get(&self, id: SimulantId) -> &Simulant {
        &self.simulants[id]
    }

    pub fn get_mut(&mut self, id: SimulantId) -> &mut Simulant {
        &mut self.simulants[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Simulant> {
        self.simulants.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Simulant> {
        self.simulants.iter_mut()
    }

    pub fn ids(&self) -> Vec<SimulantId> {
        (0..self.simulants.len()).collect()
    }

    pub fn active_ids(&self) -> Vec<SimulantId> {
        self.simulants
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.id)
            .collect()
    }
}
