//! Rate-based disease state machine.
//!
//! A `DiseaseModel` owns its `State`s and each state owns its outgoing
//! `Transition`s in declaration order. Every step a simulant takes at most
//! one transition: per-step probabilities are laid end to end in declaration
//! order and a single uniform draw picks the first transition whose
//! cumulative probability exceeds it. The implicit self transition absorbs the
//! residual probability.

pub mod crc;

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use log::{debug, info};

use crate::error::{Result, SimError};
use crate::lookup::LookupTable;
use crate::population::{DiseaseState, PopulationTable, Simulant, SimulantId};
use crate::randomness::RandomnessStream;
use crate::time::{Clock, data_year};

/// A simulant-level adjustment of a named rate pipeline.
pub trait RateModifier: fmt::Debug {
    /// Pipeline this modifier applies to.
    fn target(&self) -> &str;
    fn relative_risk(&self, simulant: &Simulant, year: f64) -> Result<f64>;
    fn population_attributable_fraction(&self, simulant: &Simulant, year: f64) -> Result<f64>;
}

#[derive(Debug, Clone)]
pub enum RateSource {
    Constant(f64),
    Table(LookupTable),
}

impl RateSource {
    pub fn value(&self, simulant: &Simulant, year: f64) -> Result<f64> {
        match self {
            RateSource::Constant(value) => Ok(*value),
            RateSource::Table(table) => table.lookup(simulant.age, simulant.sex, year),
        }
    }

    fn validate(&self, what: &str, max: f64) -> Result<()> {
        match self {
            RateSource::Constant(value) if !(0.0..=max).contains(value) => Err(SimError::Config(
                format!("{what}: {value} is outside [0, {max}]"),
            )),
            RateSource::Constant(_) => Ok(()),
            RateSource::Table(table) => table.validate_range(0.0, max),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransitionKind {
    /// Annualized hazard, converted to `1 - exp(-rate * dt)` per step.
    Rate { pipeline: String, rate: RateSource },
    /// Fixed per-step probability.
    Proportion { proportion: f64 },
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub output: DiseaseState,
    pub kind: TransitionKind,
}

impl Transition {
    pub fn rate(output: DiseaseState, pipeline: impl Into<String>, rate: RateSource) -> Self {
        Self {
            output,
            kind: TransitionKind::Rate {
                pipeline: pipeline.into(),
                rate,
            },
        }
    }

    pub fn proportion(output: DiseaseState, proportion: f64) -> Self {
        Self {
            output,
            kind: TransitionKind::Proportion { proportion },
        }
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub id: DiseaseState,
    pub transitions: Vec<Transition>,
    pub allow_self_transition: bool,
    pub prevalence: RateSource,
    pub excess_mortality_rate: RateSource,
    pub disability_weight: RateSource,
}

impl State {
    pub fn new(id: DiseaseState) -> Self {
        Self {
            id,
            transitions: Vec::new(),
            allow_self_transition: false,
            prevalence: RateSource::Constant(0.0),
            excess_mortality_rate: RateSource::Constant(0.0),
            disability_weight: RateSource::Constant(0.0),
        }
    }

    pub fn allow_self_transitions(mut self) -> Self {
        self.allow_self_transition = true;
        self
    }

    pub fn with_prevalence(mut self, prevalence: RateSource) -> Self {
        self.prevalence = prevalence;
        self
    }

    pub fn with_excess_mortality_rate(mut self, emr: RateSource) -> Self {
        self.excess_mortality_rate = emr;
        self
    }

    pub fn with_disability_weight(mut self, disability_weight: RateSource) -> Self {
        self.disability_weight = disability_weight;
        self
    }

    pub fn add_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }
}

#[derive(Debug)]
pub struct DiseaseModel {
    name: String,
    states: Vec<State>,
    modifiers: Vec<Box<dyn RateModifier>>,
    randomness: RandomnessStream,
}

impl DiseaseModel {
    /// The first state is the residual state at initialization.
    pub fn new(name: impl Into<String>, states: Vec<State>, randomness: RandomnessStream) -> Result<Self> {
        let name = name.into();
        if states.is_empty() {
            return Err(SimError::Config(format!("{name}: a disease model needs states")));
        }
        let ids: HashSet<DiseaseState> = states.iter().map(|s| s.id).collect();
        if ids.len() != states.len() {
            return Err(SimError::Config(format!("{name}: duplicate states")));
        }
        let mut pipelines = HashSet::new();
        for state in &states {
            if state.transitions.is_empty() && !state.allow_self_transition {
                return Err(SimError::Config(format!(
                    "{name}: state {} has no transitions",
                    state.id
                )));
            }
            state.prevalence.validate(&format!("{} prevalence", state.id), 1.0)?;
            state
                .excess_mortality_rate
                .validate(&format!("{} excess mortality rate", state.id), f64::INFINITY)?;
            state
                .disability_weight
                .validate(&format!("{} disability weight", state.id), 1.0)?;
            for transition in &state.transitions {
                if !ids.contains(&transition.output) {
                    return Err(SimError::Config(format!(
                        "{name}: transition from {} to unknown state {}",
                        state.id, transition.output
                    )));
                }
                match &transition.kind {
                    TransitionKind::Rate { pipeline, rate } => {
                        rate.validate(pipeline, f64::INFINITY)?;
                        if !pipelines.insert(pipeline.clone()) {
                            return Err(SimError::Config(format!(
                                "{name}: pipeline {pipeline} is declared twice"
                            )));
                        }
                    }
                    TransitionKind::Proportion { proportion } => {
                        if !(0.0..=1.0).contains(proportion) {
                            return Err(SimError::Config(format!(
                                "{name}: proportion {proportion} from {} is not a probability",
                                state.id
                            )));
                        }
                    }
                }
            }
        }
        info!("Built disease model {name} with {} states", states.len());
        Ok(Self {
            name,
            states,
            modifiers: Vec::new(),
            randomness,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, id: DiseaseState) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Declared `(from, to)` pairs, self transitions excluded.
    pub fn transitions(&self) -> Vec<(DiseaseState, DiseaseState)> {
        self.states
            .iter()
            .flat_map(|s| s.transitions.iter().map(move |t| (s.id, t.output)))
            .collect()
    }

    pub fn add_rate_modifier(&mut self, modifier: Box<dyn RateModifier>) -> Result<()> {
        let known = self.states.iter().flat_map(|s| &s.transitions).any(|t| {
            matches!(&t.kind, TransitionKind::Rate { pipeline, .. } if pipeline == modifier.target())
        });
        if !known {
            return Err(SimError::Config(format!(
                "{}: no rate pipeline named {}",
                self.name,
                modifier.target()
            )));
        }
        self.modifiers.push(modifier);
        Ok(())
    }

    /// `base * (1 - joint_paf) * product of relative risks`.
    fn pipeline_value(&self, pipeline: &str, base: f64, simulant: &Simulant, year: f64) -> Result<f64> {
        let mut unexplained = 1.0;
        let mut relative_risk = 1.0;
        for modifier in self.modifiers.iter().filter(|m| m.target() == pipeline) {
            unexplained *= 1.0 - modifier.population_attributable_fraction(simulant, year)?;
            relative_risk *= modifier.relative_risk(simulant, year)?;
        }
        Ok(base * unexplained * relative_risk)
    }

    /// Current value of a rate pipeline for one simulant.
    pub fn rate(&self, pipeline: &str, simulant: &Simulant, year: f64) -> Result<f64> {
        for transition in self.states.iter().flat_map(|s| &s.transitions) {
            if let TransitionKind::Rate { pipeline: name, rate } = &transition.kind
                && name == pipeline
            {
                let base = rate.value(simulant, year)?;
                return self.pipeline_value(pipeline, base, simulant, year);
            }
        }
        Err(SimError::Config(format!("{}: no rate pipeline named {pipeline}", self.name)))
    }

    fn transition_probability(&self, transition: &Transition, simulant: &Simulant, year: f64, dt: f64) -> Result<f64> {
        match &transition.kind {
            TransitionKind::Rate { pipeline, rate } => {
                let base = rate.value(simulant, year)?;
                let rate = self.pipeline_value(pipeline, base, simulant, year)?;
                if !(rate >= 0.0) {
                    return Err(SimError::Data(format!(
                        "{pipeline}: rate {rate} for simulant {}",
                        simulant.id
                    )));
                }
                Ok(1.0 - (-rate * dt).exp())
            }
            TransitionKind::Proportion { proportion } => Ok(*proportion),
        }
    }

    /// Index of the chosen transition, `None` to remain.
    fn choose(&self, state: &State, simulant: &Simulant, draw: f64, year: f64, dt: f64) -> Result<Option<usize>> {
        let mut probabilities = state
            .transitions
            .iter()
            .map(|t| self.transition_probability(t, simulant, year, dt))
            .collect::<Result<Vec<f64>>>()?;
        let total: f64 = probabilities.iter().sum();
        // Without a self transition, or when competing probabilities exceed
        // one, the outgoing probabilities are rescaled to sum to one.
        if total > 0.0 && (total > 1.0 || !state.allow_self_transition) {
            probabilities.iter_mut().for_each(|p| *p /= total);
        }
        let mut cumulative = 0.0;
        for (idx, p) in probabilities.iter().enumerate() {
            cumulative += p;
            if draw < cumulative {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    pub fn on_initialize_simulants(&self, pop: &mut PopulationTable, time: NaiveDateTime) -> Result<()> {
        let year = data_year(time);
        let draws = self.randomness.get_draw(&pop.ids(), time, "initial_states");
        let residual = self.states[0].id;
        for (simulant, draw) in pop.iter_mut().zip(draws) {
            let mut cumulative = 0.0;
            let mut assigned = residual;
            for state in &self.states[1..] {
                cumulative += state.prevalence.value(simulant, year)?;
                if draw < cumulative {
                    assigned = state.id;
                    break;
                }
            }
            if cumulative > 1.0 {
                return Err(SimError::Data(format!(
                    "{}: prevalences sum to {cumulative} for simulant {}",
                    self.name, simulant.id
                )));
            }
            simulant.disease_state = assigned;
        }
        Ok(())
    }

    /// Advances every active simulant by at most one transition. Returns the
    /// number of transitions that fired.
    pub fn on_time_step(&self, pop: &mut PopulationTable, clock: &Clock) -> Result<usize> {
        let now = clock.now();
        let year = data_year(now);
        let dt = clock.step_years();

        let mut changes: Vec<(SimulantId, DiseaseState)> = Vec::new();
        for state in &self.states {
            if state.transitions.is_empty() {
                continue;
            }
            let ids: Vec<SimulantId> = pop
                .iter()
                .filter(|s| s.is_active() && s.disease_state == state.id)
                .map(|s| s.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            let draws = self.randomness.get_draw(&ids, now, state.id.name());
            for (&id, draw) in ids.iter().zip(draws) {
                if let Some(idx) = self.choose(state, pop.get(id), draw, year, dt)? {
                    changes.push((id, state.transitions[idx].output));
                }
            }
        }
        for &(id, output) in &changes {
            pop.get_mut(id).disease_state = output;
        }
        debug!("{}: {} transitions at {now}", self.name, changes.len());
        Ok(changes.len())
    }

    pub fn excess_mortality_rate(&self, simulant: &Simulant, year: f64) -> Result<f64> {
        match self.state(simulant.disease_state) {
            Some(state) => state.excess_mortality_rate.value(simulant, year),
            None => Ok(0.0),
        }
    }

    pub fn disability_weight(&self, simulant: &Simulant, year: f64) -> Result<f64> {
        match self.state(simulant.disease_state) {
            Some(state) => state.disability_weight.value(simulant, year),
            None => Ok(0.0),
        }
    }
}
