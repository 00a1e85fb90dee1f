//! The simulation host: builds components from configuration and input data
//! and steps them in a fixed order.
//!
//! Each step runs in phases. `prepare` lets observers read the state table
//! before anything changes; `time_step` applies mortality, the disease model,
//! screening and aging in that order; `collect_metrics` counts what happened
//! during the step; then the clock advances.

use chrono::Datelike;
use log::{debug, info};

use crate::artifact::Artifact;
use crate::config::SimConfig;
use crate::constants::{INPUT_DRAW_COLUMN, INPUT_HASH_COLUMN, OUTPUT_SCENARIO_COLUMN, RANDOM_SEED_COLUMN};
use crate::disease::DiseaseModel;
use crate::disease::crc::{ColorectalCancerData, colorectal_cancer, incidence_pipeline};
use crate::environment::RunEnvironment;
use crate::error::{Result, SimError};
use crate::intervention::ScreeningScaleUp;
use crate::mortality::Mortality;
use crate::observers::{
    DisabilityObserver, Metrics, MortalityObserver, ResultsStratifier, ScreeningObserver,
    StateMachineObserver, StratificationLevel,
};
use crate::population::{CauseOfDeath, DiseaseState, PopulationTable};
use crate::randomness::Randomness;
use crate::risk::{LogNormalRiskEffect, RiskExposure};
use crate::screening::{ScreeningAlgorithm, ScreeningParameters};
use crate::time::Clock;

pub const OUTPUT_FILENAME: &str = "crcsim_output.csv";

#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    random_seed: String,
    clock: Clock,
    population: PopulationTable,
    exposure: RiskExposure,
    disease: DiseaseModel,
    mortality: Mortality,
    screening: ScreeningAlgorithm,
    stratifier: ResultsStratifier,
    state_machine_observer: StateMachineObserver,
    mortality_observer: MortalityObserver,
    disability_observer: DisabilityObserver,
    screening_observer: ScreeningObserver,
}

impl Simulation {
    pub fn build(config: SimConfig, artifact: &Artifact, random_seed: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let random_seed = random_seed.into();
        let draw = config.input_draw_number;
        let randomness = Randomness::new(format!("{random_seed}_draw_{draw}"));
        let clock = Clock::new(config.time.start, config.time.end, config.time.step_size)?;

        let exposure = RiskExposure::from_config(
            artifact.exposure.clone(),
            &config.family_history_or_adenoma,
            &randomness,
        )?;

        let mut disease = colorectal_cancer(ColorectalCancerData::from_artifact(artifact, draw)?, &randomness)?;
        disease.add_rate_modifier(Box::new(LogNormalRiskEffect::new(
            incidence_pipeline(),
            exposure.clone(),
            &config.risk_effect.incidence_rate,
            &randomness,
            draw,
        )?))?;

        let mortality = Mortality::new(artifact, &randomness)?;

        let mut screening = ScreeningAlgorithm::new(
            ScreeningParameters::sample(draw)?,
            exposure.clone(),
            config.screening.use_attendance_history,
            &randomness,
        );
        screening
            .attendance_mut()
            .add_modifier(Box::new(ScreeningScaleUp::new(config.screening_algorithm.scenario)));

        let stratifier = if config.metrics.by_age_cohort {
            ResultsStratifier::new(vec![StratificationLevel::age_cohort(clock.start().year())])
        } else {
            ResultsStratifier::unstratified()
        };
        let state_machine_observer = StateMachineObserver::new(&disease, config.metrics.clone());
        let mortality_observer = MortalityObserver::new(
            vec![CauseOfDeath::OtherCauses, CauseOfDeath::Disease(DiseaseState::Clinical)],
            config.metrics.clone(),
        );
        let disability_observer = DisabilityObserver::new(vec![DiseaseState::Clinical], config.metrics.clone());
        let screening_observer = ScreeningObserver::new(config.metrics.clone());

        let population = PopulationTable::initialize(
            config.population.population_size,
            config.population.age_start,
            config.population.age_end,
            clock.now(),
            &randomness.get_stream("population"),
        )?;

        let mut simulation = Self {
            config,
            random_seed,
            clock,
            population,
            exposure,
            disease,
            mortality,
            screening,
            stratifier,
            state_machine_observer,
            mortality_observer,
            disability_observer,
            screening_observer,
        };
        simulation.initialize_simulants()?;
        Ok(simulation)
    }

    /// Initial columns, in the order each component depends on the last.
    fn initialize_simulants(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.exposure.on_initialize_simulants(&mut self.population, now);
        self.disease.on_initialize_simulants(&mut self.population, now)?;
        self.screening.on_initialize_simulants(&mut self.population, now)?;
        self.state_machine_observer.on_initialize_simulants(&mut self.population);
        self.stratifier.set_stratification_groups(&self.population);
        info!(
            "Initialized {} simulants at {now} with random seed {}",
            self.population.len(),
            self.random_seed
        );
        Ok(())
    }

    pub fn population(&self) -> &PopulationTable {
        &self.population
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn step(&mut self) -> Result<()> {
        let clock = &self.clock;
        let pop = &mut self.population;

        // prepare
        self.state_machine_observer
            .on_time_step_prepare(pop, clock, &self.stratifier);
        self.disability_observer
            .on_time_step_prepare(pop, &self.disease, clock, &self.stratifier)?;
        self.mortality_observer
            .on_time_step_prepare(pop, clock, &self.stratifier);

        // time step
        let deaths = self.mortality.on_time_step(pop, &self.disease, clock)?;
        let transitions = self.disease.on_time_step(pop, clock)?;
        let screenings = self.screening.on_time_step(pop, clock)?;
        let step_years = clock.step_years();
        for simulant in pop.iter_mut().filter(|s| s.is_active()) {
            simulant.age += step_years;
            if let Some(exit_age) = self.config.population.exit_age
                && simulant.age >= exit_age
            {
                simulant.tracked = false;
                simulant.exit_time = Some(clock.event_time());
            }
        }

        // collect metrics
        let event_time = clock.event_time();
        self.state_machine_observer
            .on_collect_metrics(pop, event_time, &self.stratifier);
        self.mortality_observer
            .on_collect_metrics(pop, event_time, &self.stratifier);
        self.screening_observer
            .on_collect_metrics(pop, &screenings, clock.now(), &self.stratifier);

        debug!(
            "Step {}: {deaths} deaths, {transitions} transitions, {} screenings",
            clock.now(),
            screenings.attended.len()
        );
        self.clock.advance();
        Ok(())
    }

    pub fn run(&mut self) -> Result<Metrics> {
        info!(
            "Running from {} in steps of {:.2} days",
            self.clock.now(),
            self.config.time.step_size
        );
        let mut steps = 0;
        while !self.clock.is_finished() {
            self.step()?;
            steps += 1;
        }
        info!("Finished {steps} steps at {}", self.clock.now());
        Ok(self.metrics())
    }

    pub fn metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        self.state_machine_observer.metrics(&mut metrics);
        self.mortality_observer.metrics(&self.population, &mut metrics);
        self.disability_observer.metrics(&self.population, &mut metrics);
        self.screening_observer.metrics(&mut metrics);
        metrics
    }

    /// One output row: every metric in key order followed by the run
    /// identifiers.
    pub fn output_row(&self, metrics: &Metrics, input_hash: &str) -> (Vec<String>, Vec<String>) {
        let mut headers: Vec<String> = metrics.keys().cloned().collect();
        let mut row: Vec<String> = metrics.values().map(f64::to_string).collect();
        for (column, value) in [
            (INPUT_DRAW_COLUMN, self.config.input_draw_number.to_string()),
            (RANDOM_SEED_COLUMN, self.random_seed.clone()),
            (OUTPUT_SCENARIO_COLUMN, self.config.screening_algorithm.scenario.to_string()),
            (INPUT_HASH_COLUMN, input_hash.to_string()),
        ] {
            headers.push(column.to_string());
            row.push(value);
        }
        (headers, row)
    }
}

/// Runs one simulation for a prepared run environment and writes the
/// output row.
pub fn run(env: &RunEnvironment<SimConfig>) -> Result<Metrics> {
    let config = env
        .input
        .clone()
        .ok_or_else(|| SimError::Config("run input was not deserialized".to_string()))?;
    let random_seed = config.random_seed_or(env.seed);
    let artifact = Artifact::load(env, &config.location, config.input_draw_number)?;
    let mut simulation = Simulation::build(config, &artifact, random_seed)?;
    let metrics = simulation.run()?;
    let (headers, row) = simulation.output_row(&metrics, &env.input_digest());
    env.write_csv(OUTPUT_FILENAME, &headers, &[row])?;
    info!("Wrote {} metrics", metrics.len());
    Ok(metrics)
}
