pub mod artifact;
pub mod config;
pub mod constants;
pub mod disease;
pub mod environment;
pub mod error;
pub mod intervention;
pub mod lookup;
pub mod mortality;
pub mod observers;
pub mod population;
pub mod randomness;
pub mod risk;
pub mod screening;
pub mod simulation;
pub mod time;

pub use config::SimConfig;
pub use environment::RunEnvironment;
pub use error::{Result, SimError};
pub use simulation::Simulation;
