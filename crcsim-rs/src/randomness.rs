//! Reproducible randomness.
//!
//! Per-simulant draws are a pure function of `(seed, stream, key, time,
//! simulant id)`, so a re-run with the same seed reproduces every decision of
//! every simulant regardless of how many other simulants or draws exist.
//! Per-draw parameters (one value per input draw, shared by all simulants) are
//! sampled from a `StdRng` seeded by the parameter name and draw number.

use chrono::NaiveDateTime;
use rand::{Rng, SeedableRng, distr::Distribution, rngs::StdRng};
use rand_distr::Normal;
use sha2::{Digest, Sha256};
use statrs::distribution::{ContinuousCDF, Normal as NormalDist};

use crate::error::{Result, SimError};
use crate::population::SimulantId;

pub fn hash_key(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

fn to_unit_interval(x: u64) -> f64 {
    (x >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

#[derive(Debug, Clone)]
pub struct Randomness {
    seed: String,
}

impl Randomness {
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into() }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn get_stream(&self, name: impl Into<String>) -> RandomnessStream {
        RandomnessStream {
            name: name.into(),
            seed: self.seed.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomnessStream {
    name: String,
    seed: String,
}

impl RandomnessStream {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn salt(&self, time: NaiveDateTime, additional_key: &str) -> u64 {
        hash_key(&format!(
            "{}_{}_{}_{}",
            self.name,
            additional_key,
            time.format("%Y-%m-%dT%H:%M:%S%.f"),
            self.seed
        ))
    }

    /// One uniform draw in [0, 1) per simulant.
    pub fn get_draw(&self, ids: &[SimulantId], time: NaiveDateTime, additional_key: &str) -> Vec<f64> {
        let salt = self.salt(time, additional_key);
        ids.iter()
            .map(|&id| to_unit_interval(splitmix64(salt ^ splitmix64(id as u64))))
            .collect()
    }

    pub fn draw_one(&self, id: SimulantId, time: NaiveDateTime, additional_key: &str) -> f64 {
        let salt = self.salt(time, additional_key);
        to_unit_interval(splitmix64(salt ^ splitmix64(id as u64)))
    }

    /// Generator for values drawn once per run from this stream.
    pub fn run_rng(&self, input_draw: u32) -> StdRng {
        StdRng::seed_from_u64(hash_key(&format!(
            "{}_{}_draw_{input_draw}",
            self.name, self.seed
        )))
    }
}

fn draw_rng(name: &str, input_draw: u32) -> StdRng {
    StdRng::seed_from_u64(hash_key(&format!("{name}_draw_{input_draw}")))
}

/// A parameter that varies by input draw only.
#[derive(Debug, Clone, Copy)]
pub struct NormalParameter {
    pub name: &'static str,
    pub mean: f64,
    pub sd: f64,
}

impl NormalParameter {
    pub const fn new(name: &'static str, mean: f64, sd: f64) -> Self {
        Self { name, mean, sd }
    }

    pub fn sample(&self, input_draw: u32) -> Result<f64> {
        let distribution = Normal::new(self.mean, self.sd)
            .map_err(|e| SimError::Config(format!("{}: {e}", self.name)))?;
        Ok(distribution.sample(&mut draw_rng(self.name, input_draw)))
    }
}

/// A probability-valued parameter: normal, truncated to [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct TruncnormParameter {
    pub name: &'static str,
    pub mean: f64,
    pub sd: f64,
}

impl TruncnormParameter {
    pub const fn new(name: &'static str, mean: f64, sd: f64) -> Self {
        Self { name, mean, sd }
    }

    pub fn sample(&self, input_draw: u32) -> Result<f64> {
        if self.sd == 0.0 {
            return Ok(self.mean.clamp(0.0, 1.0));
        }
        let distribution = NormalDist::new(self.mean, self.sd)
            .map_err(|e| SimError::Config(format!("{}: {e}", self.name)))?;
        let (lower, upper) = (distribution.cdf(0.0), distribution.cdf(1.0));
        let u: f64 = draw_rng(self.name, input_draw).random();
        let value = distribution.inverse_cdf(lower + u * (upper - lower));
        Ok(value.clamp(0.0, 1.0))
    }
}
