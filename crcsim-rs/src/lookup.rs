//! Piecewise-constant lookup tables over (sex, age, year).
//!
//! Each sex owns a complete rectangular grid of age bins by year bins.
//! Lookups outside the observed range use the nearest edge bin.

use std::collections::BTreeMap;

use crate::error::{Result, SimError};
use crate::population::Sex;

#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub sex: Option<Sex>,
    pub age_start: f64,
    pub age_end: f64,
    pub year_start: Option<f64>,
    pub year_end: Option<f64>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Grid {
    age_edges: Vec<f64>,
    year_edges: Vec<f64>,
    // year-major
    values: Vec<f64>,
}

impl Grid {
    fn n_ages(&self) -> usize {
        self.age_edges.len() - 1
    }

    fn value(&self, age: f64, year: f64) -> f64 {
        let a = bin_index(&self.age_edges, age);
        let y = bin_index(&self.year_edges, year);
        self.values[y * self.n_ages() + a]
    }

    fn same_shape(&self, other: &Grid) -> bool {
        self.age_edges == other.age_edges && self.year_edges == other.year_edges
    }

    /// Widths of every age bin but the last, which may be open-ended.
    fn has_uniform_age_bins(&self, width: f64) -> bool {
        let n_ages = self.n_ages();
        self.age_edges[..n_ages]
            .windows(2)
            .all(|edges| f64::abs(edges[1] - edges[0] - width) < 1e-9)
    }

    fn shift_ages(&self, n_bins: usize) -> Grid {
        let n_ages = self.n_ages();
        let mut values = Vec::with_capacity(self.values.len());
        for row in self.values.chunks(n_ages) {
            values.extend((0..n_ages).map(|a| row[usize::min(a + n_bins, n_ages - 1)]));
        }
        Grid {
            age_edges: self.age_edges.clone(),
            year_edges: self.year_edges.clone(),
            values,
        }
    }
}

fn bin_index(edges: &[f64], x: f64) -> usize {
    let n_bins = edges.len() - 1;
    let upper = edges.partition_point(|edge| *edge <= x);
    upper.saturating_sub(1).min(n_bins - 1)
}

fn unbounded() -> Vec<f64> {
    vec![f64::NEG_INFINITY, f64::INFINITY]
}

fn edges_from_intervals(name: &str, dimension: &str, mut intervals: Vec<(f64, f64)>) -> Result<Vec<f64>> {
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
    intervals.dedup();
    let mut edges = Vec::with_capacity(intervals.len() + 1);
    for window in intervals.windows(2) {
        let ((start, end), (next_start, _)) = (window[0], window[1]);
        if start == next_start {
            return Err(SimError::Data(format!(
                "{name}: overlapping {dimension} bins starting at {start}"
            )));
        }
        if end != next_start {
            return Err(SimError::Data(format!(
                "{name}: {dimension} bins are not contiguous ({start}-{end} then {next_start})"
            )));
        }
    }
    for &(start, end) in &intervals {
        if !(end > start) {
            return Err(SimError::Data(format!(
                "{name}: empty {dimension} bin {start}-{end}"
            )));
        }
        edges.push(start);
    }
    match intervals.last() {
        Some(&(_, end)) => edges.push(end),
        None => return Err(SimError::MissingData(format!("{name}: no {dimension} bins"))),
    }
    Ok(edges)
}

fn build_grid(name: &str, bins: &[&Bin]) -> Result<Grid> {
    let has_years = bins[0].year_start.is_some();
    if bins.iter().any(|b| b.year_start.is_some() != has_years) {
        return Err(SimError::Data(format!("{name}: year columns only partially present")));
    }
    let age_edges = edges_from_intervals(
        name,
        "age",
        bins.iter().map(|b| (b.age_start, b.age_end)).collect(),
    )?;
    let year_edges = if has_years {
        let intervals = bins
            .iter()
            .map(|b| match (b.year_start, b.year_end) {
                (Some(start), Some(end)) => Ok((start, end)),
                _ => Err(SimError::Data(format!("{name}: year_start without year_end"))),
            })
            .collect::<Result<Vec<_>>>()?;
        edges_from_intervals(name, "year", intervals)?
    } else {
        unbounded()
    };

    let n_ages = age_edges.len() - 1;
    let n_years = year_edges.len() - 1;
    let mut values = vec![f64::NAN; n_ages * n_years];
    for bin in bins {
        if !bin.value.is_finite() {
            return Err(SimError::Data(format!(
                "{name}: non-finite value {} for age {}",
                bin.value, bin.age_start
            )));
        }
        let a = bin_index(&age_edges, bin.age_start);
        let y = bin_index(&year_edges, bin.year_start.unwrap_or(0.0));
        let cell = &mut values[y * n_ages + a];
        if !cell.is_nan() {
            return Err(SimError::Data(format!(
                "{name}: duplicate bin for age {} year {:?}",
                bin.age_start, bin.year_start
            )));
        }
        *cell = bin.value;
    }
    if values.iter().any(|v| v.is_nan()) {
        return Err(SimError::Data(format!(
            "{name}: age/year grid has missing cells"
        )));
    }
    Ok(Grid {
        age_edges,
        year_edges,
        values,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    name: String,
    grids: BTreeMap<Sex, Grid>,
}

impl LookupTable {
    pub fn from_bins(name: impl Into<String>, bins: &[Bin]) -> Result<Self> {
        let name = name.into();
        if bins.is_empty() {
            return Err(SimError::MissingData(format!("{name}: table has no rows")));
        }
        let sexed = bins[0].sex.is_some();
        if bins.iter().any(|b| b.sex.is_some() != sexed) {
            return Err(SimError::Data(format!("{name}: sex column only partially present")));
        }
        let mut grids = BTreeMap::new();
        if sexed {
            for sex in Sex::ALL {
                let rows: Vec<&Bin> = bins.iter().filter(|b| b.sex == Some(sex)).collect();
                if rows.is_empty() {
                    return Err(SimError::MissingData(format!(
                        "{name}: no rows for sex {}",
                        sex.label()
                    )));
                }
                grids.insert(sex, build_grid(&name, &rows)?);
            }
        } else {
            let rows: Vec<&Bin> = bins.iter().collect();
            let grid = build_grid(&name, &rows)?;
            for sex in Sex::ALL {
                grids.insert(sex, grid.clone());
            }
        }
        Ok(Self { name, grids })
    }

    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        let grid = Grid {
            age_edges: unbounded(),
            year_edges: unbounded(),
            values: vec![value],
        };
        Self {
            name: name.into(),
            grids: Sex::ALL.iter().map(|&sex| (sex, grid.clone())).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn lookup(&self, age: f64, sex: Sex, year: f64) -> Result<f64> {
        self.grids
            .get(&sex)
            .map(|grid| grid.value(age, year))
            .ok_or_else(|| SimError::MissingData(format!("{}: no data for sex {}", self.name, sex.label())))
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> LookupTable {
        let grids = self
            .grids
            .iter()
            .map(|(&sex, grid)| {
                let mut grid = grid.clone();
                grid.values.iter_mut().for_each(|v| *v = f(*v));
                (sex, grid)
            })
            .collect();
        LookupTable {
            name: self.name.clone(),
            grids,
        }
    }

    /// Cell-wise combination of two tables defined on the same bins.
    pub fn zip_with(&self, other: &LookupTable, f: impl Fn(f64, f64) -> f64) -> Result<LookupTable> {
        let mut grids = BTreeMap::new();
        for (&sex, grid) in &self.grids {
            let other_grid = other.grids.get(&sex).ok_or_else(|| {
                SimError::MissingData(format!("{}: no data for sex {}", other.name, sex.label()))
            })?;
            if !grid.same_shape(other_grid) {
                return Err(SimError::Data(format!(
                    "{} and {} are not defined on the same age/year bins",
                    self.name, other.name
                )));
            }
            let mut combined = grid.clone();
            for (value, other_value) in combined.values.iter_mut().zip(&other_grid.values) {
                *value = f(*value, *other_value);
            }
            grids.insert(sex, combined);
        }
        Ok(LookupTable {
            name: self.name.clone(),
            grids,
        })
    }

    /// Each age bin takes the value observed `n_bins` bins above it; the
    /// highest bins carry the last observed value forward.
    pub fn shift_age_bins(&self, n_bins: usize) -> LookupTable {
        LookupTable {
            name: self.name.clone(),
            grids: self
                .grids
                .iter()
                .map(|(&sex, grid)| (sex, grid.shift_ages(n_bins)))
                .collect(),
        }
    }

    /// Value at `age + shift_years`, read from bins of width `bin_width` and
    /// linearly mixed between the floor and ceiling whole-bin shifts. Every
    /// age bin except the oldest must be `bin_width` years wide.
    pub fn age_shifted(&self, shift_years: f64, bin_width: f64) -> Result<LookupTable> {
        if !(shift_years >= 0.0) || !(bin_width > 0.0) {
            return Err(SimError::Config(format!(
                "{}: cannot shift by {shift_years} years with bin width {bin_width}",
                self.name
            )));
        }
        if let Some((sex, grid)) = self
            .grids
            .iter()
            .find(|(_, grid)| !grid.has_uniform_age_bins(bin_width))
        {
            return Err(SimError::Data(format!(
                "{}: age bins for sex {} are not {bin_width} years wide (edges {:?})",
                self.name,
                sex.label(),
                grid.age_edges
            )));
        }
        let whole_bins = (shift_years / bin_width).floor();
        let fraction = (shift_years % bin_width) / bin_width;
        let floor = self.shift_age_bins(whole_bins as usize);
        if fraction == 0.0 {
            return Ok(floor);
        }
        let ceiling = self.shift_age_bins(whole_bins as usize + 1);
        floor.zip_with(&ceiling, |low, high| low * (1.0 - fraction) + high * fraction)
    }

    pub fn validate_non_negative(&self) -> Result<()> {
        self.validate_range(0.0, f64::INFINITY)
    }

    pub fn validate_range(&self, min: f64, max: f64) -> Result<()> {
        for (sex, grid) in &self.grids {
            if let Some(value) = grid.values.iter().find(|v| **v < min || **v > max) {
                return Err(SimError::Data(format!(
                    "{}: value {value} for sex {} is outside [{min}, {max}]",
                    self.name,
                    sex.label()
                )));
            }
        }
        Ok(())
    }
}
