use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::error::{Result, SimError};

pub const DAYS_PER_YEAR: f64 = 365.25;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

pub fn to_years(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / (MILLIS_PER_DAY * DAYS_PER_YEAR)
}

pub fn days(days: f64) -> Duration {
    Duration::milliseconds((days * MILLIS_PER_DAY).round() as i64)
}

pub fn years(years: f64) -> Duration {
    days(years * DAYS_PER_YEAR)
}

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Calendar year used to index year-stratified data.
pub fn data_year(time: NaiveDateTime) -> f64 {
    time.year() as f64
}

#[derive(Debug, Clone)]
pub struct Clock {
    start: NaiveDateTime,
    end: NaiveDateTime,
    now: NaiveDateTime,
    step_size: Duration,
}

impl Clock {
    pub fn new(start: NaiveDate, end: NaiveDate, step_size_days: f64) -> Result<Self> {
        if !(step_size_days > 0.0) {
            return Err(SimError::Config(format!(
                "step size must be positive, got {step_size_days} days"
            )));
        }
        if end <= start {
            return Err(SimError::Config(format!(
                "simulation end {end} is not after start {start}"
            )));
        }
        Ok(Self {
            start: midnight(start),
            end: midnight(end),
            now: midnight(start),
            step_size: days(step_size_days),
        })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn step_size(&self) -> Duration {
        self.step_size
    }

    pub fn step_years(&self) -> f64 {
        to_years(self.step_size)
    }

    /// Time at the end of the current step.
    pub fn event_time(&self) -> NaiveDateTime {
        self.now + self.step_size
    }

    pub fn is_finished(&self) -> bool {
        self.now >= self.end
    }

    pub fn advance(&mut self) {
        self.now += self.step_size;
    }
}
