use std::fmt;

use rand::Rng;

use crate::dist::{Dist, ErrorRange};

/// Class value of a job that has not been ranked yet.
pub const UNASSIGNED: usize = usize::MAX;

/// Sequential job name, assigned in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job{:02}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub name: JobId,
    pub arrival_time: f64,
    // sampled total service requirement
    pub service_time: f64,
    // RPT
    pub real_remaining: f64,
    // ERPT
    pub estimated_remaining: f64,
    pub percent_error: f64,
    pub priority_class: usize,
    pub arrival_rate: f64,
    pub process_rate: f64,
}

impl Job {
    /// Builds a job whose estimate is off from its real size by `percent_error` percent.
    pub fn new(name: JobId, arrival_time: f64, service_time: f64, percent_error: f64) -> Job {
        Job {
            name,
            arrival_time,
            service_time,
            real_remaining: service_time,
            estimated_remaining: service_time * (1.0 + percent_error / 100.0),
            percent_error,
            priority_class: UNASSIGNED,
            arrival_rate: 0.0,
            process_rate: 0.0,
        }
    }

    /// Draws the service time and estimation error for a new arrival.
    pub fn sample<R: Rng>(
        name: JobId,
        arrival_time: f64,
        service: &Dist,
        error: &ErrorRange,
        rng: &mut R,
    ) -> Job {
        let service_time = service.sample(rng);
        let percent_error = error.sample(rng);
        Job::new(name, arrival_time, service_time, percent_error)
    }

    pub fn with_rates(mut self, arrival_rate: f64, process_rate: f64) -> Job {
        self.arrival_rate = arrival_rate;
        self.process_rate = process_rate;
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.priority_class != UNASSIGNED
    }

    /// Credits `elapsed` units of service to both the real and estimated remaining time.
    pub fn serve(&mut self, elapsed: f64) {
        self.real_remaining = (self.real_remaining - elapsed).max(0.0);
        self.estimated_remaining -= elapsed;
    }
}
