//! Class assignment for approximate SRPT.
//!
//! A new job is ranked by estimated remaining time against the last
//! `num_classes - 1` arrivals, so its rank always falls in `1..=num_classes`.
//! Only that small window is ever compared, never the whole queue. Window
//! estimates are live: service given to a job is credited to its entry too.

use std::collections::VecDeque;

use noisy_float::prelude::*;
use smallvec::SmallVec;
use tracing::trace;

use crate::job::{Job, JobId};

#[derive(Debug, Clone, Copy, PartialEq)]
struct HistoryEntry {
    name: JobId,
    // current ERPT, credited alongside the job
    estimate: f64,
}

#[derive(Debug)]
pub struct ClassAssigner {
    num_classes: usize,
    history: VecDeque<HistoryEntry>,
    class_counts: Vec<u64>,
    class_service: Vec<f64>,
}

impl ClassAssigner {
    pub fn new(num_classes: usize) -> Self {
        debug_assert!(num_classes >= 1, "at least one class is required");
        ClassAssigner {
            num_classes,
            history: VecDeque::with_capacity(num_classes),
            class_counts: vec![0; num_classes],
            class_service: vec![0.0; num_classes],
        }
    }

    /// 1-based rank of `job` among the history window plus itself,
    /// ordered by estimated remaining time with ties going to the earlier arrival.
    pub fn rank(&self, job: &Job) -> usize {
        let mut window: SmallVec<[(N64, JobId); 8]> = self
            .history
            .iter()
            .map(|entry| (n64(entry.estimate), entry.name))
            .collect();
        window.push((n64(job.estimated_remaining), job.name));
        window.sort();

        window
            .iter()
            .position(|&(_, name)| name == job.name)
            .map_or(self.num_classes, |index| index + 1)
    }

    /// Ranks `job`, records it in the per-class totals and slides the history window.
    pub fn assign(&mut self, job: &mut Job) -> usize {
        let class = self.rank(job);
        job.priority_class = class;

        self.class_counts[class - 1] += 1;
        self.class_service[class - 1] += job.real_remaining;

        self.history.push_back(HistoryEntry {
            name: job.name,
            estimate: job.estimated_remaining,
        });
        while self.history.len() > self.num_classes.saturating_sub(1) {
            self.history.pop_front();
        }

        trace!(job = %job.name, class, estimate = job.estimated_remaining, "classified");
        class
    }

    /// Mirrors `Job::serve` for `name`'s window entry, if it is still in the window.
    pub fn credit(&mut self, name: JobId, elapsed: f64) {
        if let Some(entry) = self.history.iter_mut().find(|entry| entry.name == name) {
            entry.estimate -= elapsed;
        }
    }

    pub fn is_terminal(&self, class: usize) -> bool {
        class == self.num_classes
    }

    pub fn history(&self) -> impl Iterator<Item = JobId> + '_ {
        self.history.iter().map(|entry| entry.name)
    }

    /// Number of jobs ever assigned to each class, indexed by `class - 1`.
    pub fn class_counts(&self) -> &[u64] {
        &self.class_counts
    }

    /// Summed real service time of the jobs assigned to each class.
    pub fn class_service(&self) -> &[f64] {
        &self.class_service
    }

    pub fn total_assigned(&self) -> u64 {
        self.class_counts.iter().sum()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.class_counts.iter_mut().for_each(|c| *c = 0);
        self.class_service.iter_mut().for_each(|s| *s = 0.0);
    }
}
