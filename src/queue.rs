use std::collections::VecDeque;

use noisy_float::prelude::*;

use crate::error::SimError;
use crate::job::Job;

/// How a newly classified job is placed among the queued jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    // (class, name) ascending
    ByClass,
    // (class, estimated remaining) ascending, after equal estimates
    ByEstimate,
    // front of the terminal class segment
    Lcfs,
    // tail, regardless of class
    Fcfs,
}

/// Jobs that have arrived and not yet completed. The head is the job that runs next.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn head(&self) -> Option<&Job> {
        self.jobs.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut Job> {
        self.jobs.front_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn insert(&mut self, job: Job, policy: InsertPolicy, num_classes: usize) {
        match policy {
            InsertPolicy::ByClass => self.insert_by_class(job),
            InsertPolicy::ByEstimate => self.insert_by_estimate(job),
            InsertPolicy::Lcfs => self.insert_terminal(job, num_classes),
            InsertPolicy::Fcfs => self.jobs.push_back(job),
        }
    }

    pub fn insert_by_class(&mut self, job: Job) {
        let key = (job.priority_class, job.name);
        let index = self
            .jobs
            .iter()
            .position(|queued| (queued.priority_class, queued.name) > key)
            .unwrap_or(self.jobs.len());
        self.jobs.insert(index, job);
    }

    pub fn insert_by_estimate(&mut self, job: Job) {
        let class = job.priority_class;
        let estimate = n64(job.estimated_remaining);
        let index = self
            .jobs
            .iter()
            .position(|queued| {
                queued.priority_class > class
                    || (queued.priority_class == class
                        && n64(queued.estimated_remaining) > estimate)
            })
            .unwrap_or(self.jobs.len());
        self.jobs.insert(index, job);
    }

    /// Inserts ahead of every job of class `num_classes`, behind all lower classes.
    pub fn insert_terminal(&mut self, job: Job, num_classes: usize) {
        let index = self
            .jobs
            .iter()
            .position(|queued| queued.priority_class >= num_classes)
            .unwrap_or(self.jobs.len());
        self.jobs.insert(index, job);
    }

    pub fn remove_head(&mut self) -> Result<Job, SimError> {
        self.jobs.pop_front().ok_or(SimError::EmptyQueue)
    }

    /// Occupancy per class: slot `c - 1` for class `c`, slot `num_classes` for anything out of range.
    pub fn count_by_class(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes + 1];
        for job in &self.jobs {
            let class = job.priority_class;
            if (1..=num_classes).contains(&class) {
                counts[class - 1] += 1;
            } else {
                counts[num_classes] += 1;
            }
        }
        counts
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}
