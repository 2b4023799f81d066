//! Event loop for a single preemptive-resume server.
//!
//! Two events drive the clock: the next arrival and the completion of the job
//! in service. When both fall on the same instant the completion is handled
//! first. After every arrival the queue head is taken as the job to run, so a
//! job ranked into a better class takes the server immediately and the job it
//! displaces keeps whatever service it has already received.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::prelude::*;
use serde::Deserialize;
use tracing::{debug, info};

use crate::classify::ClassAssigner;
use crate::dist::{Dist, ErrorRange};
use crate::error::{ConfigError, SimError};
use crate::job::{Job, JobId};
use crate::queue::{InsertPolicy, JobQueue};
use crate::stats::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Class-based approximation of shortest remaining processing time.
    #[default]
    ApproxSrpt,
    /// First-come first-served; classes are still assigned for load statistics.
    Fcfs,
}

/// Ordering inside the terminal class under [`Policy::ApproxSrpt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalOrder {
    #[default]
    Lcfs,
    Estimate,
}

#[derive(Debug, Clone)]
pub struct EngineParams {
    pub arrival_rate: f64,
    pub process_rate: f64,
    pub interarrival: Dist,
    pub service: Dist,
    pub error: ErrorRange,
    pub num_classes: usize,
    pub simulation_length: f64,
    pub seed: u64,
    pub policy: Policy,
    pub terminal_order: TerminalOrder,
}

impl EngineParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.arrival_rate > 0.0) || !self.arrival_rate.is_finite() {
            return Err(ConfigError::invalid(format!(
                "arrival rate must be positive and finite (got {})",
                self.arrival_rate
            )));
        }
        if !(self.process_rate > 0.0) || !self.process_rate.is_finite() {
            return Err(ConfigError::invalid(format!(
                "processing rate must be positive and finite (got {})",
                self.process_rate
            )));
        }
        if self.num_classes == 0 {
            return Err(ConfigError::invalid("there must be at least one class"));
        }
        if !(self.simulation_length > 0.0) {
            return Err(ConfigError::invalid(format!(
                "simulation length must be positive (got {})",
                self.simulation_length
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Arrived,
    ServiceBegan,
    Completed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Arrived => write!(f, "arrived"),
            EventKind::ServiceBegan => write!(f, "processing"),
            EventKind::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub time: f64,
    pub job: JobId,
    pub kind: EventKind,
    pub priority_class: usize,
    // real remaining time at the moment of the event
    pub remaining: f64,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6} | {} {}, class = {}, RPT = {:.4}",
            self.time, self.job, self.kind, self.priority_class, self.remaining
        )
    }
}

/// One row of the arrivals ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalRecord {
    pub job: JobId,
    pub arrival_time: f64,
    pub rpt: f64,
    pub erpt: f64,
    pub percent_error: f64,
    pub priority_class: usize,
}

impl From<&Job> for ArrivalRecord {
    fn from(job: &Job) -> Self {
        ArrivalRecord {
            job: job.name,
            arrival_time: job.arrival_time,
            rpt: job.real_remaining,
            erpt: job.estimated_remaining,
            percent_error: job.percent_error,
            priority_class: job.priority_class,
        }
    }
}

/// Per-class load estimate taken right after an arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSample {
    pub time: f64,
    pub loads: Vec<f64>,
}

/// Receives records as the run produces them. Observers cannot touch engine state.
pub trait RunObserver {
    fn on_event(&mut self, _event: &EventRecord) {}

    fn on_arrival(&mut self, _arrival: &ArrivalRecord) {}

    fn on_load_sample(&mut self, _sample: &LoadSample) {}
}

impl RunObserver for () {}

impl<O: RunObserver + ?Sized> RunObserver for &mut O {
    fn on_event(&mut self, event: &EventRecord) {
        (**self).on_event(event)
    }

    fn on_arrival(&mut self, arrival: &ArrivalRecord) {
        (**self).on_arrival(arrival)
    }

    fn on_load_sample(&mut self, sample: &LoadSample) {
        (**self).on_load_sample(sample)
    }
}

/// Cooperative cancellation, checked once per event.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub seed: u64,
    pub end_time: f64,
    pub stopped: bool,
    pub arrivals: u64,
    pub completions: u64,
    pub average_number_in_system: f64,
    pub average_number_per_class: Vec<f64>,
    pub per_class_load: Vec<f64>,
    pub completion_order: Vec<JobId>,
    pub mean_response_time: f64,
    pub mean_abs_percent_error: f64,
}

/// A validated, not yet started run.
#[derive(Debug)]
pub struct RunHandle {
    params: EngineParams,
    stop: StopToken,
}

impl RunHandle {
    pub fn new(params: EngineParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(RunHandle {
            params,
            stop: StopToken::new(),
        })
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn run(self) -> Result<RunResult, SimError> {
        self.run_with(&mut ())
    }

    pub fn run_with<O: RunObserver>(self, observer: &mut O) -> Result<RunResult, SimError> {
        Engine::new(&self.params, self.stop, observer).run()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Arrival,
    Completion,
}

struct Engine<'a, O: RunObserver> {
    params: &'a EngineParams,
    rng: StdRng,
    queue: JobQueue,
    assigner: ClassAssigner,
    stats: Statistics,
    observer: &'a mut O,
    stop: StopToken,

    current_time: f64,
    next_arrival: f64,
    service_start: f64,
    service_finish: f64,
    server_busy: bool,
    in_service: Option<JobId>,
    next_name: u64,
    completion_order: Vec<JobId>,
}

impl<'a, O: RunObserver> Engine<'a, O> {
    fn new(params: &'a EngineParams, stop: StopToken, observer: &'a mut O) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let next_arrival = params.interarrival.sample(&mut rng);
        Engine {
            params,
            rng,
            queue: JobQueue::new(),
            assigner: ClassAssigner::new(params.num_classes),
            stats: Statistics::new(params.num_classes),
            observer,
            stop,
            current_time: 0.0,
            next_arrival,
            service_start: 0.0,
            service_finish: 0.0,
            server_busy: false,
            in_service: None,
            next_name: 0,
            completion_order: Vec::new(),
        }
    }

    fn run(mut self) -> Result<RunResult, SimError> {
        info!(
            seed = self.params.seed,
            arrival_rate = self.params.arrival_rate,
            service = %self.params.service,
            num_classes = self.params.num_classes,
            length = self.params.simulation_length,
            "simulation started"
        );

        let mut stopped = false;
        loop {
            if self.stop.is_stopped() {
                stopped = true;
                break;
            }
            let next = self.next_step();
            let at = match next {
                Step::Arrival => self.next_arrival,
                Step::Completion => self.service_finish,
            };
            if !at.is_finite() || at > self.params.simulation_length {
                break;
            }
            self.step(next)?;
        }

        if !stopped {
            // close the time averages at the horizon
            self.current_time = self.params.simulation_length;
            self.observe_occupancy();
        }

        let result = self.finish(stopped);
        info!(
            arrivals = result.arrivals,
            completions = result.completions,
            avg_in_system = result.average_number_in_system,
            stopped,
            "simulation finished"
        );
        Ok(result)
    }

    fn next_step(&self) -> Step {
        if !self.server_busy || self.next_arrival < self.service_finish {
            Step::Arrival
        } else {
            Step::Completion
        }
    }

    fn step(&mut self, next: Step) -> Result<(), SimError> {
        match next {
            Step::Arrival => {
                self.current_time = self.next_arrival;
                self.arrival()
            }
            Step::Completion => {
                self.current_time = self.service_finish;
                self.completion()?;
                if !self.queue.is_empty() {
                    self.begin_service()?;
                }
                Ok(())
            }
        }
    }

    fn arrival(&mut self) -> Result<(), SimError> {
        self.credit_service();

        let name = JobId(self.next_name);
        self.next_name += 1;
        let mut job = Job::sample(
            name,
            self.current_time,
            &self.params.service,
            &self.params.error,
            &mut self.rng,
        )
        .with_rates(self.params.arrival_rate, self.params.process_rate);

        let class = self.assigner.assign(&mut job);
        self.stats.record_arrival(job.percent_error);
        self.stats.update_loads(
            self.params.arrival_rate,
            self.assigner.class_counts(),
            self.assigner.class_service(),
        );
        self.observer.on_load_sample(&LoadSample {
            time: self.current_time,
            loads: self.stats.loads().to_vec(),
        });
        self.observer.on_arrival(&ArrivalRecord::from(&job));

        let event = EventRecord {
            time: self.current_time,
            job: name,
            kind: EventKind::Arrived,
            priority_class: class,
            remaining: job.real_remaining,
        };
        let policy = self.insert_policy(class);
        self.queue.insert(job, policy, self.params.num_classes);
        self.observe_occupancy();
        self.observer.on_event(&event);

        self.begin_service()?;
        self.next_arrival = self.current_time + self.params.interarrival.sample(&mut self.rng);
        Ok(())
    }

    fn completion(&mut self) -> Result<(), SimError> {
        self.credit_service();
        let mut job = self.queue.remove_head()?;
        debug_assert_eq!(Some(job.name), self.in_service, "completed job was not in service");
        job.real_remaining = 0.0;

        self.completion_order.push(job.name);
        self.stats
            .record_completion(self.current_time - job.arrival_time);
        self.server_busy = false;
        self.in_service = None;
        // sampled after remove_head, not before: the finished job is not counted
        self.observe_occupancy();

        self.observer.on_event(&EventRecord {
            time: self.current_time,
            job: job.name,
            kind: EventKind::Completed,
            priority_class: job.priority_class,
            remaining: 0.0,
        });
        Ok(())
    }

    /// Puts the queue head in service, from whatever it has left.
    fn begin_service(&mut self) -> Result<(), SimError> {
        let head = self.queue.head().ok_or(SimError::EmptyQueue)?;
        let (name, class, remaining) = (head.name, head.priority_class, head.real_remaining);

        let continuing = self.server_busy && self.in_service == Some(name);
        self.service_start = self.current_time;
        self.service_finish = self.current_time + remaining;
        self.server_busy = true;
        self.in_service = Some(name);

        if !continuing {
            self.observer.on_event(&EventRecord {
                time: self.current_time,
                job: name,
                kind: EventKind::ServiceBegan,
                priority_class: class,
                remaining,
            });
        }
        Ok(())
    }

    // the job in service is always the queue head
    fn credit_service(&mut self) {
        if !self.server_busy {
            return;
        }
        let elapsed = self.current_time - self.service_start;
        if let Some(job) = self.queue.head_mut() {
            debug_assert_eq!(Some(job.name), self.in_service);
            job.serve(elapsed);
            self.assigner.credit(job.name, elapsed);
        }
        self.service_start = self.current_time;
    }

    fn insert_policy(&self, class: usize) -> InsertPolicy {
        match self.params.policy {
            Policy::Fcfs => InsertPolicy::Fcfs,
            Policy::ApproxSrpt if self.assigner.is_terminal(class) => {
                match self.params.terminal_order {
                    TerminalOrder::Lcfs => InsertPolicy::Lcfs,
                    TerminalOrder::Estimate => InsertPolicy::ByEstimate,
                }
            }
            Policy::ApproxSrpt => InsertPolicy::ByClass,
        }
    }

    fn observe_occupancy(&mut self) {
        let counts = self.queue.count_by_class(self.params.num_classes);
        debug_assert_eq!(counts.iter().sum::<usize>(), self.queue.len());
        self.stats
            .observe_occupancy(self.current_time, self.queue.len(), &counts);
        debug!(time = self.current_time, in_system = self.queue.len(), ?counts, "occupancy");
    }

    fn finish(self, stopped: bool) -> RunResult {
        RunResult {
            seed: self.params.seed,
            end_time: self.current_time,
            stopped,
            arrivals: self.stats.arrivals(),
            completions: self.stats.completions(),
            average_number_in_system: self.stats.average_in_system(),
            average_number_per_class: self.stats.average_per_class(),
            per_class_load: self.stats.loads().to_vec(),
            completion_order: self.completion_order,
            mean_response_time: self.stats.mean_response_time(),
            mean_abs_percent_error: self.stats.mean_abs_percent_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::CustomSampler;
    use crate::output::Recorder;
    use std::sync::atomic::AtomicUsize;

    fn scripted(values: &[f64], then: f64) -> Dist {
        let values = values.to_vec();
        let next = AtomicUsize::new(0);
        Dist::Custom(CustomSampler::new("scripted", move |_rng| {
            let i = next.fetch_add(1, Ordering::SeqCst);
            values.get(i).copied().unwrap_or(then)
        }))
    }

    fn params(num_classes: usize, interarrival: Dist, service: Dist) -> EngineParams {
        EngineParams {
            arrival_rate: 1.0,
            process_rate: 1.0,
            interarrival,
            service,
            error: ErrorRange::EXACT,
            num_classes,
            simulation_length: 100.0,
            seed: 1,
            policy: Policy::ApproxSrpt,
            terminal_order: TerminalOrder::Lcfs,
        }
    }

    fn random_params(num_classes: usize, seed: u64) -> EngineParams {
        EngineParams {
            arrival_rate: 0.9,
            process_rate: 1.0,
            interarrival: Dist::expon(0.9).unwrap(),
            service: Dist::expon(1.0).unwrap(),
            error: ErrorRange::new(-20.0, 20.0).unwrap(),
            num_classes,
            simulation_length: 2000.0,
            seed,
            policy: Policy::ApproxSrpt,
            terminal_order: TerminalOrder::Lcfs,
        }
    }

    fn began(events: &[EventRecord]) -> Vec<(f64, u64, f64)> {
        events
            .iter()
            .filter(|e| e.kind == EventKind::ServiceBegan)
            .map(|e| (e.time, e.job.0, e.remaining))
            .collect()
    }

    #[test]
    fn better_class_preempts_and_keeps_progress() {
        // Job00 (size 1) arrives at 0 so that A (Job01, size 10) lands in class 2 at t=1;
        // B (Job02, size 2) arrives at t=3 and ranks into class 1
        let p = params(2, scripted(&[0.0, 1.0, 2.0], 1000.0), scripted(&[1.0, 10.0, 2.0], 1.0));
        let mut rec = Recorder::default();
        let result = RunHandle::new(p).unwrap().run_with(&mut rec).unwrap();

        assert_eq!(rec.arrivals[1].priority_class, 2);
        assert_eq!(rec.arrivals[2].priority_class, 1);
        assert_eq!(
            began(&rec.events),
            vec![(0.0, 0, 1.0), (1.0, 1, 10.0), (3.0, 2, 2.0), (5.0, 1, 8.0)]
        );
        assert_eq!(result.completion_order, vec![JobId(0), JobId(2), JobId(1)]);
        assert_eq!(result.arrivals, 3);
        assert_eq!(result.completions, 3);
    }

    #[test]
    fn ranking_sees_service_already_given() {
        // Job00 (size 10) has 4 left when Job01 (size 5) arrives at t=6
        let p = params(2, scripted(&[0.0, 6.0], 1000.0), scripted(&[10.0, 5.0], 1.0));
        let mut rec = Recorder::default();
        let result = RunHandle::new(p).unwrap().run_with(&mut rec).unwrap();

        let classes: Vec<_> = rec.arrivals.iter().map(|a| a.priority_class).collect();
        assert_eq!(classes, vec![1, 2]);
        assert_eq!(result.completion_order, vec![JobId(0), JobId(1)]);
        assert!(!rec
            .events
            .iter()
            .any(|e| e.kind == EventKind::ServiceBegan && e.job == JobId(1) && e.time == 6.0));
    }

    #[test]
    fn heavy_tailed_service_with_huge_bound_finishes() {
        let mut p = random_params(4, 21);
        p.service = Dist::BoundedPareto(crate::dist::BoundedPareto::new(2.0, 1.0, 1e200).unwrap());
        p.simulation_length = 500.0;
        let result = RunHandle::new(p).unwrap().run().unwrap();
        assert!(result.arrivals > 0);
        assert!(result.average_number_in_system.is_finite());
        assert_eq!(result.end_time, 500.0);
    }

    #[test]
    fn non_finite_event_time_ends_the_run() {
        // a zero rate puts the first arrival at infinity
        let mut p = random_params(2, 4);
        p.interarrival = Dist::Expon(0.0);
        let result = RunHandle::new(p).unwrap().run().unwrap();
        assert_eq!(result.arrivals, 0);
        assert_eq!(result.end_time, 2000.0);
    }

    #[test]
    fn equal_times_complete_before_arriving() {
        let p = params(2, scripted(&[0.0, 1.0, 2.0], 1000.0), scripted(&[1.0, 10.0, 2.0], 1.0));
        let mut rec = Recorder::default();
        RunHandle::new(p).unwrap().run_with(&mut rec).unwrap();

        let at_one: Vec<_> = rec
            .events
            .iter()
            .filter(|e| e.time == 1.0)
            .map(|e| (e.kind, e.job.0))
            .collect();
        assert_eq!(
            at_one,
            vec![
                (EventKind::Completed, 0),
                (EventKind::Arrived, 1),
                (EventKind::ServiceBegan, 1)
            ]
        );
    }

    #[test]
    fn single_class_is_preemptive_lcfs() {
        let p = params(1, scripted(&[1.0, 0.1, 0.1], 1000.0), scripted(&[10.0, 10.0, 10.0], 1.0));
        let result = RunHandle::new(p).unwrap().run().unwrap();
        assert_eq!(result.completion_order, vec![JobId(2), JobId(1), JobId(0)]);
    }

    #[test]
    fn fcfs_serves_in_arrival_order() {
        let mut p = params(3, scripted(&[1.0, 0.1, 0.1], 1000.0), scripted(&[10.0, 1.0, 5.0], 1.0));
        p.policy = Policy::Fcfs;
        let result = RunHandle::new(p).unwrap().run().unwrap();
        assert_eq!(result.completion_order, vec![JobId(0), JobId(1), JobId(2)]);
    }

    #[test]
    fn terminal_estimate_order() {
        // Job01 (9) and Job03 (12) share the terminal class; ordered by estimate the older
        // job stays ahead, under LCFS the newer one would jump it
        let interarrival = || scripted(&[1.0, 0.1, 0.1, 0.1], 1000.0);
        let service = || scripted(&[1.0, 9.0, 0.5, 12.0], 1.0);

        let mut p = params(2, interarrival(), service());
        p.terminal_order = TerminalOrder::Estimate;
        let mut rec = Recorder::default();
        let result = RunHandle::new(p).unwrap().run_with(&mut rec).unwrap();
        let classes: Vec<_> = rec.arrivals.iter().map(|a| a.priority_class).collect();
        assert_eq!(classes, vec![1, 2, 1, 2]);
        assert_eq!(
            result.completion_order,
            vec![JobId(0), JobId(2), JobId(1), JobId(3)]
        );

        let lcfs = RunHandle::new(params(2, interarrival(), service()))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(
            lcfs.completion_order,
            vec![JobId(0), JobId(2), JobId(3), JobId(1)]
        );
    }

    #[test]
    fn completion_drops_the_finished_job_from_occupancy() {
        // one unit of work in a horizon of 10
        let mut p = params(2, scripted(&[0.0], 1000.0), scripted(&[1.0], 1.0));
        p.simulation_length = 10.0;
        let result = RunHandle::new(p).unwrap().run().unwrap();
        assert_eq!(result.completions, 1);
        assert!((result.average_number_in_system - 0.1).abs() < 1e-9);
        assert!((result.average_number_per_class[0] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn constant_occupancy_average() {
        // one job of size 200 occupies the whole horizon
        let mut p = params(2, scripted(&[0.0], 1000.0), scripted(&[200.0], 1.0));
        p.simulation_length = 50.0;
        let result = RunHandle::new(p).unwrap().run().unwrap();
        assert!((result.average_number_in_system - 1.0).abs() < 1e-9);
        assert!((result.average_number_per_class[0] - 1.0).abs() < 1e-9);
        assert_eq!(result.average_number_per_class[1], 0.0);
        assert_eq!(result.end_time, 50.0);
        assert!(result.completion_order.is_empty());
    }

    #[test]
    fn engine_invariants_hold_every_step() {
        for num_classes in [1, 2, 4, 7] {
            let p = random_params(num_classes, 17 + num_classes as u64);
            let mut observer = ();
            let mut engine = Engine::new(&p, StopToken::new(), &mut observer);
            for _ in 0..5000 {
                let next = engine.next_step();
                engine.step(next).unwrap();

                let counts = engine.queue.count_by_class(num_classes);
                assert_eq!(counts.iter().sum::<usize>(), engine.queue.len());
                assert_eq!(counts[num_classes], 0);

                let classes: Vec<_> = engine.queue.iter().map(|j| j.priority_class).collect();
                assert!(classes.windows(2).all(|w| w[0] <= w[1]), "{classes:?}");

                if engine.server_busy {
                    assert_eq!(engine.queue.head().map(|j| j.name), engine.in_service);
                } else {
                    assert!(engine.queue.is_empty());
                }
                for job in engine.queue.iter() {
                    assert!(job.real_remaining >= 0.0);
                    assert!((1..=num_classes).contains(&job.priority_class));
                }
            }
        }
    }

    #[test]
    fn estimates_respect_error_bounds() {
        let mut p = random_params(4, 99);
        p.error = ErrorRange::new(-10.0, 10.0).unwrap();
        let mut rec = Recorder::default();
        let result = RunHandle::new(p).unwrap().run_with(&mut rec).unwrap();
        assert!(result.arrivals > 100);
        for arrival in rec.arrivals.iter().filter(|a| a.rpt > 0.0) {
            let ratio = arrival.erpt / arrival.rpt;
            assert!((0.9 - 1e-12..=1.1 + 1e-12).contains(&ratio), "ratio {ratio}");
        }
        assert!(result.mean_abs_percent_error <= 10.0);
    }

    #[test]
    fn loads_follow_class_aggregates() {
        let p = random_params(3, 5);
        let arrival_rate = p.arrival_rate;
        let mut rec = Recorder::default();
        let result = RunHandle::new(p).unwrap().run_with(&mut rec).unwrap();

        let mut counts = [0u64; 3];
        let mut service = [0.0f64; 3];
        for a in &rec.arrivals {
            counts[a.priority_class - 1] += 1;
            service[a.priority_class - 1] += a.rpt;
        }
        let total = rec.arrivals.len() as f64;
        for i in 0..3 {
            let expected = arrival_rate * service[i] / total;
            assert!((result.per_class_load[i] - expected).abs() < 1e-9);
        }
        assert_eq!(rec.loads.len(), rec.arrivals.len());
        assert_eq!(rec.loads.last().map(|s| s.loads.clone()), Some(result.per_class_load));
    }

    #[test]
    fn same_seed_same_run() {
        let a = RunHandle::new(random_params(4, 1234)).unwrap().run().unwrap();
        let b = RunHandle::new(random_params(4, 1234)).unwrap().run().unwrap();
        assert_eq!(a, b);
        let c = RunHandle::new(random_params(4, 4321)).unwrap().run().unwrap();
        assert_ne!(a.completion_order, c.completion_order);
    }

    #[test]
    fn stop_token_ends_run_at_event_boundary() {
        struct StopAfter {
            token: StopToken,
            seen: usize,
        }
        impl RunObserver for StopAfter {
            fn on_event(&mut self, _event: &EventRecord) {
                self.seen += 1;
                if self.seen == 10 {
                    self.token.stop();
                }
            }
        }

        let handle = RunHandle::new(random_params(3, 8)).unwrap();
        let mut observer = StopAfter {
            token: handle.stop_token(),
            seen: 0,
        };
        let result = handle.run_with(&mut observer).unwrap();
        assert!(result.stopped);
        assert!(result.arrivals < 10);
        assert!(result.end_time < 2000.0);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let mut p = random_params(3, 1);
        p.num_classes = 0;
        assert!(RunHandle::new(p).is_err());

        let mut p = random_params(3, 1);
        p.simulation_length = 0.0;
        assert!(RunHandle::new(p).is_err());

        let mut p = random_params(3, 1);
        p.arrival_rate = -1.0;
        assert!(RunHandle::new(p).is_err());
    }

    #[test]
    fn begin_service_on_empty_queue_fails() {
        let p = random_params(2, 1);
        let mut observer = ();
        let mut engine = Engine::new(&p, StopToken::new(), &mut observer);
        assert!(matches!(engine.begin_service(), Err(SimError::EmptyQueue)));
        assert!(matches!(engine.completion(), Err(SimError::EmptyQueue)));
    }
}
