//! Observers for a run: an in-memory recorder, a tracing sink and the CSV ledgers.
//!
//! Observers only ever see finished records. The CSV sinks cannot fail from
//! inside a callback, so they hold on to the first error and report it from
//! `finish`.

use std::fs::File;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, trace};

use crate::engine::{ArrivalRecord, EventRecord, LoadSample, RunObserver};
use crate::error::SimError;

pub const ARRIVALS_HEADER: [&str; 6] = ["job", "arrival_time", "rpt", "erpt", "percent_error", "class"];

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<EventRecord>,
    pub arrivals: Vec<ArrivalRecord>,
    pub loads: Vec<LoadSample>,
}

impl RunObserver for Recorder {
    fn on_event(&mut self, event: &EventRecord) {
        self.events.push(event.clone());
    }

    fn on_arrival(&mut self, arrival: &ArrivalRecord) {
        self.arrivals.push(arrival.clone());
    }

    fn on_load_sample(&mut self, sample: &LoadSample) {
        self.loads.push(sample.clone());
    }
}

/// Event records at `debug`, load samples at `trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl RunObserver for LogSink {
    fn on_event(&mut self, event: &EventRecord) {
        debug!(
            time = event.time,
            job = %event.job,
            kind = %event.kind,
            class = event.priority_class,
            remaining = event.remaining,
            "{event}"
        );
    }

    fn on_load_sample(&mut self, sample: &LoadSample) {
        trace!(time = sample.time, loads = ?sample.loads, "load per class");
    }
}

impl<O: RunObserver> RunObserver for Option<O> {
    fn on_event(&mut self, event: &EventRecord) {
        if let Some(o) = self {
            o.on_event(event);
        }
    }

    fn on_arrival(&mut self, arrival: &ArrivalRecord) {
        if let Some(o) = self {
            o.on_arrival(arrival);
        }
    }

    fn on_load_sample(&mut self, sample: &LoadSample) {
        if let Some(o) = self {
            o.on_load_sample(sample);
        }
    }
}

// fan out to both
impl<A: RunObserver, B: RunObserver> RunObserver for (A, B) {
    fn on_event(&mut self, event: &EventRecord) {
        self.0.on_event(event);
        self.1.on_event(event);
    }

    fn on_arrival(&mut self, arrival: &ArrivalRecord) {
        self.0.on_arrival(arrival);
        self.1.on_arrival(arrival);
    }

    fn on_load_sample(&mut self, sample: &LoadSample) {
        self.0.on_load_sample(sample);
        self.1.on_load_sample(sample);
    }
}

#[derive(Serialize)]
struct ArrivalRow {
    job: String,
    arrival_time: f64,
    rpt: f64,
    erpt: f64,
    percent_error: f64,
    class: usize,
}

impl From<&ArrivalRecord> for ArrivalRow {
    fn from(record: &ArrivalRecord) -> Self {
        ArrivalRow {
            job: record.job.to_string(),
            arrival_time: record.arrival_time,
            rpt: record.rpt,
            erpt: record.erpt,
            percent_error: record.percent_error,
            class: record.priority_class,
        }
    }
}

fn headerless<W: io::Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().has_headers(false).from_writer(writer)
}

fn into_inner<W: io::Write>(writer: csv::Writer<W>) -> Result<W, SimError> {
    writer
        .into_inner()
        .map_err(|e| SimError::Io(e.into_error()))
}

/// One row per arrival: `job,arrival_time,rpt,erpt,percent_error,class`.
pub struct ArrivalLedger<W: io::Write> {
    writer: csv::Writer<W>,
    error: Option<csv::Error>,
    rows: usize,
}

impl ArrivalLedger<File> {
    pub fn create(path: &Path) -> Result<Self, SimError> {
        ArrivalLedger::new(File::create(path)?)
    }
}

impl<W: io::Write> ArrivalLedger<W> {
    pub fn new(writer: W) -> Result<Self, SimError> {
        let mut writer = headerless(writer);
        writer.write_record(ARRIVALS_HEADER)?;
        Ok(ArrivalLedger {
            writer,
            error: None,
            rows: 0,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes and hands back the writer, or the first error seen while writing.
    pub fn finish(mut self) -> Result<W, SimError> {
        if let Some(e) = self.error.take() {
            return Err(e.into());
        }
        self.writer.flush()?;
        into_inner(self.writer)
    }
}

impl<W: io::Write> RunObserver for ArrivalLedger<W> {
    fn on_arrival(&mut self, arrival: &ArrivalRecord) {
        if self.error.is_some() {
            return;
        }
        match self.writer.serialize(ArrivalRow::from(arrival)) {
            Ok(()) => self.rows += 1,
            Err(e) => self.error = Some(e),
        }
    }
}

/// Per-class load after each arrival: `time,class_1,...,class_n`.
pub struct LoadLedger<W: io::Write> {
    writer: csv::Writer<W>,
    error: Option<csv::Error>,
    num_classes: usize,
}

impl LoadLedger<File> {
    pub fn create(path: &Path, num_classes: usize) -> Result<Self, SimError> {
        LoadLedger::new(File::create(path)?, num_classes)
    }
}

impl<W: io::Write> LoadLedger<W> {
    pub fn new(writer: W, num_classes: usize) -> Result<Self, SimError> {
        let mut writer = headerless(writer);
        let header = std::iter::once("time".to_string())
            .chain((1..=num_classes).map(|c| format!("class_{c}")));
        writer.write_record(header)?;
        Ok(LoadLedger {
            writer,
            error: None,
            num_classes,
        })
    }

    pub fn finish(mut self) -> Result<W, SimError> {
        if let Some(e) = self.error.take() {
            return Err(e.into());
        }
        self.writer.flush()?;
        into_inner(self.writer)
    }
}

impl<W: io::Write> RunObserver for LoadLedger<W> {
    fn on_load_sample(&mut self, sample: &LoadSample) {
        if self.error.is_some() {
            return;
        }
        debug_assert_eq!(sample.loads.len(), self.num_classes);
        let row: Vec<f64> = std::iter::once(sample.time)
            .chain(sample.loads.iter().copied())
            .collect();
        if let Err(e) = self.writer.serialize(row) {
            self.error = Some(e);
        }
    }
}
