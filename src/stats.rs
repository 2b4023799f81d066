//! Running statistics kept without storing sample history.

/// Time-weighted average of a piecewise-constant count.
///
/// The first observation seeds the average with the observed count; later
/// observations fold in the count that held since the previous one:
///
/// `avg = (prev_t / t) * avg + prev_count * ((t - prev_t) / t)`
#[derive(Debug, Clone, Default)]
pub struct TimeAverage {
    avg: f64,
    prev_time: f64,
    prev_count: f64,
    seeded: bool,
}

impl TimeAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, t: f64, count: f64) {
        if !self.seeded {
            self.avg = count;
            self.seeded = true;
        } else if t > 0.0 {
            self.avg = (self.prev_time / t) * self.avg + self.prev_count * ((t - self.prev_time) / t);
        }
        self.prev_time = t;
        self.prev_count = count;
    }

    pub fn value(&self) -> f64 {
        self.avg
    }
}

/// One [`TimeAverage`] per occupancy slot, seeded from the first observed vector.
#[derive(Debug, Clone)]
pub struct ClassTimeAverage {
    slots: Vec<TimeAverage>,
}

impl ClassTimeAverage {
    pub fn new(len: usize) -> Self {
        ClassTimeAverage {
            slots: vec![TimeAverage::new(); len],
        }
    }

    pub fn observe(&mut self, t: f64, counts: &[usize]) {
        debug_assert_eq!(counts.len(), self.slots.len());
        for (slot, &count) in self.slots.iter_mut().zip(counts) {
            slot.observe(t, count as f64);
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.slots.iter().map(TimeAverage::value).collect()
    }
}

/// `load_i = arrival_rate * P(class i) * E[service | class i]`, with empty classes at 0.
pub fn class_loads(arrival_rate: f64, class_counts: &[u64], class_service: &[f64]) -> Vec<f64> {
    let total: u64 = class_counts.iter().sum();
    class_counts
        .iter()
        .zip(class_service)
        .map(|(&count, &service)| {
            if total == 0 || count == 0 {
                return 0.0;
            }
            let p_class = count as f64 / total as f64;
            let mean_service = service / count as f64;
            arrival_rate * p_class * mean_service
        })
        .collect()
}

/// Everything the engine tracks while a run is in progress.
#[derive(Debug, Clone)]
pub struct Statistics {
    in_system: TimeAverage,
    per_class: ClassTimeAverage,
    loads: Vec<f64>,
    response_total: f64,
    abs_error_total: f64,
    arrivals: u64,
    completions: u64,
}

impl Statistics {
    pub fn new(num_classes: usize) -> Self {
        Statistics {
            in_system: TimeAverage::new(),
            // one extra slot for out-of-range classes
            per_class: ClassTimeAverage::new(num_classes + 1),
            loads: vec![0.0; num_classes],
            response_total: 0.0,
            abs_error_total: 0.0,
            arrivals: 0,
            completions: 0,
        }
    }

    pub fn observe_occupancy(&mut self, t: f64, in_system: usize, per_class: &[usize]) {
        self.in_system.observe(t, in_system as f64);
        self.per_class.observe(t, per_class);
    }

    pub fn record_arrival(&mut self, percent_error: f64) {
        self.arrivals += 1;
        self.abs_error_total += percent_error.abs();
    }

    pub fn record_completion(&mut self, response_time: f64) {
        self.completions += 1;
        self.response_total += response_time;
    }

    pub fn update_loads(&mut self, arrival_rate: f64, class_counts: &[u64], class_service: &[f64]) {
        self.loads = class_loads(arrival_rate, class_counts, class_service);
    }

    pub fn average_in_system(&self) -> f64 {
        self.in_system.value()
    }

    /// Averages for classes `1..=num_classes`, without the overflow slot.
    pub fn average_per_class(&self) -> Vec<f64> {
        let mut values = self.per_class.values();
        values.pop();
        values
    }

    pub fn loads(&self) -> &[f64] {
        &self.loads
    }

    pub fn arrivals(&self) -> u64 {
        self.arrivals
    }

    pub fn completions(&self) -> u64 {
        self.completions
    }

    pub fn mean_response_time(&self) -> f64 {
        if self.completions == 0 {
            return 0.0;
        }
        self.response_total / self.completions as f64
    }

    pub fn mean_abs_percent_error(&self) -> f64 {
        if self.arrivals == 0 {
            return 0.0;
        }
        self.abs_error_total / self.arrivals as f64
    }
}
