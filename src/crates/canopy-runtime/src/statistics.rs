//! Run statistics
//!
//! Everything here is metadata: none of it feeds back into scheduling
//! decisions. The supervisor calls into [`RunStatisticsCollector`] at its
//! state transitions and the collector distills a serializable
//! [`RunStatistics`] when the run ends.
//!
//! Four measurement families, matching how each quantity actually behaves
//! over time:
//!
//! * step functions of time (worker counts, queue lengths) — time-weighted
//!   mean over piecewise-constant values;
//! * exponentially decaying estimators with a one second time constant
//!   (instantaneous workload-request rate, instantaneous steal time);
//! * linearly interpolated functions of time (worker wait times);
//! * independent measurements (steal completion times) — count, min, max,
//!   mean, standard deviation via Welford's recurrence.
//!
//! Occupation fractions — how much of the wall clock an entity spent busy —
//! are tracked for the supervisor itself, per worker, and in aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Time constant for the exponentially decaying estimators.
const DECAY_TIME_CONSTANT: Duration = Duration::from_secs(1);

/// Time-weighted summary of a piecewise-constant or interpolated variable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
}

/// Summary of independent measurements.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
}

/// Serializable distillation of one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunStatistics {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub wall_clock: Duration,
    pub worker_count: TimeSeriesSummary,
    pub waiting_worker_count: TimeSeriesSummary,
    pub available_workload_count: TimeSeriesSummary,
    /// Requests per second, exponentially decayed, at the end of the run.
    pub workload_request_rate: f64,
    /// Exponentially weighted moving average of steal completion seconds.
    pub instantaneous_steal_time: f64,
    pub steal_times: MeasurementSummary,
    pub failed_steal_count: u64,
    pub worker_wait_times: TimeSeriesSummary,
    pub supervisor_occupation: f64,
    pub worker_occupation: HashMap<String, f64>,
    pub aggregate_worker_occupation: f64,
}

/// Piecewise-constant variable with a time-weighted running integral.
#[derive(Debug)]
struct StepVariable {
    value: f64,
    since: Instant,
    integral: f64,
    min: f64,
    max: f64,
}

impl StepVariable {
    fn new(value: f64, now: Instant) -> Self {
        StepVariable {
            value,
            since: now,
            integral: 0.0,
            min: value,
            max: value,
        }
    }

    fn set(&mut self, value: f64, now: Instant) {
        self.integral += self.value * now.duration_since(self.since).as_secs_f64();
        self.since = now;
        self.value = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn summary(&self, now: Instant, started: Instant) -> TimeSeriesSummary {
        let total = now.duration_since(started).as_secs_f64();
        let integral = self.integral + self.value * now.duration_since(self.since).as_secs_f64();
        TimeSeriesSummary {
            mean: if total > 0.0 { integral / total } else { self.value },
            min: self.min,
            max: self.max,
            last: self.value,
        }
    }
}

/// Linearly interpolated variable: the integral uses the trapezoid between
/// consecutive samples.
#[derive(Debug, Default)]
struct InterpolatedVariable {
    previous: Option<(Instant, f64)>,
    first_sample: Option<Instant>,
    integral: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl InterpolatedVariable {
    fn sample(&mut self, value: f64, now: Instant) {
        match self.previous {
            None => {
                self.first_sample = Some(now);
                self.min = value;
                self.max = value;
            }
            Some((at, previous)) => {
                let dt = now.duration_since(at).as_secs_f64();
                self.integral += (previous + value) / 2.0 * dt;
                self.min = self.min.min(value);
                self.max = self.max.max(value);
            }
        }
        self.previous = Some((now, value));
        self.last = value;
    }

    fn summary(&self) -> TimeSeriesSummary {
        let span = match (self.first_sample, self.previous) {
            (Some(first), Some((latest, _))) => latest.duration_since(first).as_secs_f64(),
            _ => 0.0,
        };
        TimeSeriesSummary {
            mean: if span > 0.0 {
                self.integral / span
            } else {
                self.last
            },
            min: self.min,
            max: self.max,
            last: self.last,
        }
    }
}

/// Exponentially decaying event-rate estimator.
#[derive(Debug)]
struct DecayingRate {
    rate: f64,
    at: Instant,
}

impl DecayingRate {
    fn new(now: Instant) -> Self {
        DecayingRate { rate: 0.0, at: now }
    }

    fn decay_to(&mut self, now: Instant) {
        let dt = now.duration_since(self.at).as_secs_f64();
        let tau = DECAY_TIME_CONSTANT.as_secs_f64();
        self.rate *= (-dt / tau).exp();
        self.at = now;
    }

    fn event(&mut self, now: Instant) {
        self.decay_to(now);
        self.rate += 1.0 / DECAY_TIME_CONSTANT.as_secs_f64();
    }

    fn current(&mut self, now: Instant) -> f64 {
        self.decay_to(now);
        self.rate
    }
}

/// Exponentially weighted moving average over irregularly spaced samples.
#[derive(Debug)]
struct TimeWeightedEwma {
    value: f64,
    at: Option<Instant>,
}

impl TimeWeightedEwma {
    fn new() -> Self {
        TimeWeightedEwma {
            value: 0.0,
            at: None,
        }
    }

    fn sample(&mut self, sample: f64, now: Instant) {
        match self.at {
            None => self.value = sample,
            Some(at) => {
                let dt = now.duration_since(at).as_secs_f64();
                let tau = DECAY_TIME_CONSTANT.as_secs_f64();
                let alpha = 1.0 - (-dt / tau).exp();
                self.value += alpha * (sample - self.value);
            }
        }
        self.at = Some(now);
    }

    fn current(&self) -> f64 {
        self.value
    }
}

/// Independent measurements via Welford's recurrence.
#[derive(Debug, Default)]
struct Measurements {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl Measurements {
    fn add(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn summary(&self) -> MeasurementSummary {
        MeasurementSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean,
            stddev: if self.count > 1 {
                (self.m2 / (self.count - 1) as f64).sqrt()
            } else {
                0.0
            },
        }
    }
}

/// Fraction of wall clock an entity spent occupied.
#[derive(Debug)]
struct Occupation {
    created: Instant,
    occupied_since: Option<Instant>,
    occupied: Duration,
}

impl Occupation {
    fn new(now: Instant) -> Self {
        Occupation {
            created: now,
            occupied_since: None,
            occupied: Duration::ZERO,
        }
    }

    fn set_occupied(&mut self, occupied: bool, now: Instant) {
        match (self.occupied_since, occupied) {
            (None, true) => self.occupied_since = Some(now),
            (Some(since), false) => {
                self.occupied += now.duration_since(since);
                self.occupied_since = None;
            }
            _ => {}
        }
    }

    fn occupied_total(&self, now: Instant) -> Duration {
        match self.occupied_since {
            Some(since) => self.occupied + now.duration_since(since),
            None => self.occupied,
        }
    }

    fn lifetime(&self, now: Instant) -> Duration {
        now.duration_since(self.created)
    }

    fn fraction(&self, now: Instant) -> f64 {
        let lifetime = self.lifetime(now).as_secs_f64();
        if lifetime > 0.0 {
            self.occupied_total(now).as_secs_f64() / lifetime
        } else {
            0.0
        }
    }
}

/// The supervisor's statistics sink.
#[derive(Debug)]
pub struct RunStatisticsCollector<I> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
    worker_count: StepVariable,
    waiting_count: StepVariable,
    workload_count: StepVariable,
    request_rate: DecayingRate,
    steal_ewma: TimeWeightedEwma,
    steal_times: Measurements,
    failed_steals: u64,
    wait_times: InterpolatedVariable,
    supervisor_occupation: Occupation,
    workers: HashMap<I, Occupation>,
    retired: HashMap<String, f64>,
    retired_occupied: Duration,
    retired_lifetime: Duration,
}

impl<I> RunStatisticsCollector<I>
where
    I: Clone + Eq + Hash + Debug,
{
    pub fn new(now: Instant) -> Self {
        RunStatisticsCollector {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: now,
            worker_count: StepVariable::new(0.0, now),
            waiting_count: StepVariable::new(0.0, now),
            workload_count: StepVariable::new(0.0, now),
            request_rate: DecayingRate::new(now),
            steal_ewma: TimeWeightedEwma::new(),
            steal_times: Measurements::default(),
            failed_steals: 0,
            wait_times: InterpolatedVariable::default(),
            supervisor_occupation: Occupation::new(now),
            workers: HashMap::new(),
            retired: HashMap::new(),
            retired_occupied: Duration::ZERO,
            retired_lifetime: Duration::ZERO,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn worker_added(&mut self, id: &I, now: Instant) {
        self.workers.insert(id.clone(), Occupation::new(now));
    }

    pub fn worker_retired(&mut self, id: &I, now: Instant) {
        if let Some(occupation) = self.workers.remove(id) {
            self.retired
                .insert(format!("{id:?}"), occupation.fraction(now));
            self.retired_occupied += occupation.occupied_total(now);
            self.retired_lifetime += occupation.lifetime(now);
        }
    }

    pub fn worker_occupied(&mut self, id: &I, occupied: bool, now: Instant) {
        if let Some(occupation) = self.workers.get_mut(id) {
            occupation.set_occupied(occupied, now);
        }
    }

    pub fn counts(&mut self, workers: usize, waiting: usize, workloads: usize, now: Instant) {
        self.worker_count.set(workers as f64, now);
        self.waiting_count.set(waiting as f64, now);
        self.workload_count.set(workloads as f64, now);
    }

    pub fn workload_requested(&mut self, now: Instant) {
        self.request_rate.event(now);
    }

    pub fn worker_waited(&mut self, waited: Duration, now: Instant) {
        self.wait_times.sample(waited.as_secs_f64(), now);
    }

    pub fn steal_completed(&mut self, elapsed: Duration, now: Instant) {
        self.steal_times.add(elapsed.as_secs_f64());
        self.steal_ewma.sample(elapsed.as_secs_f64(), now);
    }

    pub fn steal_failed(&mut self) {
        self.failed_steals += 1;
    }

    pub fn failed_steal_count(&self) -> u64 {
        self.failed_steals
    }

    pub fn supervisor_busy(&mut self, busy: bool, now: Instant) {
        self.supervisor_occupation.set_occupied(busy, now);
    }

    /// Total time workers spent holding workloads; the run's compute-time
    /// measure persisted in checkpoint files.
    pub fn total_worker_occupied(&self, now: Instant) -> Duration {
        self.workers
            .values()
            .map(|occupation| occupation.occupied_total(now))
            .sum::<Duration>()
            + self.retired_occupied
    }

    pub fn finalize(&mut self, now: Instant) -> RunStatistics {
        let mut worker_occupation = self.retired.clone();
        let mut occupied = self.retired_occupied;
        let mut lifetime = self.retired_lifetime;
        for (id, occupation) in &self.workers {
            worker_occupation.insert(format!("{id:?}"), occupation.fraction(now));
            occupied += occupation.occupied_total(now);
            lifetime += occupation.lifetime(now);
        }
        let aggregate = if lifetime > Duration::ZERO {
            occupied.as_secs_f64() / lifetime.as_secs_f64()
        } else {
            0.0
        };
        RunStatistics {
            run_id: self.run_id,
            started_at: self.started_at,
            ended_at: Utc::now(),
            wall_clock: now.duration_since(self.started),
            worker_count: self.worker_count.summary(now, self.started),
            waiting_worker_count: self.waiting_count.summary(now, self.started),
            available_workload_count: self.workload_count.summary(now, self.started),
            workload_request_rate: self.request_rate.current(now),
            instantaneous_steal_time: self.steal_ewma.current(),
            steal_times: self.steal_times.summary(),
            failed_steal_count: self.failed_steals,
            worker_wait_times: self.wait_times.summary(),
            supervisor_occupation: self.supervisor_occupation.fraction(now),
            worker_occupation,
            aggregate_worker_occupation: aggregate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    #[test]
    fn test_step_variable_time_weighted_mean() {
        let base = Instant::now();
        let mut var = StepVariable::new(0.0, base);
        var.set(4.0, at(base, 1.0));
        var.set(2.0, at(base, 3.0));
        // 1s at 0, 2s at 4, 1s at 2 => (0 + 8 + 2) / 4 = 2.5
        let summary = var.summary(at(base, 4.0), base);
        assert!((summary.mean - 2.5).abs() < 1e-9);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.last, 2.0);
    }

    #[test]
    fn test_interpolated_variable_trapezoid_mean() {
        let base = Instant::now();
        let mut var = InterpolatedVariable::default();
        var.sample(0.0, base);
        var.sample(2.0, at(base, 2.0));
        // One trapezoid: mean of a linear ramp from 0 to 2 is 1.
        let summary = var.summary();
        assert!((summary.mean - 1.0).abs() < 1e-9);
        assert_eq!(summary.max, 2.0);
    }

    #[test]
    fn test_decaying_rate_decays_towards_zero() {
        let base = Instant::now();
        let mut rate = DecayingRate::new(base);
        rate.event(at(base, 0.1));
        let just_after = rate.current(at(base, 0.1));
        let later = rate.current(at(base, 5.0));
        assert!(just_after > 0.0);
        assert!(later < just_after * 0.05);
    }

    #[test]
    fn test_ewma_moves_towards_samples() {
        let base = Instant::now();
        let mut ewma = TimeWeightedEwma::new();
        ewma.sample(10.0, base);
        assert_eq!(ewma.current(), 10.0);
        ewma.sample(0.0, at(base, 10.0));
        // Ten time constants later the average is essentially the new value.
        assert!(ewma.current() < 0.01);
    }

    #[test]
    fn test_measurements_statistics() {
        let mut measurements = Measurements::default();
        for value in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            measurements.add(value);
        }
        let summary = measurements.summary();
        assert_eq!(summary.count, 8);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 9.0);
        assert!((summary.mean - 5.0).abs() < 1e-9);
        // Sample standard deviation of the classic data set.
        assert!((summary.stddev - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_occupation_fraction() {
        let base = Instant::now();
        let mut occupation = Occupation::new(base);
        occupation.set_occupied(true, at(base, 1.0));
        occupation.set_occupied(false, at(base, 3.0));
        assert!((occupation.fraction(at(base, 4.0)) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_collector_retires_workers_without_losing_time() {
        let base = Instant::now();
        let mut collector: RunStatisticsCollector<u32> = RunStatisticsCollector::new(base);
        collector.worker_added(&1, base);
        collector.worker_occupied(&1, true, base);
        collector.worker_retired(&1, at(base, 2.0));
        assert_eq!(
            collector.total_worker_occupied(at(base, 5.0)),
            Duration::from_secs(2)
        );
        let stats = collector.finalize(at(base, 4.0));
        assert_eq!(stats.worker_occupation.len(), 1);
        assert!((stats.worker_occupation["1"] - 1.0).abs() < 1e-9);
    }
}
