//! The single-record content of a checkpoint file

use canopy_core::Progress;
use chrono::{DateTime, Utc};
use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Everything a run persists between executions: the global progress for the
/// active exploration mode, and the exact accumulated compute time.
///
/// Compute time is an exact rational number of seconds so that repeated
/// resume cycles accumulate without floating-point drift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint<R> {
    pub progress: Progress<R>,
    pub cpu_time: Ratio<u64>,
    pub saved_at: DateTime<Utc>,
}

impl<R> RunCheckpoint<R> {
    pub fn new(progress: Progress<R>, cpu_time: Ratio<u64>) -> Self {
        RunCheckpoint {
            progress,
            cpu_time,
            saved_at: Utc::now(),
        }
    }

    /// Add `elapsed` compute time to the record, exactly.
    pub fn add_cpu_time(&mut self, elapsed: Duration) {
        self.cpu_time += ratio_from_duration(elapsed);
    }
}

/// Convert a duration to an exact rational number of seconds.
pub fn ratio_from_duration(duration: Duration) -> Ratio<u64> {
    let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    Ratio::new(nanos, NANOS_PER_SECOND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::Checkpoint;

    #[test]
    fn test_duration_conversion_is_exact() {
        let ratio = ratio_from_duration(Duration::from_millis(1500));
        assert_eq!(ratio, Ratio::new(3, 2));
    }

    #[test]
    fn test_cpu_time_accumulates_exactly() {
        let mut record = RunCheckpoint::new(
            Progress::new(Checkpoint::Unexplored, 0u64),
            Ratio::new(1, 3),
        );
        record.add_cpu_time(Duration::from_secs(2));
        assert_eq!(record.cpu_time, Ratio::new(7, 3));
    }

    #[test]
    fn test_record_round_trips_through_bincode() {
        let record = RunCheckpoint::new(
            Progress::new(Checkpoint::Explored, vec![5u64]),
            Ratio::new(123, 456),
        );
        let bytes = bincode::serialize(&record).unwrap();
        let restored: RunCheckpoint<Vec<u64>> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(record, restored);
    }
}
