//! Wire messages between the supervisor and its workers
//!
//! These are the only shapes that cross a worker boundary. They are plain
//! serde types: the in-process adapter moves them over channels as values,
//! and out-of-process transports can encode them with any deterministic
//! codec (cache byte strings must round-trip bit-exactly).
//!
//! Both channels of a supervisor/worker pair are FIFO; the protocol depends
//! on per-pair ordering and on nothing else.

use canopy_core::{Progress, Workload};
use serde::{Deserialize, Serialize};

/// Supervisor → worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerCommand {
    /// Report a progress delta and the remaining workload.
    RequestProgressUpdate,
    /// Give up an unexplored branch for reassignment.
    RequestWorkloadSteal,
    /// Begin exploring this workload. Only ever sent to an idle worker.
    StartWorkload(Workload),
    /// Stop at the next opportunity and acknowledge with
    /// [`WorkerMessage::Quit`].
    Quit,
}

/// A progress delta paired with what the reporting worker still owes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate<R> {
    /// Regions newly claimable as explored, plus the results accumulated
    /// since the last report.
    pub delta: Progress<R>,
    /// The worker's workload after the delta is folded out.
    pub remaining: Workload,
}

/// A successful steal: the victim's update and the workload that was cut
/// loose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StolenWorkload<R> {
    pub update: ProgressUpdate<R>,
    pub workload: Workload,
}

/// Worker → supervisor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerMessage<R> {
    /// Response to [`WorkerCommand::RequestProgressUpdate`], or a
    /// spontaneous flush in push mode.
    ProgressUpdate(ProgressUpdate<R>),
    /// Response to [`WorkerCommand::RequestWorkloadSteal`]; `None` when the
    /// worker had no unexplored branch to give up.
    StolenWorkload(Option<StolenWorkload<R>>),
    /// The workload is done; carries the final claim and results.
    Finished(Progress<R>),
    /// User code failed; the message is the panic or error text.
    Failed(String),
    /// Acknowledgement of [`WorkerCommand::Quit`].
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::Checkpoint;

    #[test]
    fn test_messages_round_trip_through_bincode() {
        let update = ProgressUpdate {
            delta: Progress::new(Checkpoint::Explored, 9u64),
            remaining: Workload::entire(),
        };
        let message = WorkerMessage::ProgressUpdate(update);
        let bytes = bincode::serialize(&message).unwrap();
        let restored: WorkerMessage<u64> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(message, restored);

        let command = WorkerCommand::StartWorkload(Workload::entire());
        let bytes = bincode::serialize(&command).unwrap();
        let restored: WorkerCommand = bincode::deserialize(&bytes).unwrap();
        assert_eq!(command, restored);
    }

    #[test]
    fn test_failed_steal_is_expressible() {
        let message: WorkerMessage<u64> = WorkerMessage::StolenWorkload(None);
        let bytes = bincode::serialize(&message).unwrap();
        let restored: WorkerMessage<u64> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(message, restored);
    }
}
