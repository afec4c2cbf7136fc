//! In-process run driver
//!
//! The smallest real transport: every worker is a tokio task, every channel
//! is an in-process mpsc (FIFO per pair, as the protocol requires), and the
//! supervisor runs inside the caller's task as a plain event loop. This is
//! the driver the end-to-end tests run on; network and IPC transports
//! implement the same [`SupervisorController`] seam elsewhere.
//!
//! With a [`ProgressStore`] attached, the driver performs a global progress
//! update on an interval and persists the result. Save failures are logged
//! and retried at the next interval — a run never aborts because a
//! checkpoint write failed. On completion the stored record is deleted; on
//! failure a final save is attempted so the partial progress survives.

use crate::error::RuntimeError;
use crate::messages::{WorkerCommand, WorkerMessage};
use crate::supervisor::{
    Supervisor, SupervisorController, SupervisorOutcome, TerminationReason,
};
use crate::worker::run_worker;
use canopy_checkpoint::{ratio_from_duration, InMemoryProgressStore, ProgressStore, RunCheckpoint};
use canopy_core::tree::TreeBuilder;
use canopy_core::{ExplorationMode, Progress, Workload};
use num_rational::Ratio;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Tuning for an in-process run.
#[derive(Clone, Debug)]
pub struct LocalOptions {
    pub worker_count: usize,
    pub workload_buffer_size: usize,
    /// How often the global progress is snapshotted to the store (when one
    /// is attached).
    pub checkpoint_interval: Duration,
    /// Validate the workload-disjointness invariant after every supervisor
    /// operation.
    pub debug_mode: bool,
}

impl Default for LocalOptions {
    fn default() -> Self {
        LocalOptions {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            workload_buffer_size: crate::supervisor::DEFAULT_WORKLOAD_BUFFER_SIZE,
            checkpoint_interval: Duration::from_secs(60),
            debug_mode: false,
        }
    }
}

impl LocalOptions {
    pub fn with_workers(worker_count: usize) -> Self {
        LocalOptions {
            worker_count,
            ..Self::default()
        }
    }
}

struct LocalController<M: ExplorationMode> {
    commands: HashMap<usize, mpsc::UnboundedSender<WorkerCommand>>,
    progress_reports: mpsc::UnboundedSender<Progress<M::Result>>,
}

impl<M: ExplorationMode> LocalController<M> {
    fn send(&self, worker: &usize, command: WorkerCommand) {
        if let Some(channel) = self.commands.get(worker) {
            // A send fails only when the worker task is gone; the supervisor
            // learns about that through the event stream.
            let _ = channel.send(command);
        }
    }
}

impl<M: ExplorationMode> SupervisorController<usize, M> for LocalController<M> {
    fn broadcast_progress_update_to_workers(&mut self, workers: &[usize]) {
        for worker in workers {
            self.send(worker, WorkerCommand::RequestProgressUpdate);
        }
    }

    fn broadcast_workload_steal_to_workers(&mut self, workers: &[usize]) {
        for worker in workers {
            self.send(worker, WorkerCommand::RequestWorkloadSteal);
        }
    }

    fn send_workload_to_worker(&mut self, workload: Workload, worker: &usize) {
        self.send(worker, WorkerCommand::StartWorkload(workload));
    }

    fn receive_current_progress(&mut self, progress: Progress<M::Result>) {
        let _ = self.progress_reports.send(progress);
    }
}

/// Explore `builder`'s tree with `options.worker_count` in-process workers.
pub async fn explore_locally<M>(
    mode: Arc<M>,
    builder: TreeBuilder<M::Value>,
    options: LocalOptions,
) -> Result<SupervisorOutcome<usize, M>, RuntimeError>
where
    M: ExplorationMode,
{
    explore_locally_with_store(mode, builder, options, None::<Arc<InMemoryProgressStore>>).await
}

/// [`explore_locally`], resuming from and checkpointing into `store`.
pub async fn explore_locally_with_store<M, S>(
    mode: Arc<M>,
    builder: TreeBuilder<M::Value>,
    options: LocalOptions,
    store: Option<Arc<S>>,
) -> Result<SupervisorOutcome<usize, M>, RuntimeError>
where
    M: ExplorationMode,
    S: ProgressStore<M::Result> + 'static,
{
    let worker_count = options.worker_count.max(1);
    let (event_tx, mut event_rx) =
        mpsc::unbounded_channel::<(usize, WorkerMessage<M::Result>)>();
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress<M::Result>>();

    let mut commands = HashMap::new();
    for index in 0..worker_count {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
        commands.insert(index, command_tx);
        tokio::spawn(run_worker(
            index,
            mode.clone(),
            builder.clone(),
            command_rx,
            worker_tx,
        ));
        let events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = worker_rx.recv().await {
                if events.send((index, message)).is_err() {
                    break;
                }
            }
        });
    }
    drop(event_tx);

    // Resume from a stored record when one exists.
    let mut prior_compute_time: Ratio<u64> = Ratio::new(0, 1);
    let resumed_progress = match &store {
        Some(store) => match store.load().await? {
            Some(record) => {
                tracing::info!("resuming from stored progress");
                prior_compute_time = record.cpu_time;
                Some(record.progress)
            }
            None => None,
        },
        None => None,
    };

    let controller = LocalController::<M> {
        commands: commands.clone(),
        progress_reports: progress_tx,
    };
    let mut supervisor = match resumed_progress {
        Some(progress) => Supervisor::with_initial_progress(mode, controller, progress),
        None => Supervisor::new(mode, controller),
    };
    supervisor.set_debug_mode(options.debug_mode);
    supervisor.set_workload_buffer_size(options.workload_buffer_size)?;
    for index in 0..worker_count {
        supervisor.add_worker(index)?;
    }

    let mut checkpoint_timer = tokio::time::interval(options.checkpoint_interval);
    checkpoint_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    checkpoint_timer.tick().await; // the first tick fires immediately

    let outcome = loop {
        if let Some(outcome) = supervisor.take_outcome() {
            break outcome;
        }
        tokio::select! {
            event = event_rx.recv() => {
                let Some((worker, message)) = event else {
                    return Err(RuntimeError::ChannelClosed);
                };
                dispatch(&mut supervisor, worker, message)?;
            }
            _ = checkpoint_timer.tick(), if store.is_some() => {
                supervisor.perform_global_progress_update()?;
            }
            report = progress_rx.recv() => {
                if let (Some(progress), Some(store)) = (report, &store) {
                    let compute = prior_compute_time
                        + ratio_from_duration(supervisor.total_compute_time());
                    save_checkpoint(store.as_ref(), progress, compute).await;
                }
            }
        }
    };

    for channel in commands.values() {
        let _ = channel.send(WorkerCommand::Quit);
    }

    if let Some(store) = &store {
        match &outcome.reason {
            TerminationReason::Completed(_) => {
                if let Err(error) = store.clear().await {
                    tracing::warn!(%error, "failed to delete checkpoint after completion");
                }
            }
            TerminationReason::Aborted(progress)
            | TerminationReason::Failure { progress, .. } => {
                // One last snapshot so the partial run survives.
                let compute = prior_compute_time
                    + ratio_from_duration(supervisor.total_compute_time());
                save_checkpoint(store.as_ref(), progress.clone(), compute).await;
            }
        }
    }

    Ok(outcome)
}

async fn save_checkpoint<R, S>(store: &S, progress: Progress<R>, compute: Ratio<u64>)
where
    R: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    S: ProgressStore<R> + ?Sized,
{
    let record = RunCheckpoint::new(progress, compute);
    if let Err(error) = store.save(&record).await {
        tracing::warn!(%error, "checkpoint save failed; will retry at the next interval");
    } else {
        tracing::debug!("checkpoint saved");
    }
}

fn dispatch<M, C>(
    supervisor: &mut Supervisor<usize, M, C>,
    worker: usize,
    message: WorkerMessage<M::Result>,
) -> Result<(), RuntimeError>
where
    M: ExplorationMode,
    C: SupervisorController<usize, M>,
{
    match message {
        WorkerMessage::ProgressUpdate(update) => {
            supervisor.receive_progress_update(worker, update)?
        }
        WorkerMessage::StolenWorkload(response) => {
            supervisor.receive_stolen_workload(worker, response)?
        }
        WorkerMessage::Finished(progress) => {
            supervisor.receive_worker_finished(worker, progress, false)?
        }
        WorkerMessage::Failed(message) => {
            supervisor.receive_worker_failure(worker, message)?
        }
        WorkerMessage::Quit => supervisor.remove_worker_if_present(worker)?,
    }
    Ok(())
}
