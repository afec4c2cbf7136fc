//! The supervisor state machine
//!
//! One [`Supervisor`] owns the authoritative state of a run: the global
//! progress, every known worker and its current workload, the queue of
//! workloads looking for a worker, and the queue of workers looking for a
//! workload (never both non-empty at once). It decides when to steal, from
//! whom, and when the run is over.
//!
//! The supervisor is strictly serial: operations are plain `&mut self`
//! methods, expected to be driven one at a time by a single event loop, and
//! none of them blocks. Outbound effects go through a
//! [`SupervisorController`] — fan-out of steal and progress-update requests,
//! workload delivery, and the global-progress callback — so the state
//! machine itself is transport-agnostic and directly testable.
//!
//! Termination is a value, not control flow: the operation that detects
//! completion (or failure, or abort) records a [`TerminationReason`], and
//! the event loop collects the final [`SupervisorOutcome`] via
//! [`Supervisor::take_outcome`].
//!
//! # Scheduling rules
//!
//! * An idle worker gets the oldest queued workload, or joins the waiting
//!   queue (earliest-arrival order).
//! * A workload that appears (steal, worker removal) goes to the
//!   longest-waiting worker, or joins the workload queue (insertion order).
//! * After every state change the supervisor tops up its workload buffer:
//!   it requests `buffer_size + waiting − available − pending` steals,
//!   picking victims by (shallowest workload, then smallest id). Waiting
//!   workers with no queued workload, no pending steal, and nobody to steal
//!   from is an unrecoverable inconsistency
//!   ([`SupervisorError::OutOfWorkloadSources`]).

use crate::error::{SupervisorError, SupervisorResult};
use crate::messages::{ProgressUpdate, StolenWorkload};
use crate::statistics::{RunStatistics, RunStatisticsCollector};
use canopy_core::{ExplorationMode, Path, Progress, Workload};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bounds for worker identifiers. Blanket-implemented.
pub trait WorkerId: Clone + Eq + Ord + Hash + Debug + Send + 'static {}
impl<T: Clone + Eq + Ord + Hash + Debug + Send + 'static> WorkerId for T {}

/// Outbound effects of the supervisor, implemented by the transport adapter.
pub trait SupervisorController<I, M: ExplorationMode> {
    /// Ask each of `workers` for a progress update.
    fn broadcast_progress_update_to_workers(&mut self, workers: &[I]);

    /// Ask each of `workers` to give up an unexplored branch.
    fn broadcast_workload_steal_to_workers(&mut self, workers: &[I]);

    /// Deliver a workload to an idle worker.
    fn send_workload_to_worker(&mut self, workload: Workload, worker: &I);

    /// Completion of a global progress update: every worker that was active
    /// when it was requested has answered (or finished, failed, or left).
    fn receive_current_progress(&mut self, progress: Progress<M::Result>);
}

/// Why a run ended.
pub enum TerminationReason<I, M: ExplorationMode> {
    /// The exploration mode declared the run complete.
    Completed(M::Final),
    /// An explicit abort; carries the progress at that moment.
    Aborted(Progress<M::Result>),
    /// A worker reported a failure; fatal to the whole run.
    Failure {
        progress: Progress<M::Result>,
        worker: I,
        message: String,
    },
}

impl<I: Debug, M: ExplorationMode> Debug for TerminationReason<I, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Completed(value) => {
                f.debug_tuple("Completed").field(value).finish()
            }
            TerminationReason::Aborted(progress) => {
                f.debug_tuple("Aborted").field(progress).finish()
            }
            TerminationReason::Failure {
                progress,
                worker,
                message,
            } => f
                .debug_struct("Failure")
                .field("progress", progress)
                .field("worker", worker)
                .field("message", message)
                .finish(),
        }
    }
}

/// Everything a finished run hands back.
pub struct SupervisorOutcome<I, M: ExplorationMode> {
    pub reason: TerminationReason<I, M>,
    pub statistics: RunStatistics,
    /// Workers still registered at termination, in id order.
    pub remaining_workers: Vec<I>,
}

impl<I: Debug, M: ExplorationMode> Debug for SupervisorOutcome<I, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorOutcome")
            .field("reason", &self.reason)
            .field("remaining_workers", &self.remaining_workers)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct WorkerRecord {
    workload: Option<Workload>,
}

/// The authoritative scheduler of one run.
pub struct Supervisor<I: WorkerId, M: ExplorationMode, C: SupervisorController<I, M>> {
    mode: Arc<M>,
    controller: C,
    workers: HashMap<I, WorkerRecord>,
    /// Idle workers and when they started waiting, earliest first.
    waiting: VecDeque<(I, Instant)>,
    /// Workloads with no worker, in insertion order.
    available_workloads: VecDeque<Workload>,
    /// Active workers indexed by workload depth; shallowest steal first.
    steal_index: BTreeMap<usize, BTreeSet<I>>,
    /// Workers with an outstanding steal request and when it was sent.
    pending_steals: HashMap<I, Instant>,
    /// Workers frozen into the in-flight global progress update.
    pending_updates: BTreeSet<I>,
    update_in_flight: bool,
    progress: Progress<M::Result>,
    workload_buffer_size: usize,
    debug_mode: bool,
    termination: Option<TerminationReason<I, M>>,
    statistics: RunStatisticsCollector<I>,
}

/// Default size of the buffer of ready workloads the supervisor keeps ahead
/// of demand.
pub const DEFAULT_WORKLOAD_BUFFER_SIZE: usize = 4;

impl<I, M, C> Supervisor<I, M, C>
where
    I: WorkerId,
    M: ExplorationMode,
    C: SupervisorController<I, M>,
{
    /// A fresh run: the entire tree is one available workload.
    pub fn new(mode: Arc<M>, controller: C) -> Self {
        let initial = Progress::empty(mode.initial_result());
        Self::with_initial_progress(mode, controller, initial)
    }

    /// Resume from previously accumulated progress: the one initial workload
    /// is the whole tree under the stored checkpoint. A stored progress that
    /// already satisfies the mode completes immediately.
    pub fn with_initial_progress(
        mode: Arc<M>,
        controller: C,
        progress: Progress<M::Result>,
    ) -> Self {
        let termination = mode.completion(&progress).map(TerminationReason::Completed);
        let mut available_workloads = VecDeque::new();
        if termination.is_none() {
            available_workloads.push_back(Workload::new(
                Path::root(),
                progress.checkpoint.clone(),
            ));
        }
        Supervisor {
            mode,
            controller,
            workers: HashMap::new(),
            waiting: VecDeque::new(),
            available_workloads,
            steal_index: BTreeMap::new(),
            pending_steals: HashMap::new(),
            pending_updates: BTreeSet::new(),
            update_in_flight: false,
            progress,
            workload_buffer_size: DEFAULT_WORKLOAD_BUFFER_SIZE,
            debug_mode: false,
            termination,
            statistics: RunStatisticsCollector::new(Instant::now()),
        }
    }

    // ----- public operations -------------------------------------------------

    /// Register a new worker and put it to work (or to sleep).
    pub fn add_worker(&mut self, id: I) -> SupervisorResult<()> {
        self.with_op(|s| {
            if s.workers.contains_key(&id) {
                return Err(SupervisorError::WorkerAlreadyKnown(format!("{id:?}")));
            }
            tracing::debug!(worker = ?id, "worker added");
            s.workers.insert(id.clone(), WorkerRecord { workload: None });
            s.statistics.worker_added(&id, Instant::now());
            if s.termination.is_none() {
                s.assign_or_wait(id)?;
                s.replenish_workloads()?;
            }
            Ok(())
        })
    }

    /// Deregister a worker; its workload (if any) is put back in play.
    pub fn remove_worker(&mut self, id: I) -> SupervisorResult<()> {
        self.with_op(|s| s.remove_worker_inner(&id))
    }

    /// [`Self::remove_worker`], but a no-op for unknown ids.
    pub fn remove_worker_if_present(&mut self, id: I) -> SupervisorResult<()> {
        self.with_op(|s| {
            if s.workers.contains_key(&id) {
                s.remove_worker_inner(&id)
            } else {
                Ok(())
            }
        })
    }

    /// Fold a worker's progress delta and record its remaining workload.
    pub fn receive_progress_update(
        &mut self,
        id: I,
        update: ProgressUpdate<M::Result>,
    ) -> SupervisorResult<()> {
        self.with_op(|s| {
            let record = s
                .workers
                .get_mut(&id)
                .ok_or_else(|| SupervisorError::WorkerNotKnown(format!("{id:?}")))?;
            if record.workload.is_none() {
                return Err(SupervisorError::WorkerNotActive(format!("{id:?}")));
            }
            tracing::debug!(worker = ?id, "progress update received");
            s.replace_workload(&id, update.remaining);
            s.fold_delta(update.delta)?;
            s.clear_pending_update(&id);
            s.check_completion()
        })
    }

    /// Handle a worker's answer to a steal request.
    pub fn receive_stolen_workload(
        &mut self,
        id: I,
        response: Option<StolenWorkload<M::Result>>,
    ) -> SupervisorResult<()> {
        self.with_op(|s| {
            if !s.workers.contains_key(&id) {
                return Err(SupervisorError::WorkerNotKnown(format!("{id:?}")));
            }
            let requested_at = s
                .pending_steals
                .remove(&id)
                .ok_or_else(|| SupervisorError::WorkerNotActive(format!("{id:?}")))?;
            match response {
                None => {
                    tracing::debug!(worker = ?id, "steal yielded nothing");
                    s.statistics.steal_failed();
                }
                Some(StolenWorkload { update, workload }) => {
                    let now = Instant::now();
                    s.statistics
                        .steal_completed(now.duration_since(requested_at), now);
                    let record = s
                        .workers
                        .get_mut(&id)
                        .ok_or_else(|| SupervisorError::WorkerNotKnown(format!("{id:?}")))?;
                    if record.workload.is_none() {
                        return Err(SupervisorError::WorkerNotActive(format!("{id:?}")));
                    }
                    tracing::debug!(
                        victim = ?id,
                        depth = workload.depth(),
                        "stolen workload received"
                    );
                    s.replace_workload(&id, update.remaining);
                    s.fold_delta(update.delta)?;
                    s.check_completion()?;
                    if s.termination.is_none() {
                        s.enqueue_workload(workload)?;
                    }
                }
            }
            if s.termination.is_none() {
                s.replenish_workloads()?;
            }
            Ok(())
        })
    }

    /// Fold a worker's final progress; completes the run, or sends the
    /// worker back to the pool (removing it first when `remove` is set).
    pub fn receive_worker_finished(
        &mut self,
        id: I,
        final_progress: Progress<M::Result>,
        remove: bool,
    ) -> SupervisorResult<()> {
        self.with_op(|s| {
            let record = s
                .workers
                .get(&id)
                .ok_or_else(|| SupervisorError::WorkerNotKnown(format!("{id:?}")))?;
            if record.workload.is_none() {
                return Err(SupervisorError::WorkerNotActive(format!("{id:?}")));
            }
            tracing::debug!(worker = ?id, "worker finished workload");
            s.fold_delta(final_progress)?;
            s.deactivate(&id);
            s.clear_pending_update(&id);
            if s.progress.checkpoint.is_explored() {
                if !s.available_workloads.is_empty() {
                    return Err(SupervisorError::WorkloadsRemainAfterFullExploration);
                }
                if s.workers.values().any(|record| record.workload.is_some()) {
                    return Err(SupervisorError::WorkersRemainActiveAfterFullExploration);
                }
            }
            s.check_completion()?;
            if remove {
                s.retire(&id);
            }
            if s.termination.is_none() {
                if !remove {
                    s.assign_or_wait(id.clone())?;
                }
                s.replenish_workloads()?;
            }
            Ok(())
        })
    }

    /// A worker failed; the whole run fails with it.
    pub fn receive_worker_failure(&mut self, id: I, message: String) -> SupervisorResult<()> {
        self.with_op(|s| {
            if !s.workers.contains_key(&id) {
                return Err(SupervisorError::WorkerNotKnown(format!("{id:?}")));
            }
            tracing::error!(worker = ?id, message = %message, "worker failure; run fails");
            s.clear_pending_update(&id);
            if s.termination.is_none() {
                s.termination = Some(TerminationReason::Failure {
                    progress: s.progress.clone(),
                    worker: id,
                    message,
                });
            }
            Ok(())
        })
    }

    /// Ask every currently active worker for a progress update, then fire
    /// [`SupervisorController::receive_current_progress`] once when the last
    /// of them has answered. Fires immediately if nobody is active. A request
    /// made while one is in flight is coalesced into it.
    pub fn perform_global_progress_update(&mut self) -> SupervisorResult<()> {
        self.with_op(|s| {
            if s.termination.is_some() {
                return Ok(());
            }
            if s.update_in_flight {
                tracing::debug!("global progress update already in flight; coalesced");
                return Ok(());
            }
            let mut active: Vec<I> = s
                .workers
                .iter()
                .filter(|(_, record)| record.workload.is_some())
                .map(|(id, _)| id.clone())
                .collect();
            active.sort();
            if active.is_empty() {
                let progress = s.progress.clone();
                s.controller.receive_current_progress(progress);
                return Ok(());
            }
            tracing::debug!(workers = active.len(), "global progress update started");
            s.pending_updates = active.iter().cloned().collect();
            s.update_in_flight = true;
            s.controller.broadcast_progress_update_to_workers(&active);
            Ok(())
        })
    }

    /// Abort the run, capturing the progress so far.
    pub fn abort(&mut self) {
        if self.termination.is_none() {
            tracing::info!("run aborted");
            self.termination = Some(TerminationReason::Aborted(self.progress.clone()));
        }
    }

    /// Abort the run with a caller-supplied reason.
    pub fn abort_with_reason(&mut self, reason: TerminationReason<I, M>) {
        if self.termination.is_none() {
            self.termination = Some(reason);
        }
    }

    /// Resize the ready-workload buffer; takes effect immediately.
    pub fn set_workload_buffer_size(&mut self, size: usize) -> SupervisorResult<()> {
        self.with_op(|s| {
            s.workload_buffer_size = size;
            if s.termination.is_none() {
                s.replenish_workloads()?;
            }
            Ok(())
        })
    }

    /// Toggle per-operation workspace validation.
    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.debug_mode = enabled;
    }

    /// Peek the longest-waiting idle worker.
    pub fn try_get_waiting_worker(&self) -> Option<I> {
        self.waiting.front().map(|(id, _)| id.clone())
    }

    pub fn current_progress(&self) -> &Progress<M::Result> {
        &self.progress
    }

    pub fn has_terminated(&self) -> bool {
        self.termination.is_some()
    }

    /// Total time workers have spent holding workloads; the run's
    /// compute-time measure.
    pub fn total_compute_time(&self) -> Duration {
        self.statistics.total_worker_occupied(Instant::now())
    }

    /// Collect the outcome once a termination reason has been recorded.
    pub fn take_outcome(&mut self) -> Option<SupervisorOutcome<I, M>> {
        let reason = self.termination.take()?;
        let statistics = self.statistics.finalize(Instant::now());
        let mut remaining_workers: Vec<I> = self.workers.keys().cloned().collect();
        remaining_workers.sort();
        Some(SupervisorOutcome {
            reason,
            statistics,
            remaining_workers,
        })
    }

    // ----- internals ---------------------------------------------------------

    fn with_op<T>(
        &mut self,
        operation: impl FnOnce(&mut Self) -> SupervisorResult<T>,
    ) -> SupervisorResult<T> {
        self.statistics.supervisor_busy(true, Instant::now());
        let result = operation(self);
        let now = Instant::now();
        self.statistics.supervisor_busy(false, now);
        self.statistics.counts(
            self.workers.len(),
            self.waiting.len(),
            self.available_workloads.len(),
            now,
        );
        if result.is_ok() && self.debug_mode && self.termination.is_none() {
            self.validate_workspace()?;
        }
        result
    }

    fn remove_worker_inner(&mut self, id: &I) -> SupervisorResult<()> {
        if !self.workers.contains_key(id) {
            return Err(SupervisorError::WorkerNotKnown(format!("{id:?}")));
        }
        tracing::debug!(worker = ?id, "worker removed");
        if let Some(workload) = self.deactivate(id) {
            if self.termination.is_none() {
                self.enqueue_workload(workload)?;
            }
        }
        self.clear_pending_update(id);
        self.retire(id);
        if self.termination.is_none() {
            self.replenish_workloads()?;
        }
        Ok(())
    }

    /// Give `id` a workload if one is queued, otherwise park it.
    fn assign_or_wait(&mut self, id: I) -> SupervisorResult<()> {
        let now = Instant::now();
        self.statistics.workload_requested(now);
        match self.available_workloads.pop_front() {
            Some(workload) => self.activate(id, workload),
            None => {
                tracing::debug!(worker = ?id, "no workload available; worker waits");
                self.waiting.push_back((id, now));
                Ok(())
            }
        }
    }

    /// Route a fresh workload to the longest-waiting worker, or queue it.
    ///
    /// A workload with nothing left in it (possible when a nearly finished
    /// worker is removed right after reporting) is dropped: its region is
    /// already accounted for by the deltas its previous owner folded in.
    fn enqueue_workload(&mut self, workload: Workload) -> SupervisorResult<()> {
        if workload.checkpoint.is_explored() {
            tracing::debug!("dropping exhausted workload");
            return Ok(());
        }
        match self.waiting.pop_front() {
            Some((id, since)) => {
                let now = Instant::now();
                self.statistics.worker_waited(now.duration_since(since), now);
                self.activate(id, workload)
            }
            None => {
                self.available_workloads.push_back(workload);
                Ok(())
            }
        }
    }

    /// Hand `workload` to `id` and index it for stealing.
    fn activate(&mut self, id: I, workload: Workload) -> SupervisorResult<()> {
        let record = self
            .workers
            .get_mut(&id)
            .ok_or_else(|| SupervisorError::WorkerNotKnown(format!("{id:?}")))?;
        if record.workload.is_some() {
            return Err(SupervisorError::WorkerAlreadyHasWorkload(format!("{id:?}")));
        }
        tracing::debug!(worker = ?id, depth = workload.depth(), "workload assigned");
        record.workload = Some(workload.clone());
        self.steal_index
            .entry(workload.depth())
            .or_default()
            .insert(id.clone());
        self.statistics.worker_occupied(&id, true, Instant::now());
        self.controller.send_workload_to_worker(workload, &id);
        Ok(())
    }

    /// Take `id`'s workload away (bookkeeping only; no messages).
    fn deactivate(&mut self, id: &I) -> Option<Workload> {
        let record = self.workers.get_mut(id)?;
        let workload = record.workload.take()?;
        self.unindex(id, workload.depth());
        self.statistics.worker_occupied(id, false, Instant::now());
        Some(workload)
    }

    /// Swap `id`'s recorded workload, keeping the steal index consistent.
    fn replace_workload(&mut self, id: &I, workload: Workload) {
        let Some(record) = self.workers.get_mut(id) else {
            return;
        };
        let new_depth = workload.depth();
        if let Some(previous) = record.workload.replace(workload) {
            if previous.depth() != new_depth {
                self.unindex(id, previous.depth());
                self.steal_index
                    .entry(new_depth)
                    .or_default()
                    .insert(id.clone());
            }
        }
    }

    fn unindex(&mut self, id: &I, depth: usize) {
        if let Some(ids) = self.steal_index.get_mut(&depth) {
            ids.remove(id);
            if ids.is_empty() {
                self.steal_index.remove(&depth);
            }
        }
    }

    fn fold_delta(&mut self, delta: Progress<M::Result>) -> SupervisorResult<()> {
        self.progress.checkpoint = self.progress.checkpoint.merge(&delta.checkpoint)?;
        self.mode.combine(&mut self.progress.result, delta.result);
        Ok(())
    }

    fn check_completion(&mut self) -> SupervisorResult<()> {
        if self.termination.is_some() {
            return Ok(());
        }
        if let Some(outcome) = self.mode.completion(&self.progress) {
            tracing::info!("exploration complete");
            self.termination = Some(TerminationReason::Completed(outcome));
        } else if self.progress.checkpoint.is_explored() {
            return Err(SupervisorError::FullyExploredWithoutTermination);
        }
        Ok(())
    }

    fn clear_pending_update(&mut self, id: &I) {
        if self.pending_updates.remove(id)
            && self.update_in_flight
            && self.pending_updates.is_empty()
        {
            self.update_in_flight = false;
            tracing::debug!(
                coverage = self.progress.checkpoint.coverage(),
                "global progress update complete"
            );
            let progress = self.progress.clone();
            self.controller.receive_current_progress(progress);
        }
    }

    fn retire(&mut self, id: &I) {
        self.workers.remove(id);
        self.waiting.retain(|(waiting_id, _)| waiting_id != id);
        self.pending_updates.remove(id);
        // A retired worker will never answer an outstanding steal request.
        if self.pending_steals.remove(id).is_some() {
            self.statistics.steal_failed();
        }
        self.statistics.worker_retired(id, Instant::now());
    }

    /// Top up the workload buffer by requesting steals from the shallowest
    /// active workers.
    fn replenish_workloads(&mut self) -> SupervisorResult<()> {
        let needed = (self.workload_buffer_size + self.waiting.len())
            .saturating_sub(self.available_workloads.len() + self.pending_steals.len());
        if needed == 0 {
            return Ok(());
        }
        let mut victims: Vec<I> = Vec::new();
        'scan: for ids in self.steal_index.values() {
            for id in ids {
                if !self.pending_steals.contains_key(id) {
                    victims.push(id.clone());
                    if victims.len() == needed {
                        break 'scan;
                    }
                }
            }
        }
        if victims.is_empty() {
            if !self.waiting.is_empty()
                && self.available_workloads.is_empty()
                && self.pending_steals.is_empty()
            {
                return Err(SupervisorError::OutOfWorkloadSources);
            }
            return Ok(());
        }
        let now = Instant::now();
        for id in &victims {
            self.pending_steals.insert(id.clone(), now);
        }
        tracing::debug!(victims = victims.len(), needed, "requesting workload steals");
        self.controller.broadcast_workload_steal_to_workers(&victims);
        Ok(())
    }

    /// The workload-disjointness invariant: global progress plus the covered
    /// regions of every outstanding workload must account for the whole
    /// tree, and no two outstanding workloads may delimit the same sub-tree.
    fn validate_workspace(&self) -> SupervisorResult<()> {
        let mut union = self.progress.checkpoint.clone();
        let mut paths: Vec<&Path> = Vec::new();
        for record in self.workers.values() {
            if let Some(workload) = &record.workload {
                union = union.merge(&workload.covered_region())?;
                paths.push(&workload.initial_path);
            }
        }
        for workload in &self.available_workloads {
            union = union.merge(&workload.covered_region())?;
            paths.push(&workload.initial_path);
        }
        for (index, path) in paths.iter().enumerate() {
            if paths[index + 1..].contains(path) {
                return Err(SupervisorError::ConflictingWorkloads(path.len()));
            }
        }
        if !union.is_explored() {
            return Err(SupervisorError::IncompleteWorkspace(Box::new(union)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerExploration;
    use canopy_core::tree::{Tree, TreeBuilder};
    use canopy_core::{Checkpoint, SumAll};
    use std::sync::Mutex;

    type Mode = SumAll<u64>;

    #[derive(Default, Debug)]
    struct Recorded {
        workloads: Vec<(usize, Workload)>,
        steal_requests: Vec<Vec<usize>>,
        update_requests: Vec<Vec<usize>>,
        progress_reports: Vec<Progress<u64>>,
    }

    #[derive(Default)]
    struct MockController(Arc<Mutex<Recorded>>);

    impl MockController {
        fn recorder(&self) -> Arc<Mutex<Recorded>> {
            self.0.clone()
        }
    }

    impl SupervisorController<usize, Mode> for MockController {
        fn broadcast_progress_update_to_workers(&mut self, workers: &[usize]) {
            self.0.lock().unwrap().update_requests.push(workers.to_vec());
        }

        fn broadcast_workload_steal_to_workers(&mut self, workers: &[usize]) {
            self.0.lock().unwrap().steal_requests.push(workers.to_vec());
        }

        fn send_workload_to_worker(&mut self, workload: Workload, worker: &usize) {
            self.0.lock().unwrap().workloads.push((*worker, workload));
        }

        fn receive_current_progress(&mut self, progress: Progress<u64>) {
            self.0.lock().unwrap().progress_reports.push(progress);
        }
    }

    fn builder() -> TreeBuilder<u64> {
        Arc::new(|| {
            Tree::choice(
                || Tree::choice(|| Tree::leaf(1), || Tree::leaf(2)),
                || Tree::choice(|| Tree::leaf(3), || Tree::leaf(4)),
            )
        })
    }

    fn new_supervisor() -> (
        Supervisor<usize, Mode, MockController>,
        Arc<Mutex<Recorded>>,
    ) {
        let controller = MockController::default();
        let recorder = controller.recorder();
        let mut supervisor = Supervisor::new(Arc::new(SumAll::new()), controller);
        supervisor.set_debug_mode(true);
        (supervisor, recorder)
    }

    fn drive<MO: ExplorationMode>(exploration: &mut WorkerExploration<MO>) {
        while !exploration.is_finished() {
            exploration.step().unwrap();
        }
    }

    #[test]
    fn test_duplicate_worker_is_rejected() {
        let (mut supervisor, _) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        assert!(matches!(
            supervisor.add_worker(0),
            Err(SupervisorError::WorkerAlreadyKnown(_))
        ));
    }

    #[test]
    fn test_unknown_worker_is_rejected() {
        let (mut supervisor, _) = new_supervisor();
        assert!(matches!(
            supervisor.remove_worker(3),
            Err(SupervisorError::WorkerNotKnown(_))
        ));
        assert!(supervisor.remove_worker_if_present(3).is_ok());
    }

    #[test]
    fn test_first_worker_gets_the_entire_tree() {
        let (mut supervisor, recorder) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        let recorded = recorder.lock().unwrap();
        assert_eq!(recorded.workloads, vec![(0, Workload::entire())]);
        // Topping up the buffer immediately asks the only active worker.
        assert_eq!(recorded.steal_requests, vec![vec![0]]);
    }

    #[test]
    fn test_second_worker_waits() {
        let (mut supervisor, recorder) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        supervisor.add_worker(1).unwrap();
        assert_eq!(supervisor.try_get_waiting_worker(), Some(1));
        // No duplicate steal request while one is already pending.
        assert_eq!(recorder.lock().unwrap().steal_requests, vec![vec![0]]);
    }

    #[test]
    fn test_steal_routes_work_to_waiting_worker_and_run_completes() {
        let (mut supervisor, recorder) = new_supervisor();
        let mode: Arc<Mode> = Arc::new(SumAll::new());
        supervisor.add_worker(0).unwrap();
        supervisor.add_worker(1).unwrap();

        // Worker 0 descends past the root and answers the steal request.
        let mut victim =
            WorkerExploration::start(mode.clone(), &builder(), Workload::entire()).unwrap();
        victim.step().unwrap();
        let stolen = victim.try_steal().unwrap();
        let thief_workload = stolen.workload.clone();
        supervisor.receive_stolen_workload(0, Some(stolen)).unwrap();

        // The stolen right branch went straight to the waiting worker.
        assert_eq!(supervisor.try_get_waiting_worker(), None);
        {
            let recorded = recorder.lock().unwrap();
            assert_eq!(recorded.workloads.len(), 2);
            assert_eq!(recorded.workloads[1].0, 1);
            assert_eq!(recorded.workloads[1].1, thief_workload);
        }

        // Both workers finish their halves.
        drive(&mut victim);
        supervisor
            .receive_worker_finished(0, victim.final_progress(), false)
            .unwrap();
        assert!(!supervisor.has_terminated());

        let mut thief = WorkerExploration::start(mode, &builder(), thief_workload).unwrap();
        drive(&mut thief);
        supervisor
            .receive_worker_finished(1, thief.final_progress(), false)
            .unwrap();

        let outcome = supervisor.take_outcome().expect("run must have completed");
        match outcome.reason {
            TerminationReason::Completed(total) => assert_eq!(total, 10),
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(outcome.remaining_workers, vec![0, 1]);
    }

    #[test]
    fn test_steal_victims_are_picked_shallowest_first() {
        let (mut supervisor, recorder) = new_supervisor();
        let mode: Arc<Mode> = Arc::new(SumAll::new());
        supervisor.add_worker(0).unwrap();
        supervisor.add_worker(1).unwrap();

        // Worker 0 (workload depth 0) gives up its right branch, which lands
        // on worker 1 at depth 1.
        let mut victim =
            WorkerExploration::start(mode, &builder(), Workload::entire()).unwrap();
        victim.step().unwrap();
        let stolen = victim.try_steal().unwrap();
        supervisor.receive_stolen_workload(0, Some(stolen)).unwrap();

        // The next round of requests asks the depth-0 worker before the
        // depth-1 worker.
        let recorded = recorder.lock().unwrap();
        assert_eq!(recorded.steal_requests.last(), Some(&vec![0, 1]));
    }

    #[test]
    fn test_buffer_size_drives_steal_demand() {
        let controller = MockController::default();
        let recorder = controller.recorder();
        let mut supervisor: Supervisor<usize, Mode, MockController> =
            Supervisor::new(Arc::new(SumAll::new()), controller);
        supervisor.set_workload_buffer_size(0).unwrap();
        supervisor.add_worker(0).unwrap();
        // Zero buffer and nobody waiting: no reason to steal.
        assert!(recorder.lock().unwrap().steal_requests.is_empty());

        supervisor.set_workload_buffer_size(2).unwrap();
        assert_eq!(recorder.lock().unwrap().steal_requests, vec![vec![0]]);
    }

    #[test]
    fn test_failed_steal_bumps_counter_and_retries() {
        let (mut supervisor, recorder) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        supervisor.receive_stolen_workload(0, None).unwrap();
        // The buffer is still empty, so the supervisor asks again.
        assert_eq!(
            recorder.lock().unwrap().steal_requests,
            vec![vec![0], vec![0]]
        );
    }

    #[test]
    fn test_global_update_with_no_active_workers_fires_immediately() {
        let (mut supervisor, recorder) = new_supervisor();
        supervisor.perform_global_progress_update().unwrap();
        let recorded = recorder.lock().unwrap();
        assert_eq!(recorded.progress_reports.len(), 1);
        assert!(recorded.update_requests.is_empty());
    }

    #[test]
    fn test_global_update_waits_for_every_frozen_worker() {
        let (mut supervisor, recorder) = new_supervisor();
        let mode: Arc<Mode> = Arc::new(SumAll::new());
        supervisor.add_worker(0).unwrap();
        supervisor.perform_global_progress_update().unwrap();
        assert_eq!(recorder.lock().unwrap().update_requests, vec![vec![0]]);
        assert!(recorder.lock().unwrap().progress_reports.is_empty());
        // A second request while one is in flight is coalesced.
        supervisor.perform_global_progress_update().unwrap();
        assert_eq!(recorder.lock().unwrap().update_requests.len(), 1);

        let mut exploration =
            WorkerExploration::start(mode, &builder(), Workload::entire()).unwrap();
        while !exploration.step().unwrap().folded_leaf {}
        let update = exploration.progress_update();
        supervisor.receive_progress_update(0, update).unwrap();

        let recorded = recorder.lock().unwrap();
        assert_eq!(recorded.progress_reports.len(), 1);
        assert_eq!(recorded.progress_reports[0].result, 1);
    }

    #[test]
    fn test_worker_failure_fails_the_run() {
        let (mut supervisor, _) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        supervisor
            .receive_worker_failure(0, "it broke".to_string())
            .unwrap();
        let outcome = supervisor.take_outcome().unwrap();
        match outcome.reason {
            TerminationReason::Failure {
                worker, message, ..
            } => {
                assert_eq!(worker, 0);
                assert_eq!(message, "it broke");
            }
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[test]
    fn test_abort_carries_current_progress() {
        let (mut supervisor, _) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        supervisor.abort();
        let outcome = supervisor.take_outcome().unwrap();
        assert!(matches!(outcome.reason, TerminationReason::Aborted(_)));
    }

    #[test]
    fn test_removed_worker_workload_goes_back_in_play() {
        let (mut supervisor, recorder) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        supervisor.add_worker(1).unwrap();
        supervisor.remove_worker(0).unwrap();
        // Worker 1 inherits the entire tree.
        let recorded = recorder.lock().unwrap();
        assert_eq!(recorded.workloads.last(), Some(&(1, Workload::entire())));
        assert_eq!(supervisor.try_get_waiting_worker(), None);
    }

    #[test]
    fn test_waiting_workers_with_no_source_is_fatal() {
        let (mut supervisor, _) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        supervisor.add_worker(1).unwrap();
        // Worker 0 "finishes" with only a partial claim and leaves: its
        // region is lost, and worker 1 has nothing to wait for.
        let partial = Progress::new(
            Checkpoint::choice(Checkpoint::Explored, Checkpoint::Unexplored),
            3u64,
        );
        let result = supervisor.receive_worker_finished(0, partial, true);
        assert!(matches!(
            result,
            Err(SupervisorError::OutOfWorkloadSources)
        ));
    }

    #[test]
    fn test_debug_mode_catches_workspace_gaps() {
        let (mut supervisor, _) = new_supervisor();
        supervisor.add_worker(0).unwrap();
        // A hand-forged update whose remaining workload covers only the left
        // branch while the delta claims nothing on the right: the right
        // branch falls off the books.
        let update = ProgressUpdate {
            delta: Progress::new(
                Checkpoint::choice(Checkpoint::Explored, Checkpoint::Unexplored),
                3u64,
            ),
            remaining: Workload::new(
                [canopy_core::Step::Choice(canopy_core::Branch::Left)]
                    .into_iter()
                    .collect(),
                Checkpoint::Unexplored,
            ),
        };
        let result = supervisor.receive_progress_update(0, update);
        assert!(matches!(
            result,
            Err(SupervisorError::IncompleteWorkspace(_))
        ));
    }

    #[test]
    fn test_resume_from_completed_progress_terminates_immediately() {
        let controller = MockController::default();
        let supervisor: Supervisor<usize, Mode, MockController> = Supervisor::with_initial_progress(
            Arc::new(SumAll::new()),
            controller,
            Progress::new(Checkpoint::Explored, 10u64),
        );
        assert!(supervisor.has_terminated());
    }
}
