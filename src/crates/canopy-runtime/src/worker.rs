//! The worker engine
//!
//! A worker is one sequential actor driving the stepper over an assigned
//! workload. Between semantic steps it drains an inbox of
//! [`WorkerCommand`]s — at every explicit `Yield` instruction, and at least
//! every [`POLL_INTERVAL`] steps for trees that never yield — so progress
//! reports, steals and cancellation interleave with exploration without any
//! shared state.
//!
//! [`WorkerExploration`] is the engine's pure half: the exploration position
//! (initial path, cursor, live zipper, accumulator) and the derivations of
//! progress updates and stolen workloads from it. [`run_worker`] is the async
//! shell that owns the channels, catches user-code panics, and speaks the
//! wire protocol.

use crate::messages::{ProgressUpdate, StolenWorkload, WorkerCommand, WorkerMessage};
use canopy_core::checkpoint::checkpoint_from_initial_path;
use canopy_core::context::StolenBranch;
use canopy_core::cursor::{Cursor, CursorStep};
use canopy_core::stepper::{step, ExplorationState};
use canopy_core::tree::{Tree, TreeBuilder};
use canopy_core::{
    walk_tree_down_path, Branch, Checkpoint, ExplorationMode, Location, Path, Progress, Step,
    WalkResult, Workload,
};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;

/// How many semantic steps a worker takes between inbox polls when the tree
/// has no explicit yield points.
pub const POLL_INTERVAL: u32 = 256;

/// What one engine step did.
#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    /// A leaf was crossed and folded into the accumulator.
    pub folded_leaf: bool,
    /// The step crossed an explicit yield instruction.
    pub yielded: bool,
}

/// One worker's exploration position and accumulator.
pub struct WorkerExploration<M: ExplorationMode> {
    mode: Arc<M>,
    initial_path: Path,
    cursor: Cursor,
    state: Option<ExplorationState<M::Value>>,
    accumulator: M::Result,
}

impl<M: ExplorationMode> WorkerExploration<M> {
    /// Replay the workload's initial path against a freshly built tree and
    /// stand ready to step.
    pub fn start(
        mode: Arc<M>,
        builder: &TreeBuilder<M::Value>,
        workload: Workload,
    ) -> WalkResult<Self> {
        let tree = builder();
        let at_path = walk_tree_down_path(tree, &workload.initial_path)?;
        let accumulator = mode.initial_result();
        Ok(WorkerExploration {
            mode,
            initial_path: workload.initial_path,
            cursor: Cursor::new(),
            state: Some(ExplorationState::with_checkpoint(
                at_path,
                workload.checkpoint,
            )),
            accumulator,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_none()
    }

    pub fn accumulator(&self) -> &M::Result {
        &self.accumulator
    }

    /// One semantic step; leaves are folded into the accumulator as they are
    /// crossed.
    pub fn step(&mut self) -> WalkResult<StepReport> {
        let Some(state) = self.state.take() else {
            return Ok(StepReport {
                folded_leaf: false,
                yielded: false,
            });
        };
        // The location is only materialized when the mode asks for it and
        // the next instruction is actually a leaf.
        let location = if self.mode.needs_location()
            && state.checkpoint.is_unexplored()
            && matches!(state.tree, Tree::Leaf(_))
        {
            Some(self.current_location(&state))
        } else {
            None
        };
        let outcome = step(state)?;
        self.state = outcome.next;
        let folded_leaf = match outcome.leaf {
            Some(leaf) => {
                self.mode.fold_leaf(&mut self.accumulator, leaf, location);
                true
            }
            None => false,
        };
        Ok(StepReport {
            folded_leaf,
            yielded: outcome.yielded,
        })
    }

    /// Whether the mode wants this workload abandoned after the current
    /// accumulator state (first-found early exit).
    pub fn should_stop_early(&self) -> bool {
        self.mode.leaf_completes(&self.accumulator)
    }

    fn current_location(&self, state: &ExplorationState<M::Value>) -> Location {
        let mut location = Location::from_path(&self.initial_path);
        for entry in self.cursor.steps() {
            if let CursorStep::Choice { taken, .. } = entry {
                location.push(*taken);
            }
        }
        location.append(&state.context.location())
    }

    /// The progress claimable since the last report, and the workload this
    /// worker still owes.
    ///
    /// The delta claims every region known explored — the cursor's finished
    /// siblings, the context's finished left branches, the inherited sibling
    /// checkpoints — and nothing at or below the current position, and never
    /// a stolen branch. The remaining workload keeps the original initial
    /// path; stolen branches count as not-this-worker's and are marked
    /// explored there. Resets the accumulator.
    pub fn progress_update(&mut self) -> ProgressUpdate<M::Result> {
        let result = std::mem::replace(&mut self.accumulator, self.mode.initial_result());
        let (known_below, remaining_below) = match &self.state {
            Some(state) => (
                state.context.checkpoint(Checkpoint::Unexplored),
                state.context.checkpoint(state.checkpoint.clone()),
            ),
            None => (Checkpoint::Explored, Checkpoint::Explored),
        };
        ProgressUpdate {
            delta: Progress::new(
                checkpoint_from_initial_path(
                    &self.initial_path,
                    self.cursor.known_checkpoint(known_below),
                ),
                result,
            ),
            remaining: Workload::new(
                self.initial_path.clone(),
                self.cursor.remaining_checkpoint(remaining_below),
            ),
        }
    }

    /// The final claim for this workload: everything except branches that
    /// were stolen from it (and, on an early stop, the regions never
    /// reached).
    pub fn final_progress(&mut self) -> Progress<M::Result> {
        self.progress_update().delta
    }

    /// Give up the shallowest unexplored right branch.
    ///
    /// The victim's cursor absorbs the frames above the stolen choice, with
    /// the stolen sibling recorded as unclaimable; the returned workload
    /// addresses the stolen branch by full path so the thief can rebuild it
    /// from a fresh tree. The bundled update reflects the position after the
    /// cut.
    pub fn try_steal(&mut self) -> Option<StolenWorkload<M::Result>> {
        let state = self.state.as_mut()?;
        let StolenBranch {
            walked,
            checkpoint,
            tree,
        } = state.context.steal_shallowest()?;
        // The thief replays the path against its own fresh tree.
        drop(tree);

        let mut stolen_path = self.initial_path.join(self.cursor.path());
        for entry in &walked {
            match entry {
                CursorStep::Cache { bytes } => stolen_path.push(Step::Cache(bytes.clone())),
                CursorStep::Choice { taken, .. } => stolen_path.push(Step::Choice(*taken)),
            }
        }
        stolen_path.push(Step::Choice(Branch::Right));

        self.cursor.extend(walked);
        self.cursor.push(CursorStep::Choice {
            taken: Branch::Left,
            sibling: Checkpoint::Unexplored,
        });

        Some(StolenWorkload {
            update: self.progress_update(),
            workload: Workload::new(stolen_path, checkpoint),
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "user code panicked".to_string()
    }
}

enum Disposition {
    /// The workload ended (finished, failed, or was abandoned); wait for the
    /// next one.
    Idle,
    /// The supervisor asked us to quit.
    Shutdown,
}

/// Run one worker actor until its channels close or it is told to quit.
///
/// `index` is only used for tracing.
pub async fn run_worker<M: ExplorationMode>(
    index: usize,
    mode: Arc<M>,
    builder: TreeBuilder<M::Value>,
    mut inbox: mpsc::UnboundedReceiver<WorkerCommand>,
    outbox: mpsc::UnboundedSender<WorkerMessage<M::Result>>,
) {
    tracing::debug!(worker = index, "worker started");
    while let Some(command) = inbox.recv().await {
        match command {
            WorkerCommand::StartWorkload(workload) => {
                tracing::debug!(worker = index, depth = workload.depth(), "workload received");
                match explore_workload(index, &mode, &builder, workload, &mut inbox, &outbox).await
                {
                    Disposition::Idle => continue,
                    Disposition::Shutdown => break,
                }
            }
            WorkerCommand::RequestWorkloadSteal => {
                // Raced with our own Finished message; nothing to give up.
                let _ = outbox.send(WorkerMessage::StolenWorkload(None));
            }
            WorkerCommand::RequestProgressUpdate => {
                // Raced with our own Finished message; the supervisor has
                // already dropped us from the update set.
                tracing::debug!(worker = index, "progress request while idle; ignored");
            }
            WorkerCommand::Quit => {
                let _ = outbox.send(WorkerMessage::Quit);
                break;
            }
        }
    }
    tracing::debug!(worker = index, "worker stopped");
}

async fn explore_workload<M: ExplorationMode>(
    index: usize,
    mode: &Arc<M>,
    builder: &TreeBuilder<M::Value>,
    workload: Workload,
    inbox: &mut mpsc::UnboundedReceiver<WorkerCommand>,
    outbox: &mpsc::UnboundedSender<WorkerMessage<M::Result>>,
) -> Disposition {
    let started = catch_unwind(AssertUnwindSafe(|| {
        WorkerExploration::start(mode.clone(), builder, workload)
    }));
    let mut exploration = match started {
        Ok(Ok(exploration)) => exploration,
        Ok(Err(walk_error)) => {
            let _ = outbox.send(WorkerMessage::Failed(walk_error.to_string()));
            return Disposition::Idle;
        }
        Err(payload) => {
            let _ = outbox.send(WorkerMessage::Failed(panic_message(payload)));
            return Disposition::Idle;
        }
    };

    let mut steps_since_poll: u32 = 0;
    loop {
        if exploration.is_finished() {
            let final_progress = exploration.final_progress();
            tracing::debug!(worker = index, "workload finished");
            let _ = outbox.send(WorkerMessage::Finished(final_progress));
            return Disposition::Idle;
        }

        let report = match catch_unwind(AssertUnwindSafe(|| exploration.step())) {
            Ok(Ok(report)) => report,
            Ok(Err(walk_error)) => {
                tracing::warn!(worker = index, error = %walk_error, "walk failed");
                let _ = outbox.send(WorkerMessage::Failed(walk_error.to_string()));
                return Disposition::Idle;
            }
            Err(payload) => {
                let message = panic_message(payload);
                tracing::warn!(worker = index, message = %message, "user code panicked");
                let _ = outbox.send(WorkerMessage::Failed(message));
                return Disposition::Idle;
            }
        };

        if report.folded_leaf {
            if exploration.should_stop_early() {
                // First-found style: report what is known and abandon the
                // rest of the workload.
                let final_progress = exploration.final_progress();
                let _ = outbox.send(WorkerMessage::Finished(final_progress));
                return Disposition::Idle;
            }
            if mode.flush_immediately() {
                let update = exploration.progress_update();
                let _ = outbox.send(WorkerMessage::ProgressUpdate(update));
            }
        }

        steps_since_poll += 1;
        if report.yielded || steps_since_poll >= POLL_INTERVAL {
            steps_since_poll = 0;
            if let Some(disposition) = drain_requests(index, &mut exploration, inbox, outbox) {
                return disposition;
            }
            tokio::task::yield_now().await;
        }
    }
}

/// Answer every queued request in arrival order.
fn drain_requests<M: ExplorationMode>(
    index: usize,
    exploration: &mut WorkerExploration<M>,
    inbox: &mut mpsc::UnboundedReceiver<WorkerCommand>,
    outbox: &mpsc::UnboundedSender<WorkerMessage<M::Result>>,
) -> Option<Disposition> {
    while let Ok(command) = inbox.try_recv() {
        match command {
            WorkerCommand::RequestProgressUpdate => {
                let update = exploration.progress_update();
                let _ = outbox.send(WorkerMessage::ProgressUpdate(update));
            }
            WorkerCommand::RequestWorkloadSteal => {
                let stolen = exploration.try_steal();
                if stolen.is_none() {
                    tracing::debug!(worker = index, "steal request found nothing to give up");
                }
                let _ = outbox.send(WorkerMessage::StolenWorkload(stolen));
            }
            WorkerCommand::Quit => {
                let _ = outbox.send(WorkerMessage::Quit);
                return Some(Disposition::Shutdown);
            }
            WorkerCommand::StartWorkload(_) => {
                let _ = outbox.send(WorkerMessage::Failed(
                    "protocol violation: workload received while one is active".to_string(),
                ));
                return Some(Disposition::Idle);
            }
        }
    }
    None
}
