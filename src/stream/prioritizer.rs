//! C5: multi-level task prioritizer (§4.5). Runs at most `max_concurrency`
//! tasks at once; tasks below the `low` priority threshold are paused
//! (not dropped) while higher-priority tasks are in flight, and tasks can
//! have their priority updated or be cancelled in place.
//!
//! Grounded on the bounded-concurrency download loop in
//! `crates/mesio/src/hls/scheduler.rs` (a `download_concurrency` cap plus a
//! `FuturesUnordered` pool of in-flight jobs), generalized to add
//! priority-driven pause/resume instead of pure FIFO admission.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PrioritizerConfig;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Waiting,
    Running,
    Paused,
}

struct TaskHandle {
    priority: i32,
    state: TaskState,
    token: CancellationToken,
    /// Signalled when the task transitions out of `Paused` back to running,
    /// so a paused task's future can await its own resumption.
    resume_tx: Option<oneshot::Sender<()>>,
}

/// C5: admits and reschedules tasks by priority under a concurrency cap.
pub struct Prioritizer {
    config: PrioritizerConfig,
    next_id: TaskId,
    tasks: HashMap<TaskId, TaskHandle>,
}

impl Prioritizer {
    pub fn new(config: PrioritizerConfig) -> Self {
        Self {
            config,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }

    /// Registers a new task at `priority`. Returns its id, a cancellation
    /// token the caller's future should select against, and a resume signal
    /// fired if the task starts out (or transitions into) paused.
    pub fn submit(&mut self, priority: i32) -> (TaskId, CancellationToken, oneshot::Receiver<()>) {
        let id = self.next_id;
        self.next_id += 1;
        let token = CancellationToken::new();
        let (resume_tx, resume_rx) = oneshot::channel();

        let handle = TaskHandle {
            priority,
            state: TaskState::Waiting,
            token: token.clone(),
            resume_tx: Some(resume_tx),
        };
        self.tasks.insert(id, handle);
        self.rebalance();
        (id, token, resume_rx)
    }

    /// Changes a task's priority and re-evaluates run/pause state (§4.5
    /// `updatePriority`).
    pub fn update_priority(&mut self, id: TaskId, priority: i32) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.priority = priority;
        }
        self.rebalance();
    }

    /// Cancels and removes a task.
    pub fn cancel(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.token.cancel();
        }
        self.rebalance();
    }

    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|t| t.state)
    }

    /// Completion notice from a finished task, freeing its concurrency slot.
    pub fn complete(&mut self, id: TaskId) {
        self.tasks.remove(&id);
        self.rebalance();
    }

    /// Re-derives run/pause state for every task: the `max_concurrency`
    /// highest-priority (lowest numeric value, per §4.5 "lower number is
    /// higher priority") non-paused-by-request tasks run; the rest pause.
    /// Tasks at or below `config.high` always run.
    fn rebalance(&mut self) {
        let mut ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        ids.sort_by_key(|id| self.tasks[id].priority);

        let mut running_slots = self.config.max_concurrency;
        for id in ids {
            let priority = self.tasks[&id].priority;
            let always_runs = priority <= self.config.high;
            let should_run = always_runs || running_slots > 0;
            if should_run && !always_runs {
                running_slots = running_slots.saturating_sub(1);
            }
            let task = self.tasks.get_mut(&id).unwrap();
            let new_state = if should_run { TaskState::Running } else { TaskState::Waiting };
            if task.state != new_state {
                debug!(task_id = id, ?new_state, "prioritizer state change");
                if new_state == TaskState::Running {
                    if let Some(tx) = task.resume_tx.take() {
                        let _ = tx.send(());
                    }
                }
                task.state = new_state;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(high: i32, low: i32, max_concurrency: usize) -> PrioritizerConfig {
        PrioritizerConfig {
            high,
            low,
            max_concurrency,
        }
    }

    #[test]
    fn tasks_within_concurrency_cap_run_immediately() {
        let mut p = Prioritizer::new(cfg(0, 10, 2));
        let (a, _, _) = p.submit(5);
        let (b, _, _) = p.submit(5);
        assert_eq!(p.state_of(a), Some(TaskState::Running));
        assert_eq!(p.state_of(b), Some(TaskState::Running));
    }

    #[test]
    fn excess_low_priority_tasks_wait() {
        let mut p = Prioritizer::new(cfg(0, 10, 1));
        let (a, _, _) = p.submit(5);
        let (b, _, _) = p.submit(5);
        assert_eq!(p.state_of(a), Some(TaskState::Running));
        assert_eq!(p.state_of(b), Some(TaskState::Waiting));
    }

    #[test]
    fn high_priority_task_always_runs_even_over_cap() {
        let mut p = Prioritizer::new(cfg(0, 10, 1));
        let (a, _, _) = p.submit(5);
        assert_eq!(p.state_of(a), Some(TaskState::Running));
        let (b, _, _) = p.submit(0);
        assert_eq!(p.state_of(b), Some(TaskState::Running));
    }

    #[test]
    fn updating_priority_can_promote_a_waiting_task() {
        let mut p = Prioritizer::new(cfg(0, 10, 1));
        let (a, _, _) = p.submit(5);
        let (b, _, _) = p.submit(6);
        assert_eq!(p.state_of(b), Some(TaskState::Waiting));
        p.cancel(a);
        assert_eq!(p.state_of(b), Some(TaskState::Running));
    }

    #[test]
    fn completion_frees_a_slot_for_a_waiting_task() {
        let mut p = Prioritizer::new(cfg(0, 10, 1));
        let (a, _, _) = p.submit(5);
        let (b, _, _) = p.submit(5);
        assert_eq!(p.state_of(b), Some(TaskState::Waiting));
        p.complete(a);
        assert_eq!(p.state_of(b), Some(TaskState::Running));
    }

    #[test]
    fn cancel_removes_task_and_cancels_its_token() {
        let mut p = Prioritizer::new(cfg(0, 10, 2));
        let (a, token, _) = p.submit(5);
        p.cancel(a);
        assert!(token.is_cancelled());
        assert_eq!(p.state_of(a), None);
    }
}
