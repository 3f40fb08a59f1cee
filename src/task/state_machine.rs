//! State machine for task lifecycles.
//!
//! [`TaskStateMachine`] validates every request against the transition table in
//! [`resolve`], broadcasts each accepted transition and wakes all threads blocked in
//! one of its waits. A single mutex and condition variable guard the state, so a
//! transition, its broadcast and the wake-up are atomic with respect to every waiter.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn, Span};

use crate::task::{
    error::TaskError,
    event::{EventBroadcaster, Subscription},
    state::TaskState,
};

/// Events that drive the state machine.
///
/// Requests come from controlling threads; the remaining triggers are completion
/// notifications from the executing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskTrigger {
    ExecuteRequest,
    PauseRequest,
    ResumeRequest,
    AbortRequest,
    TaskPaused,
    TaskCompleted,
    TaskFailed,
    TaskAborted,
}

impl TaskTrigger {
    pub const ALL: [TaskTrigger; 8] = [
        TaskTrigger::ExecuteRequest,
        TaskTrigger::PauseRequest,
        TaskTrigger::ResumeRequest,
        TaskTrigger::AbortRequest,
        TaskTrigger::TaskPaused,
        TaskTrigger::TaskCompleted,
        TaskTrigger::TaskFailed,
        TaskTrigger::TaskAborted,
    ];

    /// State this trigger leads to when accepted.
    #[must_use]
    pub fn target(self) -> TaskState {
        match self {
            TaskTrigger::ExecuteRequest | TaskTrigger::ResumeRequest => TaskState::Running,
            TaskTrigger::PauseRequest => TaskState::Pausing,
            TaskTrigger::AbortRequest => TaskState::Aborting,
            TaskTrigger::TaskPaused => TaskState::Paused,
            TaskTrigger::TaskCompleted => TaskState::Completed,
            TaskTrigger::TaskFailed => TaskState::Failed,
            TaskTrigger::TaskAborted => TaskState::Aborted,
        }
    }
}

/// Outcome of applying a trigger in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Move to the contained state.
    Transition(TaskState),
    /// Accept the request without changing state.
    Ignore,
    /// Refuse with [`TaskError::InvalidState`].
    Reject,
}

/// The transition table.
///
/// Pause, resume and abort requests on a finished task are ignored, while the same
/// requests on a task that never started are rejected. A task that is pausing or
/// aborting can still complete or fail, because the executing thread only observes
/// those requests at its next checkpoint.
#[must_use]
pub fn resolve(trigger: TaskTrigger, from: TaskState) -> Resolution {
    use TaskState as S;

    match (trigger, from) {
        (TaskTrigger::ExecuteRequest, S::Idle) => Resolution::Transition(S::Running),

        (TaskTrigger::PauseRequest, S::Running) => Resolution::Transition(S::Pausing),
        (TaskTrigger::PauseRequest, S::Pausing | S::Paused | S::Completed | S::Failed) => {
            Resolution::Ignore
        }

        (TaskTrigger::ResumeRequest, S::Pausing | S::Paused) => Resolution::Transition(S::Running),
        (TaskTrigger::ResumeRequest, S::Completed | S::Failed) => Resolution::Ignore,

        (TaskTrigger::AbortRequest, S::Running | S::Pausing | S::Paused) => {
            Resolution::Transition(S::Aborting)
        }
        (TaskTrigger::AbortRequest, S::Aborting | S::Aborted | S::Completed | S::Failed) => {
            Resolution::Ignore
        }

        (TaskTrigger::TaskPaused, S::Pausing) => Resolution::Transition(S::Paused),
        (TaskTrigger::TaskCompleted, S::Running | S::Pausing | S::Aborting) => {
            Resolution::Transition(S::Completed)
        }
        (TaskTrigger::TaskFailed, S::Running | S::Pausing | S::Aborting) => {
            Resolution::Transition(S::Failed)
        }
        (TaskTrigger::TaskAborted, S::Aborting) => Resolution::Transition(S::Aborted),

        _ => Resolution::Reject,
    }
}

/// Thread-safe lifecycle state machine.
///
/// Request handlers (`handle_*_request`) are called by controlling threads and
/// return immediately. Notifications (`handle_task_*`), [`handle_interruption_request`]
/// and [`interruptable_delay`] belong to the executing thread.
///
/// State-change handlers run while the state lock is held. They may read
/// [`state`](Self::state) but must not issue requests or wait on the same machine.
///
/// [`handle_interruption_request`]: Self::handle_interruption_request
/// [`interruptable_delay`]: Self::interruptable_delay
///
/// # Examples
///
/// ```rust
/// use cancellable_task::{TaskState, TaskStateMachine};
///
/// let machine = TaskStateMachine::new();
/// machine.handle_execute_request().unwrap();
/// machine.handle_pause_request().unwrap();
/// assert_eq!(machine.state(), TaskState::Pausing);
///
/// machine.handle_task_paused().unwrap();
/// machine.handle_resume_request().unwrap();
/// machine.handle_task_completed().unwrap();
/// assert_eq!(machine.wait_inactive(), TaskState::Completed);
///
/// // requests on a finished task are ignored
/// machine.handle_abort_request().unwrap();
/// assert_eq!(machine.state(), TaskState::Completed);
/// ```
pub struct TaskStateMachine {
    state: Mutex<TaskState>,
    status_changed: Condvar,
    observed: AtomicU8,
    state_broadcaster: EventBroadcaster<TaskState>,
    span: Span,
}

impl TaskStateMachine {
    pub fn new() -> Self {
        Self::with_span(Span::none())
    }

    /// State machine logging into `span`.
    pub(crate) fn with_span(span: Span) -> Self {
        Self {
            state: Mutex::new(TaskState::Idle),
            status_changed: Condvar::new(),
            observed: AtomicU8::new(TaskState::Idle.code()),
            state_broadcaster: EventBroadcaster::new(),
            span,
        }
    }

    /// Current state. Never blocks, so it is safe to call from state-change handlers.
    #[must_use]
    pub fn state(&self) -> TaskState {
        match TaskState::try_from(self.observed.load(Ordering::SeqCst)) {
            Ok(state) => state,
            Err(_) => unreachable!("observed state is only written from a TaskState"),
        }
    }

    pub fn subscribe_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TaskState) + Send + Sync + 'static,
    {
        self.state_broadcaster.add_handler(handler)
    }

    #[cfg(test)]
    pub(crate) fn state_broadcaster(&self) -> &EventBroadcaster<TaskState> {
        &self.state_broadcaster
    }

    pub fn handle_execute_request(&self) -> Result<(), TaskError> {
        self.apply(TaskTrigger::ExecuteRequest)
    }

    pub fn handle_pause_request(&self) -> Result<(), TaskError> {
        self.apply(TaskTrigger::PauseRequest)
    }

    pub fn handle_resume_request(&self) -> Result<(), TaskError> {
        self.apply(TaskTrigger::ResumeRequest)
    }

    pub fn handle_abort_request(&self) -> Result<(), TaskError> {
        self.apply(TaskTrigger::AbortRequest)
    }

    pub fn handle_task_paused(&self) -> Result<(), TaskError> {
        self.apply(TaskTrigger::TaskPaused)
    }

    pub fn handle_task_completed(&self) -> Result<(), TaskError> {
        self.apply(TaskTrigger::TaskCompleted)
    }

    pub fn handle_task_failed(&self) -> Result<(), TaskError> {
        self.apply(TaskTrigger::TaskFailed)
    }

    pub fn handle_task_aborted(&self) -> Result<(), TaskError> {
        self.apply(TaskTrigger::TaskAborted)
    }

    /// Checkpoint for the executing thread.
    ///
    /// Blocks while a pause is pending until the task is resumed and returns
    /// [`TaskError::Aborted`] when an abort is pending. Returns immediately otherwise.
    pub fn handle_interruption_request(&self) -> Result<(), TaskError> {
        let mut state = self.state.lock();
        self.checkpoint_locked(&mut state)
    }

    /// Sleep for `delay` while staying responsive to pause and abort requests.
    ///
    /// A pending abort ends the delay early with [`TaskError::Aborted`]. A pending
    /// pause blocks until resumed; the delay keeps its original deadline, so after
    /// a resume only the remaining time is waited and a deadline that passed while
    /// paused returns at once.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotExecuting`] outside `Running`, `Pausing` and `Aborting`.
    pub fn interruptable_delay(&self, delay: Duration) -> Result<(), TaskError> {
        let deadline = Instant::now().checked_add(delay);
        let mut state = self.state.lock();
        if !state.is_active() {
            return Err(TaskError::NotExecuting(*state));
        }

        loop {
            self.checkpoint_locked(&mut state)?;
            match deadline {
                Some(deadline) if Instant::now() >= deadline => return Ok(()),
                Some(deadline) => {
                    self.status_changed.wait_until(&mut state, deadline);
                }
                None => self.status_changed.wait(&mut state),
            }
        }
    }

    /// Block until the state has left `Idle`.
    pub fn wait_has_started(&self) {
        let mut state = self.state.lock();
        while *state == TaskState::Idle {
            self.status_changed.wait(&mut state);
        }
    }

    /// Like [`wait_has_started`](Self::wait_has_started), giving up after `timeout`.
    /// Returns `false` on timeout.
    pub fn wait_has_started_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while *state == TaskState::Idle {
            if !self.wait_step(&mut state, deadline) {
                return false;
            }
        }
        true
    }

    /// Block until the task is `Completed`, `Failed`, `Aborted` or `Paused` and
    /// return that state.
    pub fn wait_inactive(&self) -> TaskState {
        let mut state = self.state.lock();
        while !state.is_inactive() {
            self.status_changed.wait(&mut state);
        }
        *state
    }

    /// Like [`wait_inactive`](Self::wait_inactive), giving up after `timeout`.
    pub fn wait_inactive_timeout(&self, timeout: Duration) -> Option<TaskState> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while !state.is_inactive() {
            if !self.wait_step(&mut state, deadline) {
                return None;
            }
        }
        Some(*state)
    }

    /// One bounded wait; `false` once the deadline has passed.
    fn wait_step(&self, state: &mut MutexGuard<'_, TaskState>, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => !self.status_changed.wait_until(state, deadline).timed_out(),
            None => {
                self.status_changed.wait(state);
                true
            }
        }
    }

    fn apply(&self, trigger: TaskTrigger) -> Result<(), TaskError> {
        let mut state = self.state.lock();
        self.apply_locked(&mut state, trigger)
    }

    fn apply_locked(&self, state: &mut TaskState, trigger: TaskTrigger) -> Result<(), TaskError> {
        match resolve(trigger, *state) {
            Resolution::Transition(next) => {
                self.set_locked(state, next);
                Ok(())
            }
            Resolution::Ignore => {
                debug!(parent: &self.span, ?trigger, state = %state, "Request ignored");
                Ok(())
            }
            Resolution::Reject => {
                let to = trigger.target();
                warn!(parent: &self.span, ?trigger, from = %state, %to, "Transition rejected");
                Err(TaskError::InvalidState { from: *state, to })
            }
        }
    }

    fn set_locked(&self, state: &mut TaskState, next: TaskState) {
        if *state == next {
            return;
        }
        debug!(parent: &self.span, from = %state, to = %next, "State changed");
        *state = next;
        self.observed.store(next.code(), Ordering::SeqCst);
        self.state_broadcaster.emit(&next);
        self.status_changed.notify_all();
    }

    fn checkpoint_locked(&self, state: &mut MutexGuard<'_, TaskState>) -> Result<(), TaskError> {
        if **state == TaskState::Pausing {
            self.apply_locked(state, TaskTrigger::TaskPaused)?;
        }
        while **state == TaskState::Paused {
            self.status_changed.wait(state);
        }
        if **state == TaskState::Aborting {
            return Err(TaskError::aborted());
        }
        Ok(())
    }
}

impl Default for TaskStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStateMachine")
            .field("state", &self.state())
            .field("state_broadcaster", &self.state_broadcaster)
            .finish()
    }
}
