use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, info_span, warn, Span};

use crate::task::{
    config::TaskConfig,
    error::TaskError,
    event::{EventBroadcaster, Subscription},
    state::TaskState,
    state_machine::TaskStateMachine,
};

/// Control surface shared by every task kind.
///
/// `execute` is a blocking call on the executing thread. All other methods may be
/// called from any thread; `pause`, `resume` and `abort` are asynchronous requests
/// that return immediately.
pub trait TaskControl: Send + Sync {
    /// Display name of the task.
    fn name(&self) -> &str;

    /// Run the task to completion on the calling thread.
    ///
    /// Returns only after the task reached `Completed`, `Failed` or `Aborted`. The
    /// error of a failed or aborted run is the one raised inside the work.
    ///
    /// # Errors
    ///
    /// * [`TaskError::InvalidState`] - The task is not `Idle`
    /// * [`TaskError::Aborted`] - The task observed an abort request
    /// * Any error returned by the work
    fn execute(&self) -> Result<(), TaskError>;

    /// Request the task to pause at its next checkpoint.
    ///
    /// Ignored when the task is `Completed` or `Failed`.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidState`] when the task never started or is aborting.
    fn pause(&self) -> Result<(), TaskError>;

    /// Request a paused or pausing task to continue.
    ///
    /// Ignored when the task is `Completed` or `Failed`.
    fn resume(&self) -> Result<(), TaskError>;

    /// Request the task to abort at its next checkpoint.
    ///
    /// Ignored when the task already finished or is aborting.
    fn abort(&self) -> Result<(), TaskError>;

    fn state(&self) -> TaskState;

    /// Block until the task has left `Idle`.
    ///
    /// Since `execute` usually runs on another thread than `pause` and `abort`, this
    /// makes sure those requests are not issued before the task started.
    fn wait_has_started(&self);

    /// Like [`wait_has_started`](Self::wait_has_started), returning `false` on timeout.
    fn wait_has_started_timeout(&self, timeout: Duration) -> bool;

    /// Block until the task is `Completed`, `Failed`, `Aborted` or `Paused`.
    fn wait_inactive(&self) -> TaskState;

    /// Like [`wait_inactive`](Self::wait_inactive), returning `None` on timeout.
    fn wait_inactive_timeout(&self, timeout: Duration) -> Option<TaskState>;

    /// Progress updates in percent, delivered on the executing thread.
    fn subscribe_progress<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&f64) + Send + Sync + 'static;

    /// Progress messages, delivered on the executing thread.
    fn subscribe_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&String) + Send + Sync + 'static;

    /// State changes, delivered on the thread that caused the transition.
    fn subscribe_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TaskState) + Send + Sync + 'static;
}

/// The unit of work run by a [`Task`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use cancellable_task::{Task, TaskContext, TaskControl, TaskError, TaskWork};
///
/// struct Focus {
///     steps: u32,
/// }
///
/// impl TaskWork for Focus {
///     fn on_execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
///         for step in 1..=self.steps {
///             ctx.report_message(format!("focus step {step}"));
///             ctx.interruptable_delay(Duration::from_millis(1))?;
///             ctx.report_progress(f64::from(step) * 100.0 / f64::from(self.steps + 1));
///         }
///         Ok(())
///     }
/// }
///
/// let task = Task::new("Focus", Focus { steps: 3 });
/// task.execute().unwrap();
/// ```
pub trait TaskWork: Send {
    /// Do the work. Called once per `execute`, on the executing thread.
    fn on_execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError>;
}

/// [`TaskWork`] backed by a closure, see [`Task::from_fn`].
pub struct FnWork<F>(F);

impl<F> TaskWork for FnWork<F>
where
    F: FnMut(&TaskContext) -> Result<(), TaskError> + Send,
{
    fn on_execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        (self.0)(ctx)
    }
}

/// Lifecycle, reporting and checkpoint facilities of one task.
///
/// Work receives a `&TaskContext` for the duration of `execute`. The reporting and
/// checkpoint methods are meant for the executing thread only.
pub struct TaskContext {
    config: TaskConfig,
    state_machine: TaskStateMachine,
    progress_broadcaster: EventBroadcaster<f64>,
    message_broadcaster: EventBroadcaster<String>,
    last_reported_progress: Mutex<Option<f64>>,
    span: Span,
}

impl TaskContext {
    pub(crate) fn new(config: TaskConfig) -> Self {
        let span = info_span!("task", name = %config.name);
        Self {
            state_machine: TaskStateMachine::with_span(span.clone()),
            progress_broadcaster: EventBroadcaster::new(),
            message_broadcaster: EventBroadcaster::new(),
            last_reported_progress: Mutex::new(None),
            config,
            span,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state_machine.state()
    }

    /// Broadcast a progress update, expected between 0.0 and 100.0.
    ///
    /// A value equal to the previously reported one is not broadcast again.
    pub fn report_progress(&self, percentage: f64) {
        {
            let mut last = self.last_reported_progress.lock();
            if *last == Some(percentage) {
                return;
            }
            *last = Some(percentage);
        }
        self.progress_broadcaster.emit(&percentage);
    }

    pub fn report_message(&self, message: impl Into<String>) {
        self.message_broadcaster.emit(&message.into());
    }

    /// Checkpoint: blocks while paused and fails with [`TaskError::Aborted`] once an
    /// abort was requested. Work should call it periodically.
    pub fn handle_interruption_request(&self) -> Result<(), TaskError> {
        self.state_machine.handle_interruption_request()
    }

    /// Sleep that wakes early for pause and abort requests, see
    /// [`TaskStateMachine::interruptable_delay`].
    pub fn interruptable_delay(&self, delay: Duration) -> Result<(), TaskError> {
        self.state_machine.interruptable_delay(delay)
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn state_machine(&self) -> &TaskStateMachine {
        &self.state_machine
    }

    /// Drive one execution: `Running`, the work, then exactly one terminal state.
    pub(crate) fn run<F>(&self, work: F) -> Result<(), TaskError>
    where
        F: FnOnce(&TaskContext) -> Result<(), TaskError>,
    {
        self.state_machine.handle_execute_request()?;
        info!(parent: &self.span, "Task started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), TaskError> {
            self.report_progress(0.0);
            work(self)?;
            self.report_progress(100.0);
            Ok(())
        }));

        match outcome {
            Ok(Ok(())) => {
                self.state_machine.handle_task_completed()?;
                info!(parent: &self.span, "Task completed");
                Ok(())
            }
            Ok(Err(error)) => Err(self.finish_with_error(error)),
            Err(payload) => {
                warn!(parent: &self.span, "Task work panicked");
                if let Err(e) = self.state_machine.handle_task_failed() {
                    warn!(parent: &self.span, error = %e, "Could not mark panicked task as failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Move to `Aborted` for an observed abort, to `Failed` for anything else, and
    /// hand the original error back.
    fn finish_with_error(&self, error: TaskError) -> TaskError {
        let aborting = self.state_machine.state() == TaskState::Aborting;
        let transition = if error.is_aborted() && aborting {
            info!(parent: &self.span, "Task aborted");
            self.state_machine.handle_task_aborted()
        } else {
            warn!(parent: &self.span, error = %error, "Task failed");
            self.state_machine.handle_task_failed()
        };
        if let Err(e) = transition {
            warn!(parent: &self.span, error = %e, "Could not record terminal state");
        }
        error
    }

    pub(crate) fn request_pause(&self) -> Result<(), TaskError> {
        if !self.config.can_pause {
            info!(parent: &self.span, "Pause request ignored, task cannot pause");
            return Ok(());
        }
        self.state_machine.handle_pause_request()
    }

    pub(crate) fn request_resume(&self) -> Result<(), TaskError> {
        self.state_machine.handle_resume_request()
    }

    pub(crate) fn request_abort(&self) -> Result<(), TaskError> {
        if !self.config.can_abort {
            info!(parent: &self.span, "Abort request ignored, task cannot abort");
            return Ok(());
        }
        self.state_machine.handle_abort_request()
    }

    pub(crate) fn subscribe_progress<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&f64) + Send + Sync + 'static,
    {
        info!(parent: &self.span, "Client subscribed to progress events");
        self.progress_broadcaster.add_handler(handler)
    }

    pub(crate) fn subscribe_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        info!(parent: &self.span, "Client subscribed to message events");
        self.message_broadcaster.add_handler(handler)
    }

    pub(crate) fn subscribe_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TaskState) + Send + Sync + 'static,
    {
        info!(parent: &self.span, "Client subscribed to state change events");
        self.state_machine.subscribe_state_change(handler)
    }

    /// Number of handlers on the progress, message and state-change broadcasters.
    #[cfg(test)]
    pub(crate) fn subscriber_counts(&self) -> (usize, usize, usize) {
        (
            self.progress_broadcaster.subscriber_count(),
            self.message_broadcaster.subscriber_count(),
            self.state_machine.state_broadcaster().subscriber_count(),
        )
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A named unit of long-running work with a managed lifecycle.
///
/// # Examples
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use cancellable_task::{Task, TaskControl, TaskState};
///
/// let task = Task::from_fn("Simple Task", |ctx| {
///     ctx.report_progress(33.0);
///     ctx.report_progress(66.0);
///     Ok(())
/// });
///
/// let progress = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&progress);
/// let _subscription = task.subscribe_progress(move |p| sink.lock().unwrap().push(*p));
///
/// task.execute().unwrap();
/// assert_eq!(task.state(), TaskState::Completed);
/// assert_eq!(*progress.lock().unwrap(), vec![0.0, 33.0, 66.0, 100.0]);
/// ```
pub struct Task<W> {
    context: TaskContext,
    work: Mutex<W>,
}

impl<W: TaskWork> Task<W> {
    pub fn new(config: impl Into<TaskConfig>, work: W) -> Self {
        Self {
            context: TaskContext::new(config.into()),
            work: Mutex::new(work),
        }
    }

    /// Inspect the work, e.g. results it stored. Blocks while `execute` is running.
    pub fn with_work<R>(&self, inspect: impl FnOnce(&W) -> R) -> R {
        inspect(&self.work.lock())
    }

    pub fn into_work(self) -> W {
        self.work.into_inner()
    }

    #[cfg(test)]
    pub(crate) fn context(&self) -> &TaskContext {
        &self.context
    }
}

impl<F> Task<FnWork<F>> {
    /// Task running the closure `work`.
    pub fn from_fn(config: impl Into<TaskConfig>, work: F) -> Self
    where
        F: FnMut(&TaskContext) -> Result<(), TaskError> + Send,
    {
        Task::new(config, FnWork(work))
    }
}

impl<W: TaskWork> TaskControl for Task<W> {
    fn name(&self) -> &str {
        self.context.name()
    }

    fn execute(&self) -> Result<(), TaskError> {
        self.context.run(|ctx| self.work.lock().on_execute(ctx))
    }

    fn pause(&self) -> Result<(), TaskError> {
        self.context.request_pause()
    }

    fn resume(&self) -> Result<(), TaskError> {
        self.context.request_resume()
    }

    fn abort(&self) -> Result<(), TaskError> {
        self.context.request_abort()
    }

    fn state(&self) -> TaskState {
        self.context.state()
    }

    fn wait_has_started(&self) {
        self.context.state_machine().wait_has_started();
    }

    fn wait_has_started_timeout(&self, timeout: Duration) -> bool {
        self.context.state_machine().wait_has_started_timeout(timeout)
    }

    fn wait_inactive(&self) -> TaskState {
        self.context.state_machine().wait_inactive()
    }

    fn wait_inactive_timeout(&self, timeout: Duration) -> Option<TaskState> {
        self.context.state_machine().wait_inactive_timeout(timeout)
    }

    fn subscribe_progress<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&f64) + Send + Sync + 'static,
    {
        self.context.subscribe_progress(handler)
    }

    fn subscribe_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.context.subscribe_message(handler)
    }

    fn subscribe_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TaskState) + Send + Sync + 'static,
    {
        self.context.subscribe_state_change(handler)
    }
}

impl<W> fmt::Debug for Task<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
