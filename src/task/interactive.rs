//! Interactive tasks.
//!
//! An [`InteractiveTask`] can block its executing thread until another thread
//! supplies a response. The executing thread announces what it needs on the
//! "user response requested" broadcaster and waits on a dedicated condition
//! variable; [`InteractiveTask::provide_user_response`] records the answer and wakes it,
//! and [`abort`](TaskControl::abort) wakes it too so the abort is observed without
//! waiting for an answer that may never come.

use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::task::{
    config::TaskConfig,
    error::TaskError,
    event::{EventBroadcaster, Subscription},
    state::TaskState,
    tasks::{TaskContext, TaskControl},
};

struct ResponseSlot<Resp> {
    waiting: bool,
    response: Option<Resp>,
}

/// Request/response rendezvous between the executing thread and a responder.
struct UserPrompt<Req, Resp> {
    requested_broadcaster: EventBroadcaster<Req>,
    slot: Mutex<ResponseSlot<Resp>>,
    response_arrived: Condvar,
    valid_user_actions: Mutex<Vec<Resp>>,
}

impl<Req: Send + 'static, Resp: Send + 'static> UserPrompt<Req, Resp> {
    fn new() -> Self {
        Self {
            requested_broadcaster: EventBroadcaster::new(),
            slot: Mutex::new(ResponseSlot {
                waiting: false,
                response: None,
            }),
            response_arrived: Condvar::new(),
            valid_user_actions: Mutex::new(Vec::new()),
        }
    }

    fn request(&self, base: &TaskContext, instruction: Req) -> Result<Resp, TaskError> {
        if !self.requested_broadcaster.is_subscribed() {
            return Err(TaskError::Failed(
                "Client not subscribed to \"user response requested\" events, the task would hang"
                    .to_string(),
            ));
        }

        {
            let mut slot = self.slot.lock();
            slot.response = None;
            slot.waiting = true;
        }

        // An abort that landed before `waiting` was set found nobody to wake.
        if base.state() == TaskState::Aborting {
            self.end_wait();
        } else {
            info!(parent: base.span(), "User response requested");
            self.requested_broadcaster.emit(&instruction);
        }

        let response = {
            let mut slot = self.slot.lock();
            while slot.waiting {
                self.response_arrived.wait(&mut slot);
            }
            slot.response.take()
        };

        base.handle_interruption_request()?;

        response.ok_or_else(|| {
            TaskError::Failed("No user response received by the interactive task".to_string())
        })
    }

    fn provide(&self, response: Resp) {
        let mut slot = self.slot.lock();
        slot.response = Some(response);
        self.valid_user_actions.lock().clear();
        slot.waiting = false;
        self.response_arrived.notify_all();
    }

    fn is_waiting(&self) -> bool {
        self.slot.lock().waiting
    }

    fn end_wait(&self) {
        let mut slot = self.slot.lock();
        slot.waiting = false;
        self.response_arrived.notify_all();
    }

    fn set_valid_user_actions(&self, actions: Vec<Resp>) {
        *self.valid_user_actions.lock() = actions;
    }
}

impl<Req, Resp: Clone> UserPrompt<Req, Resp> {
    fn valid_user_actions(&self) -> Vec<Resp> {
        self.valid_user_actions.lock().clone()
    }
}

/// What the work of an [`InteractiveTask`] sees: the regular [`TaskContext`] plus
/// the ability to ask for a response.
pub struct InteractiveContext<Req, Resp> {
    base: TaskContext,
    prompt: UserPrompt<Req, Resp>,
}

impl<Req: Send + 'static, Resp: Send + 'static> InteractiveContext<Req, Resp> {
    fn new(config: TaskConfig) -> Self {
        Self {
            base: TaskContext::new(config),
            prompt: UserPrompt::new(),
        }
    }

    /// Ask for a response and block until one is provided.
    ///
    /// `instruction` is broadcast to the "user response requested" subscribers, then
    /// the executing thread waits until [`InteractiveTask::provide_user_response`] is
    /// called or the task is aborted.
    ///
    /// # Errors
    ///
    /// * [`TaskError::Failed`] - Nobody is subscribed to the request, or the wait
    ///   ended without a response
    /// * [`TaskError::Aborted`] - The task was aborted while waiting
    pub fn request_user_response(&self, instruction: Req) -> Result<Resp, TaskError> {
        self.prompt.request(&self.base, instruction)
    }

    pub fn set_valid_user_actions(&self, actions: impl IntoIterator<Item = Resp>) {
        self.prompt
            .set_valid_user_actions(actions.into_iter().collect());
    }
}

impl<Req, Resp: Clone> InteractiveContext<Req, Resp> {
    #[must_use]
    pub fn valid_user_actions(&self) -> Vec<Resp> {
        self.prompt.valid_user_actions()
    }
}

impl<Req, Resp> Deref for InteractiveContext<Req, Resp> {
    type Target = TaskContext;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

/// The unit of work run by an [`InteractiveTask`].
pub trait InteractiveWork<Req, Resp>: Send {
    fn on_execute(&mut self, ctx: &InteractiveContext<Req, Resp>) -> Result<(), TaskError>;
}

/// [`InteractiveWork`] backed by a closure, see [`InteractiveTask::from_fn`].
pub struct InteractiveFnWork<F>(F);

impl<F, Req, Resp> InteractiveWork<Req, Resp> for InteractiveFnWork<F>
where
    F: FnMut(&InteractiveContext<Req, Resp>) -> Result<(), TaskError> + Send,
{
    fn on_execute(&mut self, ctx: &InteractiveContext<Req, Resp>) -> Result<(), TaskError> {
        (self.0)(ctx)
    }
}

/// A task whose work can block pending a response from another thread.
///
/// Pause requests are ignored while the work waits for a response.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use cancellable_task::{InteractiveContext, InteractiveTask, TaskControl, TaskState, TaskThread};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let task = Arc::new(InteractiveTask::from_fn(
///     "Align beam",
///     |ctx: &InteractiveContext<String, String>| {
///         ctx.set_valid_user_actions(["accept".to_string(), "retry".to_string()]);
///         let answer = ctx.request_user_response("Is the beam centred?".to_string())?;
///         ctx.report_message(format!("user chose {answer}"));
///         Ok(())
///     },
/// ));
///
/// let responder = Arc::clone(&task);
/// let _prompt = task.subscribe_user_response_requested(move |_instruction| {
///     let responder = Arc::clone(&responder);
///     std::thread::spawn(move || responder.provide_user_response("accept".to_string()));
/// });
///
/// TaskThread::spawn(Arc::clone(&task))?.join()?;
/// assert_eq!(task.state(), TaskState::Completed);
/// # Ok(())
/// # }
/// ```
pub struct InteractiveTask<W, Req, Resp> {
    context: InteractiveContext<Req, Resp>,
    work: Mutex<W>,
}

impl<W, Req, Resp> InteractiveTask<W, Req, Resp>
where
    W: InteractiveWork<Req, Resp>,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new(config: impl Into<TaskConfig>, work: W) -> Self {
        Self {
            context: InteractiveContext::new(config.into()),
            work: Mutex::new(work),
        }
    }

    /// Inspect the work. Blocks while `execute` is running.
    pub fn with_work<R>(&self, inspect: impl FnOnce(&W) -> R) -> R {
        inspect(&self.work.lock())
    }

    pub fn into_work(self) -> W {
        self.work.into_inner()
    }

    /// Requests for a response, delivered on the executing thread.
    ///
    /// Handlers must not block waiting for the response themselves; hand the
    /// instruction to another thread that calls [`provide_user_response`](Self::provide_user_response).
    pub fn subscribe_user_response_requested<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Req) + Send + Sync + 'static,
    {
        info!(parent: self.context.span(), "Client subscribed to user response requested events");
        self.context.prompt.requested_broadcaster.add_handler(handler)
    }

    /// Record `response`, clear the valid user actions and wake the waiting work.
    ///
    /// Call this from a thread other than the executing one. Without an outstanding
    /// request the response is stored but discarded by the next request.
    pub fn provide_user_response(&self, response: Resp) {
        debug!(parent: self.context.span(), "User response provided");
        self.context.prompt.provide(response);
    }

    /// `true` while the work is blocked in `request_user_response`.
    #[must_use]
    pub fn is_waiting_for_user_response(&self) -> bool {
        self.context.prompt.is_waiting()
    }

    pub fn set_valid_user_actions(&self, actions: impl IntoIterator<Item = Resp>) {
        self.context.set_valid_user_actions(actions);
    }
}

impl<W, Req, Resp: Clone> InteractiveTask<W, Req, Resp> {
    /// Responses the UI may offer for the current request.
    #[must_use]
    pub fn valid_user_actions(&self) -> Vec<Resp> {
        self.context.valid_user_actions()
    }
}

impl<F, Req, Resp> InteractiveTask<InteractiveFnWork<F>, Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Interactive task running the closure `work`.
    pub fn from_fn(config: impl Into<TaskConfig>, work: F) -> Self
    where
        F: FnMut(&InteractiveContext<Req, Resp>) -> Result<(), TaskError> + Send,
    {
        InteractiveTask::new(config, InteractiveFnWork(work))
    }
}

impl<W, Req, Resp> TaskControl for InteractiveTask<W, Req, Resp>
where
    W: InteractiveWork<Req, Resp>,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &str {
        self.context.name()
    }

    fn execute(&self) -> Result<(), TaskError> {
        self.context
            .base
            .run(|_| self.work.lock().on_execute(&self.context))
    }

    fn pause(&self) -> Result<(), TaskError> {
        if self.is_waiting_for_user_response() {
            debug!(parent: self.context.span(), "Pause ignored while waiting for a user response");
            return Ok(());
        }
        self.context.request_pause()
    }

    fn resume(&self) -> Result<(), TaskError> {
        self.context.request_resume()
    }

    fn abort(&self) -> Result<(), TaskError> {
        self.context.request_abort()?;
        if self.context.state() == TaskState::Aborting && self.is_waiting_for_user_response() {
            self.context.prompt.end_wait();
        }
        Ok(())
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

impl<W, Req: 'static, Resp> fmt::Debug for InteractiveTask<W, Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveTask")
            .field("context", &self.context.base)
            .field(
                "response_requested_subscribers",
                &self.context.prompt.requested_broadcaster.subscriber_count(),
            )
            .finish_non_exhaustive()
    }
}
