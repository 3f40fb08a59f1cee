//! Running a task on its own thread.
//!
//! `execute` blocks the calling thread, so the usual setup is one worker thread per
//! task and a controlling thread that pauses, resumes or aborts it.

use std::io;
use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::task::{error::TaskError, tasks::TaskControl};

/// Handle to a task executing on a named worker thread.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use cancellable_task::{Task, TaskControl, TaskError, TaskState, TaskThread};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let task = Arc::new(Task::from_fn("Long exposure", |ctx| {
///     ctx.interruptable_delay(Duration::from_secs(10))
/// }));
///
/// let worker = TaskThread::spawn(Arc::clone(&task))?;
/// task.wait_has_started();
/// task.abort()?;
///
/// let result = worker.join();
/// assert!(matches!(result, Err(TaskError::Aborted(_))));
/// assert_eq!(task.state(), TaskState::Aborted);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TaskThread {
    name: String,
    handle: JoinHandle<Result<(), TaskError>>,
}

impl TaskThread {
    /// Start `task.execute()` on a new thread named after the task.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the thread cannot be created.
    pub fn spawn<T>(task: Arc<T>) -> io::Result<Self>
    where
        T: TaskControl + 'static,
    {
        let name = task.name().to_string();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || task.execute())?;
        debug!(task = %name, "Task thread spawned");
        Ok(Self { name, handle })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once `execute` has returned on the worker.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return what `execute` returned.
    ///
    /// A panic raised by the work is resumed on the joining thread.
    pub fn join(self) -> Result<(), TaskError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}
