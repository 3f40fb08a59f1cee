//! Error types for task execution and control.
//!
//! Control requests fail synchronously with [`TaskError::InvalidState`] when the
//! transition table forbids them. Errors raised by caller-supplied work drive the
//! task into exactly one terminal state before they are handed back, unmodified,
//! to the caller of `execute()`.

use std::error::Error as StdError;

use thiserror::Error;

use crate::task::state::TaskState;

/// Boxed error raised by caller-supplied work.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Main error type for task operations.
///
/// # Examples
///
/// ## Rejected transitions
///
/// ```rust
/// use cancellable_task::{Task, TaskControl, TaskError, TaskState};
///
/// let task = Task::from_fn("never started", |_| Ok(()));
///
/// match task.pause() {
///     Err(TaskError::InvalidState { from, to }) => {
///         assert_eq!(from, TaskState::Idle);
///         assert_eq!(to, TaskState::Pausing);
///     }
///     other => panic!("Expected invalid state error, got {other:?}"),
/// }
/// ```
///
/// ## Errors from the work itself
///
/// ```rust
/// use std::io;
/// use cancellable_task::{Task, TaskControl, TaskError, TaskState};
///
/// let task = Task::from_fn("read detector", |_| {
///     Err(TaskError::work(io::Error::new(io::ErrorKind::NotFound, "no detector")))
/// });
///
/// let error = task.execute().unwrap_err();
/// assert_eq!(task.state(), TaskState::Failed);
/// assert_eq!(error.downcast_work::<io::Error>().unwrap().kind(), io::ErrorKind::NotFound);
/// ```
#[derive(Error, Debug)]
pub enum TaskError {
    /// A control request or notification is not allowed in the current state.
    ///
    /// ```rust
    /// use cancellable_task::{TaskError, TaskState};
    ///
    /// let error = TaskError::InvalidState { from: TaskState::Idle, to: TaskState::Paused };
    /// assert_eq!(error.to_string(), "Cannot transition from Idle to Paused");
    /// ```
    #[error("Cannot transition from {from} to {to}")]
    InvalidState {
        /// State the machine was in
        from: TaskState,
        /// State the request would have led to
        to: TaskState,
    },

    /// An operation reserved for the executing thread was called while the task
    /// is not executing.
    #[error("Operation requires an executing task, current state is {0}")]
    NotExecuting(TaskState),

    /// The task observed an abort request at a checkpoint.
    ///
    /// ```rust
    /// use cancellable_task::TaskError;
    ///
    /// let error = TaskError::Aborted("Task has been aborted".to_string());
    /// assert!(error.is_aborted());
    /// ```
    #[error("Task aborted: {0}")]
    Aborted(String),

    /// The task failed for a task-specific reason.
    ///
    /// ```rust
    /// use cancellable_task::TaskError;
    ///
    /// let error = TaskError::Failed("No user response received".to_string());
    /// assert!(error.to_string().contains("No user response"));
    /// ```
    #[error("Task failed: {0}")]
    Failed(String),

    /// The task is not supported in this environment.
    ///
    /// Typical reasons are a missing license or an unsupported system
    /// configuration.
    #[error("Task not supported: {0}")]
    NotSupported(String),

    /// Any other error raised by caller-supplied work, passed through as is.
    #[error(transparent)]
    Work(BoxError),

    /// Integer code that does not name a [`TaskState`].
    #[error("Unknown task state code: {0}")]
    UnknownState(u8),
}

impl TaskError {
    /// Wrap an arbitrary error raised by caller-supplied work.
    pub fn work<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        TaskError::Work(error.into())
    }

    /// Abort signal observed at a checkpoint.
    pub(crate) fn aborted() -> Self {
        TaskError::Aborted("Task has been aborted".to_string())
    }

    /// Whether this error is the abort signal.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, TaskError::Aborted(_))
    }

    /// Borrow the original work error if it is of type `E`.
    #[must_use]
    pub fn downcast_work<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            TaskError::Work(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct DivisionByZero;

    impl fmt::Display for DivisionByZero {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("division by zero")
        }
    }

    impl StdError for DivisionByZero {}

    #[test]
    fn test_work_error_is_transparent() {
        let error = TaskError::work(DivisionByZero);
        assert_eq!(error.to_string(), "division by zero");
        assert!(error.downcast_work::<DivisionByZero>().is_some());
        assert!(!error.is_aborted());
    }

    #[test]
    fn test_work_error_from_string() {
        let error = TaskError::work("sensor offline");
        assert_eq!(error.to_string(), "sensor offline");
        assert!(error.downcast_work::<DivisionByZero>().is_none());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            TaskError::NotExecuting(TaskState::Idle).to_string(),
            "Operation requires an executing task, current state is Idle"
        );
        assert_eq!(
            TaskError::aborted().to_string(),
            "Task aborted: Task has been aborted"
        );
        assert!(TaskError::NotSupported("no license".to_string())
            .to_string()
            .contains("no license"));
    }
}
