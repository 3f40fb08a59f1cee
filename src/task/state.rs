//! Lifecycle states of a task.

use std::fmt;

use crate::task::error::TaskError;

/// The basic state model of a task.
///
/// ```text
/// Idle ─► Running ─┬─► Pausing ─► Paused ─► Running
///                  ├─► Aborting ─► Aborted
///                  ├─► Completed
///                  └─► Failed
/// ```
///
/// Each state has a stable integer code (see [`TaskState::code`]) so it can be
/// handed to collaborators that only understand plain integers.
///
/// # Examples
///
/// ```rust
/// use cancellable_task::TaskState;
///
/// assert!(TaskState::Completed.is_terminal());
/// assert!(TaskState::Paused.is_inactive());
/// assert_eq!(TaskState::try_from(2u8).unwrap(), TaskState::Running);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Task ready to be run.
    Idle = 1,
    /// Task running.
    Running = 2,
    /// Pause requested, task still executing.
    Pausing = 3,
    /// Abort requested, task still executing.
    Aborting = 4,
    /// Task blocked at a checkpoint until resumed.
    Paused = 5,
    /// Task completed successfully.
    Completed = 6,
    /// Task ran into an error.
    Failed = 7,
    /// Task stopped because of an external abort request.
    Aborted = 8,
}

impl TaskState {
    /// All states, in code order.
    pub const ALL: [TaskState; 8] = [
        TaskState::Idle,
        TaskState::Running,
        TaskState::Pausing,
        TaskState::Aborting,
        TaskState::Paused,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Aborted,
    ];

    /// Integer code of the state.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// `Completed`, `Failed` or `Aborted`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Aborted
        )
    }

    /// States in which the executing thread is still inside the work.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskState::Running | TaskState::Pausing | TaskState::Aborting
        )
    }

    /// States `wait_inactive` returns on: terminal states and `Paused`.
    #[must_use]
    pub fn is_inactive(self) -> bool {
        self.is_terminal() || self == TaskState::Paused
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "Idle",
            TaskState::Running => "Running",
            TaskState::Pausing => "Pausing",
            TaskState::Aborting => "Aborting",
            TaskState::Paused => "Paused",
            TaskState::Completed => "Completed",
            TaskState::Failed => "Failed",
            TaskState::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

impl From<TaskState> for u8 {
    fn from(state: TaskState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for TaskState {
    type Error = TaskError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.code() == code)
            .ok_or(TaskError::UnknownState(code))
    }
}
