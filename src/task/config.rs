/// Construction options of a task.
///
/// # Examples
///
/// ```rust
/// use cancellable_task::TaskConfig;
///
/// let config = TaskConfig::new("Acquire spectrum").can_pause(false);
/// assert_eq!(config.name, "Acquire spectrum");
/// assert!(!config.can_pause);
/// assert!(config.can_abort);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    /// Display name of the task
    pub name: String,

    /// Forward pause requests to the state machine; when `false` they are ignored
    pub can_pause: bool,

    /// Forward abort requests to the state machine; when `false` they are ignored
    pub can_abort: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            can_pause: true,
            can_abort: true,
        }
    }
}

impl TaskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        TaskConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn can_pause(mut self, can_pause: bool) -> Self {
        self.can_pause = can_pause;
        self
    }

    pub fn can_abort(mut self, can_abort: bool) -> Self {
        self.can_abort = can_abort;
        self
    }
}

impl From<&str> for TaskConfig {
    fn from(name: &str) -> Self {
        TaskConfig::new(name)
    }
}

impl From<String> for TaskConfig {
    fn from(name: String) -> Self {
        TaskConfig::new(name)
    }
}
