//! Cancellable task execution.
//!
//! This module provides the building blocks for long-running units of work whose
//! lifecycle is governed by a thread-safe state machine. A task is executed
//! synchronously on one thread while any number of other threads observe it
//! through event broadcasters and steer it with pause, resume and abort requests.
//!
//! ## Core Components
//!
//! - [`state::TaskState`]: Lifecycle states of a task
//! - [`state_machine::TaskStateMachine`]: Legal transitions, state-change broadcasting and blocking waits
//! - [`event::EventBroadcaster`]: Synchronous multi-subscriber callback dispatcher
//! - [`tasks::Task`]: A named unit of work with progress and message reporting
//! - [`interactive::InteractiveTask`]: A task that can block pending an external response
//! - [`executor::TaskThread`]: Runs a task on a dedicated worker thread
//! - [`error::TaskError`]: Error types for task execution and control
//!
//! ## Usage
//!
//! The typical workflow involves:
//!
//! 1. Supply the work, either as a closure or a [`tasks::TaskWork`] implementation
//! 2. Subscribe to progress, message and state-change events
//! 3. Execute the task on a worker thread and control it from another
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cancellable_task::{Task, TaskControl, TaskState, TaskThread};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let task = Arc::new(Task::from_fn("calibrate", |ctx| {
//!     for step in 1..=4 {
//!         ctx.interruptable_delay(Duration::from_millis(5))?;
//!         ctx.report_progress(f64::from(step) * 25.0);
//!     }
//!     Ok(())
//! }));
//!
//! let _progress = task.subscribe_progress(|p| println!("progress: {p}%"));
//!
//! let worker = TaskThread::spawn(Arc::clone(&task))?;
//! worker.join()?;
//! assert_eq!(task.state(), TaskState::Completed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod interactive;
pub mod state;
pub mod state_machine;
pub mod tasks;

#[cfg(test)]
mod tests;

pub use interactive::InteractiveTask;
pub use tasks::Task;
