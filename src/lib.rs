pub mod task;

pub use task::{
    config::TaskConfig,
    error::TaskError,
    event::{EventBroadcaster, Subscription, SubscriptionGuard},
    executor::TaskThread,
    interactive::{InteractiveContext, InteractiveTask, InteractiveWork},
    state::TaskState,
    state_machine::TaskStateMachine,
    tasks::{Task, TaskContext, TaskControl, TaskWork},
};
