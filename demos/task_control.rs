use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cancellable_task::{Task, TaskControl, TaskState, TaskThread};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

/// Example: controlling a running task from another thread
/// Pauses a long acquisition, resumes it and finally aborts it.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env())
        .init();

    println!("Task Control Example");

    let task = Arc::new(Task::from_fn("Acquisition", |ctx| {
        for frame in 1..=100 {
            ctx.interruptable_delay(Duration::from_millis(50))?;
            ctx.report_progress(f64::from(frame));
            ctx.report_message(format!("frame {frame} stored"));
        }
        Ok(())
    }));

    let _states = task
        .subscribe_state_change(|s| println!("  state: {s}"))
        .guard();
    let _messages = task.subscribe_message(|m| println!("  {m}")).guard();

    let worker = TaskThread::spawn(Arc::clone(&task))?;
    task.wait_has_started();

    thread::sleep(Duration::from_millis(300));
    println!("Pausing...");
    task.pause()?;
    let reached = task.wait_inactive();
    println!("Task is {reached}, waiting a bit");
    thread::sleep(Duration::from_millis(500));

    println!("Resuming...");
    task.resume()?;
    thread::sleep(Duration::from_millis(300));

    println!("Aborting...");
    task.abort()?;

    match worker.join() {
        Err(e) if e.is_aborted() => println!("Acquisition stopped: {e}"),
        Err(e) => return Err(e.into()),
        Ok(()) => println!("Acquisition finished before the abort"),
    }
    assert!(matches!(task.state(), TaskState::Aborted | TaskState::Completed));
    Ok(())
}
