use std::time::Duration;

use cancellable_task::{Task, TaskContext, TaskControl, TaskError, TaskWork};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

/// Example: a task with progress and message reporting
/// Averages a few simulated readings and keeps the result in the work.
struct AverageReadings {
    readings: Vec<f64>,
    average: Option<f64>,
}

impl TaskWork for AverageReadings {
    fn on_execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let total = self.readings.len();
        let mut sum = 0.0;
        for (index, reading) in self.readings.iter().enumerate() {
            ctx.report_message(format!("reading {} of {total}: {reading}", index + 1));
            ctx.interruptable_delay(Duration::from_millis(100))?;
            sum += reading;
            ctx.report_progress((index + 1) as f64 * 100.0 / (total + 1) as f64);
        }
        if total == 0 {
            return Err(TaskError::Failed("No readings to average".to_string()));
        }
        self.average = Some(sum / total as f64);
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env())
        .init();

    println!("Running basic task example...");

    let task = Task::new(
        "Average readings",
        AverageReadings {
            readings: vec![4.2, 4.4, 4.1, 4.3],
            average: None,
        },
    );

    let _progress = task
        .subscribe_progress(|p| println!("  progress: {p:.0}%"))
        .guard();
    let _messages = task.subscribe_message(|m| println!("  {m}")).guard();
    let _states = task
        .subscribe_state_change(|s| println!("  state: {s}"))
        .guard();

    task.execute()?;

    if let Some(average) = task.with_work(|work| work.average) {
        println!("Average: {average:.2}");
    }
    Ok(())
}
