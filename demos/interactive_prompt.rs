use std::io::{self, BufRead, Write};
use std::sync::{mpsc, Arc};

use cancellable_task::{InteractiveContext, InteractiveTask, TaskControl, TaskError, TaskThread};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

/// Example: an interactive task asking the operator on stdin
/// The task thread asks, the main thread answers from the terminal.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env())
        .init();

    println!("Interactive Task Example");

    let task = Arc::new(InteractiveTask::from_fn(
        "Sample exchange",
        |ctx: &InteractiveContext<String, String>| {
            ctx.report_progress(20.0);
            ctx.set_valid_user_actions(["yes".to_string(), "no".to_string()]);
            let answer = ctx.request_user_response("Is the new sample mounted?".to_string())?;
            if answer != "yes" {
                return Err(TaskError::Failed(format!("Operator answered {answer:?}")));
            }
            ctx.report_message("sample mounted, continuing");
            Ok(())
        },
    ));

    let (question_tx, question_rx) = mpsc::channel::<String>();
    let _questions = task
        .subscribe_user_response_requested(move |question| {
            let _ = question_tx.send(question.clone());
        })
        .guard();
    let _messages = task.subscribe_message(|m| println!("  {m}")).guard();

    let worker = TaskThread::spawn(Arc::clone(&task))?;

    // The sender lives in the task's broadcaster; stop once the task is done.
    while !worker.is_finished() {
        let Ok(question) = question_rx.recv_timeout(std::time::Duration::from_millis(100)) else {
            continue;
        };
        let actions = task.valid_user_actions();
        print!("{question} {actions:?} ");
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        task.provide_user_response(line.trim().to_string());
    }

    match worker.join() {
        Ok(()) => println!("Task {} completed", task.name()),
        Err(e) => println!("Task {} ended: {e}", task.name()),
    }
    Ok(())
}
