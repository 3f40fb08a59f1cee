use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use cancellable_task::{
    InteractiveContext, InteractiveTask, Task, TaskContext, TaskControl, TaskError, TaskThread,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn checkpoint_loop(steps: u32) -> impl FnMut(&TaskContext) -> Result<(), TaskError> + Send {
    move |ctx| {
        for step in 0..steps {
            ctx.handle_interruption_request()?;
            ctx.report_progress(f64::from(step));
        }
        Ok(())
    }
}

fn bench_execute_inline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Task Execution Inline");

    for steps in [1, 10, 100, 1000] {
        group.throughput(Throughput::Elements(u64::from(steps)));
        group.bench_with_input(BenchmarkId::new("checkpoints", steps), &steps, |b, &steps| {
            b.iter(|| {
                let task = Task::from_fn("bench", checkpoint_loop(steps));
                let _progress = task
                    .subscribe_progress(|p| {
                        black_box(p);
                    })
                    .guard();
                task.execute().unwrap();
                black_box(task.state())
            });
        });
    }

    group.finish();
}

fn bench_execute_on_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("Task Execution On Worker Threads");

    for count in [1, 4, 16] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("spawn_join", count), &count, |b, &count| {
            b.iter(|| {
                let workers: Vec<_> = (0..count)
                    .map(|i| {
                        let task = Task::from_fn(format!("bench-{i}"), checkpoint_loop(10));
                        TaskThread::spawn(Arc::new(task)).unwrap()
                    })
                    .collect();
                for worker in workers {
                    worker.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_abort_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("Abort Latency");
    group.sample_size(20);

    group.bench_function("abort_long_delay", |b| {
        b.iter(|| {
            let task = Arc::new(Task::from_fn("sleeper", |ctx| {
                ctx.interruptable_delay(Duration::from_secs(60))
            }));
            let worker = TaskThread::spawn(Arc::clone(&task)).unwrap();
            task.wait_has_started();
            task.abort().unwrap();
            black_box(worker.join().unwrap_err())
        });
    });

    group.finish();
}

fn bench_user_response_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("Interactive Round Trip");
    group.sample_size(20);

    for questions in [1, 10] {
        group.throughput(Throughput::Elements(questions));
        group.bench_with_input(
            BenchmarkId::new("questions", questions),
            &questions,
            |b, &questions| {
                b.iter(|| {
                    let task = Arc::new(InteractiveTask::from_fn(
                        "quiz",
                        move |ctx: &InteractiveContext<u64, u64>| {
                            for question in 0..questions {
                                let answer = ctx.request_user_response(question)?;
                                black_box(answer);
                            }
                            Ok(())
                        },
                    ));
                    let responder = Arc::downgrade(&task);
                    let _questions = task
                        .subscribe_user_response_requested(move |question| {
                            let responder = responder.clone();
                            let answer = *question * 2;
                            std::thread::spawn(move || {
                                if let Some(task) = responder.upgrade() {
                                    task.provide_user_response(answer);
                                }
                            });
                        })
                        .guard();
                    task.execute().unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_execute_inline,
    bench_execute_on_thread,
    bench_abort_latency,
    bench_user_response_round_trip
);
criterion_main!(benches);
