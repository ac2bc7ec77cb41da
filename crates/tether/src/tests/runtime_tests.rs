//! Host runtime scheduling and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use super::support::Journal;
use crate::runtime::{HostRuntime, MainLoop, SequencedTaskRunner, TaskRunner, ThreadPool};

#[test]
fn main_loop_runs_posted_tasks_until_quit() {
    let main_loop = MainLoop::new();
    let journal = Journal::default();
    for index in 0..3 {
        let recorder = journal.clone();
        assert!(main_loop.post_task(Box::new(move || recorder.record(&format!("task {index}")))));
    }
    main_loop.quit_handle().quit();
    let late = journal.clone();
    assert!(main_loop.post_task(Box::new(move || late.record("after quit"))));

    main_loop.run();

    assert_eq!(journal.events(), vec!["task 0", "task 1", "task 2"]);
}

#[test]
fn quit_from_another_thread_ends_the_loop() {
    let main_loop = MainLoop::new();
    let quit = main_loop.quit_handle();
    let worker = std::thread::spawn(move || quit.quit());
    main_loop.run();
    worker.join().expect("quit thread");
}

#[test]
fn panicking_task_does_not_stop_the_pool() {
    let pool = ThreadPool::new("test-pool", 2).expect("pool");
    let (sender, receiver) = mpsc::channel();
    assert!(pool.post_task(Box::new(|| panic!("task failure"))));
    assert!(pool.post_task(Box::new(move || sender.send(7).expect("send"))));
    assert_eq!(
        receiver.recv_timeout(Duration::from_secs(2)).expect("task ran"),
        7
    );
    pool.shutdown();
}

#[test]
fn stopped_pool_rejects_work() {
    let pool = ThreadPool::new("test-pool", 1).expect("pool");
    pool.shutdown();
    pool.shutdown();
    assert!(!pool.post_task(Box::new(|| {})));
}

#[test]
fn sequenced_runner_preserves_order() {
    let runner = SequencedTaskRunner::new("test-seq").expect("runner");
    let journal = Journal::default();
    let (sender, receiver) = mpsc::channel();
    for index in 0..5 {
        let recorder = journal.clone();
        assert!(runner.post_task(Box::new(move || recorder.record(&index.to_string()))));
    }
    assert!(runner.post_task(Box::new(move || sender.send(()).expect("send"))));
    receiver
        .recv_timeout(Duration::from_secs(2))
        .expect("runner drained");
    assert_eq!(journal.events(), vec!["0", "1", "2", "3", "4"]);
    runner.shutdown();
}

struct Retired(Journal);

impl Drop for Retired {
    fn drop(&mut self) {
        self.0.record("retired dropped");
    }
}

#[test]
fn retired_resources_outlive_the_runners() {
    let runtime = HostRuntime::new(1).expect("runtime");
    let journal = Journal::default();
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);
    let recorder = journal.clone();
    let (started, running) = mpsc::channel();
    assert!(runtime.thread_pool().post_task(Box::new(move || {
        started.send(()).expect("send");
        std::thread::sleep(Duration::from_millis(50));
        recorder.record("task finished");
        counter.fetch_add(1, Ordering::SeqCst);
    })));
    running
        .recv_timeout(Duration::from_secs(2))
        .expect("task started");
    runtime.retire(Box::new(Retired(journal.clone())));

    runtime.shutdown();

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(journal.events(), vec!["task finished", "retired dropped"]);
}
