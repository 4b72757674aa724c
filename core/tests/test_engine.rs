#[cfg(test)]
mod engine_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    use ultragz_core::engine::{EngineHandle, ParallelismProfile, TaskEngine, TaskError, TaskState};

    fn engine(workers: usize) -> TaskEngine {
        let profile = ParallelismProfile::fixed(workers).with_poll_interval(Duration::from_millis(10));
        TaskEngine::new(profile).expect("engine starts")
    }

    fn fib(handle: EngineHandle, n: u64) -> anyhow::Result<u64> {
        if n < 2 {
            return Ok(n);
        }
        let left = {
            let h = handle.clone();
            handle.submit(move || fib(h, n - 1))
        };
        let right = {
            let h = handle.clone();
            handle.submit(move || fib(h, n - 2))
        };
        Ok(left.get()? + right.get()?)
    }

    #[test]
    fn recursive_spawn_with_fewer_workers_than_tasks() {
        let engine = engine(2);
        let handle = engine.handle();
        let h = handle.clone();
        let result = handle.submit(move || fib(h, 12)).get().unwrap();
        assert_eq!(result, 144);
        engine.shutdown();
    }

    #[test]
    fn single_worker_nested_waits_do_not_deadlock() {
        let engine = engine(1);
        let handle = engine.handle();
        let h = handle.clone();
        let outer = handle.submit(move || {
            let inner: Vec<_> = (0..16u64).map(|i| h.submit(move || Ok(i * 2))).collect();
            let mut sum = 0;
            for task in inner {
                sum += task.get()?;
            }
            Ok(sum)
        });
        assert_eq!(outer.get().unwrap(), 240);
    }

    #[test]
    fn every_task_runs_exactly_once() {
        let engine = engine(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..200)
            .map(|_| {
                let counter = Arc::clone(&counter);
                engine.execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in &handles {
            h.wait().unwrap();
            assert_eq!(h.state(), TaskState::Done);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn cancel_before_selection() {
        let engine = engine(1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let blocker = engine.execute(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        });
        started_rx.recv().unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_task = Arc::clone(&ran);
        let victim = engine.execute(move || {
            ran_in_task.fetch_add(1, Ordering::SeqCst);
        });

        assert!(victim.cancel());
        assert!(victim.is_cancelled());
        assert!(victim.is_done());
        assert!(!victim.cancel(), "second cancel is a no-op");
        assert!(matches!(victim.wait(), Err(TaskError::Cancelled)));

        release_tx.send(()).unwrap();
        blocker.wait().unwrap();
        assert!(!blocker.cancel(), "finished tasks cannot be cancelled");
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failure_is_returned_verbatim_to_every_waiter() {
        let engine = engine(2);
        let task = engine.submit::<u32, _>(|| Err(anyhow::anyhow!("boom")));

        let first = task.get().unwrap_err();
        let second = task.clone().get().unwrap_err();
        match (&first, &second) {
            (TaskError::Failed(a), TaskError::Failed(b)) => {
                assert!(Arc::ptr_eq(a, b));
                assert_eq!(a.to_string(), "boom");
            }
            other => panic!("expected Failed twice, got {other:?}"),
        }
        assert_eq!(task.state(), TaskState::Done);
    }

    #[test]
    fn panics_are_captured() {
        let engine = engine(2);
        let task = engine.submit::<(), _>(|| panic!("kaboom"));
        match task.wait() {
            Err(TaskError::Panicked(msg)) => assert!(msg.contains("kaboom")),
            other => panic!("expected Panicked, got {other:?}"),
        }

        // The worker that caught the panic keeps serving.
        assert_eq!(engine.submit(|| Ok(5)).get().unwrap(), 5);
    }

    #[test]
    fn submit_after_shutdown_is_cancelled() {
        let engine = engine(2);
        let handle = engine.handle();
        engine.shutdown();
        engine.shutdown();
        assert!(handle.is_shut_down());

        let late = handle.submit(|| Ok(1));
        assert!(late.is_cancelled());
        assert!(matches!(late.get(), Err(TaskError::Cancelled)));
    }

    #[test]
    fn shutdown_cancels_queued_tasks() {
        let engine = engine(1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let blocker = engine.execute(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        });
        started_rx.recv().unwrap();

        let queued: Vec<_> = (0..5).map(|i| engine.submit(move || Ok(i))).collect();
        assert_eq!(engine.queued(), 5);

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = release_tx.send(());
        });
        engine.shutdown();
        releaser.join().unwrap();

        blocker.wait().unwrap();
        for task in queued {
            assert!(task.is_cancelled());
        }
    }

    #[test]
    fn worker_threads_know_their_engine() {
        let engine = engine(2);
        let handle = engine.handle();
        assert!(!handle.on_worker_thread());
        let h = handle.clone();
        let inside = engine.submit(move || Ok(h.on_worker_thread()));
        // Either a worker runs it or this thread is not a worker and only
        // waits; a non-worker never runs tasks inline.
        assert!(inside.get().unwrap());
    }
}
