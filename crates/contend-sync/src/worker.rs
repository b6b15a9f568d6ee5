//! Named worker threads released together.
//!
//! Every scenario runs its unit of work as a plain closure on a named OS thread. All
//! workers block on a [`StartGate`] until the last one has been spawned, so that they
//! reach the shared resource at roughly the same time.

use contend_core::{ContendError, Result};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::thread;
use tracing::debug;

/// One-shot gate: closed until [`StartGate::open`], then open forever.
#[derive(Debug, Default)]
pub struct StartGate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate is opened
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }
}

/// Run `job(index)` on `workers` threads named `<prefix>-<n>` and collect the results in
/// worker order.
///
/// A panic in any worker is reported as [`ContendError::WorkerPanicked`] once all
/// workers have been joined.
pub fn run_workers<F, R>(prefix: &str, workers: usize, job: F) -> Result<Vec<R>>
where
    F: Fn(usize) -> R + Sync,
    R: Send,
{
    if workers == 0 {
        return Err(ContendError::invalid_input("worker count must be greater than 0"));
    }

    let gate = StartGate::new();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let gate = &gate;
            let job = &job;
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", prefix, index + 1))
                .spawn_scoped(scope, move || {
                    gate.wait();
                    job(index)
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Already spawned workers must not wait forever
                    gate.open();
                    return Err(ContendError::Io(e));
                }
            }
        }

        debug!("Releasing {} {} worker(s)", workers, prefix);
        gate.open();

        let mut results = Vec::with_capacity(workers);
        let mut panicked = None;

        for (index, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(value) => results.push(value),
                Err(payload) => {
                    panicked.get_or_insert_with(|| {
                        format!("{}-{}: {}", prefix, index + 1, panic_message(&payload))
                    });
                }
            }
        }

        match panicked {
            Some(msg) => Err(ContendError::worker_panicked(msg)),
            None => Ok(results),
        }
    })
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_results_come_back_in_worker_order() {
        let results = run_workers("calc", 4, |index| index * 10).unwrap();
        assert_eq!(results, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_workers_are_named() {
        let names = run_workers("updater", 2, |_| {
            thread::current().name().map(str::to_string)
        })
        .unwrap();
        assert_eq!(
            names,
            vec![Some("updater-1".to_string()), Some("updater-2".to_string())]
        );
    }

    #[test]
    fn test_panic_is_reported() {
        let finished = AtomicUsize::new(0);
        let err = run_workers("shopper", 3, |index| {
            if index == 1 {
                panic!("card declined");
            }
            finished.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap_err();

        assert!(matches!(err, ContendError::WorkerPanicked(ref msg) if msg.contains("shopper-2")));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(run_workers("idle", 0, |_| ()).is_err());
    }

    #[test]
    fn test_gate_releases_waiters() {
        let gate = StartGate::new();
        let passed = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    gate.wait();
                    passed.fetch_add(1, Ordering::SeqCst);
                });
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert_eq!(passed.load(Ordering::SeqCst), 0);
            gate.open();
        });

        assert_eq!(passed.load(Ordering::SeqCst), 3);
        // Already open: no block
        gate.wait();
    }
}
