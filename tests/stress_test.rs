use std::collections::HashSet;
use std::io::Error;
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use lockfree_list::List;

const THREADS: usize = 8;
const ITEMS_PER_THREAD: usize = 2_000;
const DEADLINE: Duration = Duration::from_secs(120);

// Runs `work` on its own thread and fails instead of hanging if it does not finish in time.
fn within_deadline<R, F>(work: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (done, finished) = mpsc::channel();
    let worker = thread::spawn(move || {
        let _ = done.send(work());
    });
    match finished.recv_timeout(DEADLINE) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => panic!("Workload still running after {:?}", DEADLINE),
        Err(RecvTimeoutError::Disconnected) => match worker.join() {
            Err(payload) => panic::resume_unwind(payload),
            Ok(()) => unreachable!("worker exited without a result"),
        },
    }
}

#[test]
fn concurrent_emplace_loses_nothing() -> Result<(), Error> {
    let list = List::new(32)?;
    crossbeam::scope(|s| {
        for t in 0..THREADS {
            let list = &list;
            s.spawn(move |_| {
                for i in 0..ITEMS_PER_THREAD {
                    list.emplace(t * ITEMS_PER_THREAD + i).unwrap();
                }
            });
        }
    })
    .unwrap();

    let mut iter = list.begin();
    let mut seen = HashSet::new();
    while iter != list.end() {
        assert!(seen.insert(*iter.get().unwrap()));
        iter.advance();
    }
    assert_eq!(seen.len(), THREADS * ITEMS_PER_THREAD);
    Ok(())
}

#[test]
fn concurrent_pop_sees_every_value_once() -> Result<(), Error> {
    let list = List::new(32)?;
    for i in 0..THREADS * ITEMS_PER_THREAD {
        list.emplace(i)?;
    }

    let popped = crossbeam::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    (0..ITEMS_PER_THREAD)
                        .map(|_| list.try_pop())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    })
    .unwrap();

    assert!(popped.iter().all(Option::is_some));
    let mut values: Vec<usize> = popped.into_iter().flatten().collect();
    values.sort_unstable();
    assert_eq!(values, (0..THREADS * ITEMS_PER_THREAD).collect::<Vec<_>>());
    assert!(list.is_empty());
    assert!(list.begin() == list.end());
    Ok(())
}

#[test]
fn mixed_workload_terminates_and_balances() -> Result<(), Error> {
    within_deadline(mixed_workload)
}

fn mixed_workload() -> Result<(), Error> {
    const PER_OPERATION: usize = 4;
    const ITERATIONS: usize = 10_000;

    let list = List::new(32)?;
    let start = Barrier::new(PER_OPERATION * 4);
    let popped = AtomicUsize::new(0);
    let drained = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..PER_OPERATION {
            s.spawn(|_| {
                start.wait();
                for _ in 0..ITERATIONS {
                    list.emplace(1usize).unwrap();
                }
            });
            s.spawn(|_| {
                start.wait();
                for _ in 0..ITERATIONS {
                    if let Some(value) = list.try_pop() {
                        assert_eq!(value, 1);
                        popped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
            s.spawn(|_| {
                start.wait();
                for _ in 0..ITERATIONS {
                    // Looking without consuming puts the value back.
                    let peek = list.pop();
                    if let Some(value) = peek.get() {
                        assert_eq!(*value, 1);
                    }
                }
            });
            s.spawn(|_| {
                start.wait();
                for _ in 0..ITERATIONS / 10 {
                    let mut count = 0;
                    for value in list.begin() {
                        assert_eq!(value, 1);
                        count += 1;
                    }
                    drained.fetch_add(count, Ordering::Relaxed);
                }
            });
        }
    })
    .unwrap();

    let remaining = list.begin().count();
    assert_eq!(
        popped.into_inner() + drained.into_inner() + remaining,
        PER_OPERATION * ITERATIONS
    );
    Ok(())
}
