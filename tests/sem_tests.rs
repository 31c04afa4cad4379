//! Semaphore tests
//!
//! Blocking paths run real host threads against [`common::HostKernel`].
//! Every thread that can touch the semaphore lock concurrently runs as its
//! own core; the test thread itself is core 0.

mod common;

use std::thread;
use std::time::Instant;

use common::{set_cpu, wait_until, HostKernel};
use proptest::prelude::*;
use rtsmp::config::CFG_SEM_WAITERS_MAX;
use rtsmp::error::KError;
use rtsmp::sync::sem::Semaphore;
use rtsmp::types::{CpuMask, Timeout};

#[test]
fn test_give_then_take() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);

    sem.give();
    assert_eq!(sem.count_get(), 1);
    assert_eq!(sem.try_take(), Ok(()));
    assert_eq!(sem.count_get(), 0);
}

#[test]
fn test_give_saturates_at_limit() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 1, 3);

    for _ in 0..5 {
        sem.give();
    }
    assert_eq!(sem.count_get(), 3);
    assert_eq!(sem.limit(), 3);
}

#[test]
fn test_no_wait_never_blocks() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);

    let start = Instant::now();
    assert_eq!(sem.take(Timeout::NoWait), Err(KError::Busy));
    assert!(start.elapsed().as_millis() < 1000);
    assert_eq!(sem.waiters(), 0);
}

#[test]
fn test_take_times_out() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);

    let start = Instant::now();
    assert_eq!(sem.take(Timeout::Ticks(20)), Err(KError::Timeout));
    assert!(start.elapsed().as_millis() >= 20);

    // The timed out waiter left the queue and a later give is kept
    assert_eq!(sem.waiters(), 0);
    sem.give();
    assert_eq!(sem.count_get(), 1);
}

#[test]
fn test_give_wakes_waiter() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);

    thread::scope(|s| {
        let waiter = s.spawn(|| {
            set_cpu(1);
            sem.take(Timeout::Forever)
        });

        wait_until("waiter to block", || sem.waiters() == 1);
        sem.give();

        assert_eq!(waiter.join().unwrap(), Ok(()));
    });

    // Handed over directly, never counted
    assert_eq!(sem.count_get(), 0);
    assert_eq!(sem.waiters(), 0);
}

#[test]
fn test_give_prefers_earliest_deadline() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);

    thread::scope(|s| {
        let patient = s.spawn(|| {
            set_cpu(1);
            sem.take(Timeout::Forever)
        });
        wait_until("first waiter", || sem.waiters() == 1);
        let hurried = s.spawn(|| {
            set_cpu(2);
            sem.take(Timeout::Ticks(5000))
        });
        wait_until("second waiter", || sem.waiters() == 2);

        sem.give();
        assert_eq!(hurried.join().unwrap(), Ok(()));
        assert_eq!(sem.waiters(), 1);

        sem.give();
        assert_eq!(patient.join().unwrap(), Ok(()));
    });
}

#[test]
fn test_reset_wakes_all_waiters() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 5);

    thread::scope(|s| {
        let waiters: Vec<_> = (1..=3)
            .map(|cpu| {
                let sem = &sem;
                s.spawn(move || {
                    set_cpu(cpu);
                    sem.take(Timeout::Forever)
                })
            })
            .collect();
        wait_until("three waiters", || sem.waiters() == 3);

        sem.reset();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(KError::Reset));
        }
    });

    assert_eq!(sem.count_get(), 0);
    assert_eq!(sem.waiters(), 0);
}

#[test]
fn test_reset_clears_count() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 4, 5);

    sem.reset();
    assert_eq!(sem.count_get(), 0);
    assert_eq!(sem.try_take(), Err(KError::Busy));
}

#[test]
fn test_remote_waiter_gets_signalled() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);
    set_cpu(0);

    thread::scope(|s| {
        let remote = s.spawn(|| {
            set_cpu(2);
            sem.take(Timeout::Forever)
        });
        wait_until("remote waiter", || sem.waiters() == 1);

        sem.give();
        assert_eq!(remote.join().unwrap(), Ok(()));
    });

    assert_eq!(kernel.signals(), vec![CpuMask::single(2)]);
}

#[test]
fn test_give_without_waiter_not_signalled() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 2);
    set_cpu(1);

    sem.give();
    assert_eq!(sem.try_take(), Ok(()));
    sem.reset();

    assert!(kernel.signals().is_empty());
}

#[test]
fn test_reset_signals_remote_waiters_once() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);
    set_cpu(0);

    thread::scope(|s| {
        let waiters: Vec<_> = [1, 3]
            .into_iter()
            .map(|cpu| {
                let sem = &sem;
                s.spawn(move || {
                    set_cpu(cpu);
                    sem.take(Timeout::Forever)
                })
            })
            .collect();
        wait_until("two waiters", || sem.waiters() == 2);

        sem.reset();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(KError::Reset));
        }
    });

    assert_eq!(
        kernel.signals(),
        vec![CpuMask::single(1) | CpuMask::single(3)]
    );
}

#[test]
fn test_wait_queue_full() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);

    thread::scope(|s| {
        let waiters: Vec<_> = (1..=CFG_SEM_WAITERS_MAX)
            .map(|cpu| {
                let sem = &sem;
                s.spawn(move || {
                    set_cpu(cpu);
                    sem.take(Timeout::Forever)
                })
            })
            .collect();
        wait_until("full wait queue", || sem.waiters() == CFG_SEM_WAITERS_MAX);

        assert_eq!(sem.take(Timeout::Ticks(10)), Err(KError::NoSpace));

        sem.reset();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(KError::Reset));
        }
    });
}

#[test]
fn test_init_resets_count_and_limit() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 3, 3);

    sem.init(1, 2);
    assert_eq!(sem.count_get(), 1);
    assert_eq!(sem.limit(), 2);
}

#[test]
#[should_panic(expected = "limit must be non-zero")]
fn test_zero_limit_panics() {
    let kernel = HostKernel::new();
    let _sem = Semaphore::new(&kernel, 0, 0);
}

#[test]
#[should_panic(expected = "initial count above limit")]
fn test_initial_above_limit_panics() {
    let kernel = HostKernel::new();
    let sem = Semaphore::new(&kernel, 0, 1);
    sem.init(2, 1);
}

#[derive(Debug, Clone)]
enum Op {
    Give,
    TryTake,
    Reset,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Give),
        4 => Just(Op::TryTake),
        1 => Just(Op::Reset),
    ]
}

proptest! {
    #[test]
    fn test_count_stays_in_bounds(
        limit in 1u32..8,
        initial in 0u32..8,
        ops in prop::collection::vec(op(), 0..64),
    ) {
        let initial = initial.min(limit);
        let kernel = HostKernel::new();
        let sem = Semaphore::new(&kernel, initial, limit);
        let mut model = initial;

        for op in ops {
            match op {
                Op::Give => {
                    sem.give();
                    model = (model + 1).min(limit);
                }
                Op::TryTake => {
                    let expected = if model > 0 { Ok(()) } else { Err(KError::Busy) };
                    prop_assert_eq!(sem.try_take(), expected);
                    model = model.saturating_sub(1);
                }
                Op::Reset => {
                    sem.reset();
                    model = 0;
                }
            }
            prop_assert!(sem.count_get() <= limit);
            prop_assert_eq!(sem.count_get(), model);
        }
    }
}
