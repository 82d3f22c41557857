// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::common::Fifo;
use ::anyhow::Result;
use ::nestsched::{
    Fiber,
    FiberState,
    Runtime,
    Sched,
};
use ::std::sync::{
    atomic::{
        AtomicBool,
        AtomicUsize,
        Ordering,
    },
    Arc,
    Mutex,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Runs `test` inside a fresh single-hart runtime, entered into a FIFO scheduler that keeps exited fibers around.
fn with_fifo<F>(test: F) -> Result<()>
where
    F: FnOnce(&Runtime, &Arc<Fifo>, &Sched) -> Result<()>,
{
    let runtime: Runtime = common::runtime(1)?;
    let fifo: Arc<Fifo> = Fifo::new(false);
    let root: Sched = Sched::new("fifo", fifo.clone());
    runtime.block_on(|| {
        ::nestsched::enter(&root);
        let result: Result<()> = test(&runtime, &fifo, &root);
        ::nestsched::sched_exit();
        result
    })?
}

//======================================================================================================================
// test_unit_fiber_exit()
//======================================================================================================================

/// Tests that a finished fiber is reported exactly once and never runs again.
#[test]
fn test_unit_fiber_exit() -> Result<()> {
    with_fifo(|runtime: &Runtime, fifo: &Arc<Fifo>, root: &Sched| {
        let runs: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let fiber: Fiber = {
            let runs: Arc<AtomicUsize> = runs.clone();
            fifo.spawn(runtime.stack(), move || {
                runs.fetch_add(1, Ordering::AcqRel);
            })?
        };
        nestsched::ensure_eq!(fiber.state(), FiberState::Init);
        nestsched::ensure_eq!(fiber.scheduler(), Some(root.clone()));

        common::yield_until(|| fifo.exits() == 1);
        for _ in 0..8 {
            ::nestsched::yield_now();
        }

        nestsched::ensure_eq!(fiber.state(), FiberState::Exited);
        nestsched::ensure_eq!(runs.load(Ordering::Acquire), 1);
        nestsched::ensure_eq!(fifo.exits_of(fiber.id()), 1);
        nestsched::ensure_eq!(fifo.exits(), 1);
        Ok(())
    })
}

//======================================================================================================================
// test_unit_fiber_reinit()
//======================================================================================================================

/// Tests that a reinitialized fiber runs its new routine under a fresh id and its creator's scheduler.
#[test]
fn test_unit_fiber_reinit() -> Result<()> {
    with_fifo(|runtime: &Runtime, fifo: &Arc<Fifo>, root: &Sched| {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let fiber: Fiber = {
            let log: Arc<Mutex<Vec<&'static str>>> = log.clone();
            fifo.spawn(runtime.stack(), move || log.lock().unwrap().push("first"))?
        };
        common::yield_until(|| fifo.exits() == 1);
        let first_id: usize = fiber.id();

        // Hand the fiber to another scheduler. Reinitializing must not keep that association.
        fiber.reassociate(runtime.base());
        {
            let log: Arc<Mutex<Vec<&'static str>>> = log.clone();
            fiber.reinit(move || log.lock().unwrap().push("second"))?;
        }
        nestsched::ensure_neq!(fiber.id(), first_id);
        nestsched::ensure_eq!(fiber.state(), FiberState::Init);
        nestsched::ensure_eq!(fiber.scheduler(), Some(root.clone()));
        nestsched::ensure_eq!(fiber.stack(), Some(runtime.stack()));

        fifo.push(fiber.clone());
        common::yield_until(|| fifo.exits() == 2);
        nestsched::ensure_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        nestsched::ensure_eq!(fifo.exits_of(first_id), 1);
        nestsched::ensure_eq!(fifo.exits_of(fiber.id()), 1);

        // Recycling keeps the id.
        let second_id: usize = fiber.id();
        fiber.recycle(|| {})?;
        nestsched::ensure_eq!(fiber.id(), second_id);
        fifo.push(fiber.clone());
        common::yield_until(|| fifo.exits() == 3);
        nestsched::ensure_eq!(fifo.exits_of(second_id), 2);
        Ok(())
    })
}

//======================================================================================================================
// test_unit_fiber_yield()
//======================================================================================================================

/// Tests that yielding fibers take turns on a single hart.
#[test]
fn test_unit_fiber_yield() -> Result<()> {
    with_fifo(|runtime: &Runtime, fifo: &Arc<Fifo>, _root: &Sched| {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            let log: Arc<Mutex<Vec<String>>> = log.clone();
            fifo.spawn(runtime.stack(), move || {
                log.lock().unwrap().push(format!("{}1", name));
                ::nestsched::yield_now();
                log.lock().unwrap().push(format!("{}2", name));
            })?;
        }
        common::yield_until(|| fifo.exits() == 2);
        nestsched::ensure_eq!(*log.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
        nestsched::ensure_eq!(fifo.yields() >= 2, true);
        Ok(())
    })
}

//======================================================================================================================
// test_unit_fiber_current()
//======================================================================================================================

/// Tests that a fiber sees itself and its scheduler as current.
#[test]
fn test_unit_fiber_current() -> Result<()> {
    with_fifo(|runtime: &Runtime, fifo: &Arc<Fifo>, root: &Sched| {
        let seen: Arc<Mutex<Option<(Option<Fiber>, Option<Sched>)>>> = Arc::new(Mutex::new(None));
        let fiber: Fiber = {
            let seen: Arc<Mutex<Option<(Option<Fiber>, Option<Sched>)>>> = seen.clone();
            fifo.spawn(runtime.stack(), move || {
                *seen.lock().unwrap() = Some((Fiber::current(), ::nestsched::current()));
            })?
        };
        common::yield_until(|| fifo.exits() == 1);
        let seen: Option<(Option<Fiber>, Option<Sched>)> = seen.lock().unwrap().take();
        nestsched::ensure_eq!(seen, Some((Some(fiber), Some(root.clone()))));
        Ok(())
    })
}

//======================================================================================================================
// test_unit_fiber_block_unblock()
//======================================================================================================================

/// Tests the blocked, runnable and running transitions.
#[test]
fn test_unit_fiber_block_unblock() -> Result<()> {
    with_fifo(|runtime: &Runtime, fifo: &Arc<Fifo>, _root: &Sched| {
        let parked: Arc<Mutex<Option<Fiber>>> = Arc::new(Mutex::new(None));
        let resumed: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
        let fiber: Fiber = {
            let parked: Arc<Mutex<Option<Fiber>>> = parked.clone();
            let resumed: Arc<AtomicBool> = resumed.clone();
            fifo.spawn(runtime.stack(), move || {
                ::nestsched::block(move |fiber: &Fiber| *parked.lock().unwrap() = Some(fiber.clone()));
                resumed.store(true, Ordering::Release);
            })?
        };

        common::yield_until(|| parked.lock().unwrap().is_some());
        nestsched::ensure_eq!(fiber.state(), FiberState::Blocked);
        nestsched::ensure_eq!(fifo.blocks(), 1);
        nestsched::ensure_eq!(parked.lock().unwrap().clone(), Some(fiber.clone()));

        ::nestsched::unblock(&fiber);
        nestsched::ensure_eq!(fiber.state(), FiberState::Runnable);
        // Unblocking a runnable fiber does nothing.
        ::nestsched::unblock(&fiber);
        nestsched::ensure_eq!(fifo.unblocks(), 1);
        nestsched::ensure_eq!(resumed.load(Ordering::Acquire), false);

        common::yield_until(|| fifo.exits() == 1);
        nestsched::ensure_eq!(resumed.load(Ordering::Acquire), true);
        Ok(())
    })
}

//======================================================================================================================
// test_unit_fiber_explicit_exit()
//======================================================================================================================

/// Tests that a fiber may finish before its routine returns.
#[test]
fn test_unit_fiber_explicit_exit() -> Result<()> {
    with_fifo(|runtime: &Runtime, fifo: &Arc<Fifo>, _root: &Sched| {
        let steps: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let fiber: Fiber = {
            let steps: Arc<AtomicUsize> = steps.clone();
            fifo.spawn(runtime.stack(), move || {
                steps.fetch_add(1, Ordering::AcqRel);
                ::nestsched::exit();
            })?
        };
        common::yield_until(|| fifo.exits() == 1);
        nestsched::ensure_eq!(steps.load(Ordering::Acquire), 1);
        nestsched::ensure_eq!(fiber.state(), FiberState::Exited);
        Ok(())
    })
}

//======================================================================================================================
// test_unit_fiber_destroy_blocked()
//======================================================================================================================

/// Tests that destroying a blocked fiber discards it without running the rest of its routine.
#[test]
fn test_unit_fiber_destroy_blocked() -> Result<()> {
    with_fifo(|runtime: &Runtime, fifo: &Arc<Fifo>, _root: &Sched| {
        let blocked: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
        let resumed: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
        let fiber: Fiber = {
            let blocked: Arc<AtomicBool> = blocked.clone();
            let resumed: Arc<AtomicBool> = resumed.clone();
            fifo.spawn(runtime.stack(), move || {
                ::nestsched::block(move |_: &Fiber| blocked.store(true, Ordering::Release));
                resumed.store(true, Ordering::Release);
            })?
        };

        common::yield_until(|| blocked.load(Ordering::Acquire));
        fiber.destroy();
        for _ in 0..8 {
            ::nestsched::yield_now();
        }

        nestsched::ensure_eq!(fiber.state(), FiberState::Exited);
        nestsched::ensure_eq!(resumed.load(Ordering::Acquire), false);
        nestsched::ensure_eq!(fifo.exits(), 0);
        Ok(())
    })
}

//======================================================================================================================
// Contract Violations
//======================================================================================================================

/// Tests that a running fiber cannot be reinitialized.
#[test]
#[should_panic]
fn test_unit_reinit_running_fiber() {
    let _ = with_fifo(|_: &Runtime, _: &Arc<Fifo>, _: &Sched| {
        if let Some(fiber) = Fiber::current() {
            fiber.reinit(|| {})?;
        }
        Ok(())
    });
}
