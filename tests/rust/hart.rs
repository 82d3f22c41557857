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
    Hart,
    Runtime,
    Sched,
    Scheduler,
    Transfer,
};
use ::std::{
    collections::VecDeque,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
        MutexGuard,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler that hosts a single child and passes every hart the child asks for straight through to it.
struct Relay {
    state: Mutex<RelayState>,
    queue: Mutex<VecDeque<Fiber>>,
    returns: AtomicUsize,
}

struct RelayState {
    child: Option<Sched>,
    /// Harts requested by the child and not granted to it yet.
    demand: isize,
}

impl Relay {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RelayState { child: None, demand: 0 }),
            queue: Mutex::new(VecDeque::new()),
            returns: AtomicUsize::new(0),
        })
    }
}

impl Scheduler for Relay {
    fn hart_request(&self, child: &Sched, k: isize) -> isize {
        {
            let mut state: MutexGuard<RelayState> = self.state.lock().unwrap();
            if state.child.as_ref() != Some(child) {
                return -1;
            }
            state.demand += k;
        }
        ::nestsched::hart_request(k)
    }

    fn hart_enter(&self, hart: &mut Hart) -> Transfer {
        let mut state: MutexGuard<RelayState> = self.state.lock().unwrap();
        if state.demand > 0 {
            if let Some(child) = state.child.clone() {
                state.demand -= 1;
                return hart.grant_with(&child, move || drop(state));
            }
        }
        drop(state);

        let next: Option<Fiber> = self.queue.lock().unwrap().pop_front();
        match next {
            Some(fiber) => hart.run(fiber),
            None => hart.yield_hart(),
        }
    }

    fn hart_return(&self, hart: &mut Hart, _child: Sched) -> Transfer {
        self.returns.fetch_add(1, Ordering::AcqRel);
        hart.reenter()
    }

    fn child_enter(&self, _hart: &mut Hart, child: &Sched) {
        self.state.lock().unwrap().child = Some(child.clone());
    }

    fn child_exit(&self, _hart: &mut Hart, _child: &Sched) {
        let mut state: MutexGuard<RelayState> = self.state.lock().unwrap();
        state.child = None;
        state.demand = 0;
    }

    fn context_yield(&self, _hart: &mut Hart, fiber: Fiber) {
        self.queue.lock().unwrap().push_back(fiber);
    }

    fn context_exit(&self, _hart: &mut Hart, fiber: Fiber) {
        fiber.destroy();
    }
}

//======================================================================================================================
// test_unit_hart_request()
//======================================================================================================================

/// Tests that requested harts reach the root scheduler and are all given back before it exits.
#[test]
fn test_unit_hart_request() -> Result<()> {
    const NUM_WORKERS: usize = 3;
    let runtime: Runtime = common::runtime(NUM_WORKERS + 1)?;
    let fifo: Arc<Fifo> = Fifo::new(true);
    let root: Sched = Sched::new("fifo", fifo.clone());
    let ran: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    let (granted, spawned): (isize, Result<()>) = runtime.block_on(|| {
        ::nestsched::enter(&root);
        let spawned: Result<()> = (0..NUM_WORKERS).try_for_each(|_| -> Result<()> {
            let ran: Arc<AtomicUsize> = ran.clone();
            fifo.spawn(runtime.stack(), move || {
                ran.fetch_add(1, Ordering::AcqRel);
            })?;
            Ok(())
        });
        let granted: isize = ::nestsched::hart_request(NUM_WORKERS as isize);
        // Wait for the granted harts too, so none of them reaches the base scheduler after the root is gone.
        common::yield_until(|| {
            (fifo.exits() == NUM_WORKERS && fifo.arrivals() == NUM_WORKERS + 1) || spawned.is_err()
        });
        ::nestsched::sched_exit();
        (granted, spawned)
    })?;
    spawned?;

    nestsched::ensure_eq!(granted, NUM_WORKERS as isize);
    nestsched::ensure_eq!(ran.load(Ordering::Acquire), NUM_WORKERS);
    nestsched::ensure_eq!(fifo.exits(), NUM_WORKERS);
    // One arrival per granted hart, plus the hart that carried the main fiber in.
    nestsched::ensure_eq!(fifo.arrivals(), NUM_WORKERS + 1);
    // Every hart but the one that carried the main fiber out left by finding the queue empty, exactly once.
    nestsched::ensure_eq!(fifo.empty_enters(), NUM_WORKERS);
    nestsched::ensure_eq!(root.harts(), 0);
    nestsched::ensure_eq!(root.parent().is_none(), true);
    nestsched::ensure_eq!(runtime.base().harts(), 0);
    nestsched::ensure_eq!(runtime.active_harts(), 0);
    Ok(())
}

//======================================================================================================================
// test_unit_hart_request_bounded()
//======================================================================================================================

/// Tests that the broker never grants more harts than it has.
#[test]
fn test_unit_hart_request_bounded() -> Result<()> {
    let runtime: Runtime = common::runtime(2)?;
    let fifo: Arc<Fifo> = Fifo::new(true);
    let root: Sched = Sched::new("fifo", fifo.clone());

    let (granted, nothing): (isize, isize) = runtime.block_on(|| {
        ::nestsched::enter(&root);
        let granted: isize = ::nestsched::hart_request(8);
        let nothing: isize = ::nestsched::hart_request(0);
        // The extra hart finds nothing to do and goes back to the base scheduler.
        ::nestsched::sched_exit();
        (granted, nothing)
    })?;

    nestsched::ensure_eq!(granted, 1);
    nestsched::ensure_eq!(nothing, 0);
    nestsched::ensure_eq!(root.harts(), 0);
    nestsched::ensure_eq!(runtime.active_harts(), 0);
    Ok(())
}

//======================================================================================================================
// test_unit_nested_schedulers()
//======================================================================================================================

/// Tests harts flowing from the base scheduler through an interior scheduler down to a leaf scheduler and back.
#[test]
fn test_unit_nested_schedulers() -> Result<()> {
    const NUM_HARTS: usize = 3;
    const NUM_WORKERS: usize = 4;
    let runtime: Runtime = common::runtime(NUM_HARTS + 1)?;
    let relay: Arc<Relay> = Relay::new();
    let outer: Sched = Sched::new("relay", relay.clone());
    let fifo: Arc<Fifo> = Fifo::new(true);
    let inner: Sched = Sched::new("fifo", fifo.clone());

    // Harts counted by the hierarchy next to harts held by the process.
    let census = || -> (isize, usize) {
        let counted: isize = runtime.base().harts() + outer.harts() + inner.harts();
        (counted, runtime.active_harts())
    };

    let (granted, inner_harts, censuses, spawned): (isize, isize, Vec<(isize, usize)>, Result<()>) =
        runtime.block_on(|| {
            ::nestsched::enter(&outer);
            ::nestsched::enter(&inner);
            let mut censuses: Vec<(isize, usize)> = vec![census()];
            let spawned: Result<()> = (0..NUM_WORKERS).try_for_each(|_| -> Result<()> {
                fifo.spawn(runtime.stack(), || {
                    ::nestsched::yield_now();
                })?;
                Ok(())
            });
            let granted: isize = ::nestsched::hart_request(NUM_HARTS as isize);
            common::yield_until(|| fifo.exits() == NUM_WORKERS || spawned.is_err());
            // Quiescent once the extra harts are parked and only the main fiber's hart is left.
            common::yield_until(|| runtime.active_harts() == 1);
            censuses.push(census());
            ::nestsched::sched_exit();
            let inner_harts: isize = inner.harts();
            ::nestsched::sched_exit();
            (granted, inner_harts, censuses, spawned)
        })?;
    spawned?;

    nestsched::ensure_eq!(censuses, vec![(1, 1), (1, 1)]);
    nestsched::ensure_eq!(granted, NUM_HARTS as isize);
    nestsched::ensure_eq!(fifo.exits(), NUM_WORKERS);
    nestsched::ensure_eq!(inner_harts, 0);
    nestsched::ensure_eq!(outer.harts(), 0);
    nestsched::ensure_eq!(inner.parent().is_none(), true);
    nestsched::ensure_eq!(outer.parent().is_none(), true);
    nestsched::ensure_eq!(relay.returns.load(Ordering::Acquire) >= NUM_HARTS, true);
    nestsched::ensure_eq!(runtime.base().harts(), 0);
    Ok(())
}

//======================================================================================================================
// test_unit_reenter_after_exit()
//======================================================================================================================

/// Tests that a scheduler may be entered again once it has exited.
#[test]
fn test_unit_reenter_after_exit() -> Result<()> {
    let runtime: Runtime = common::runtime(1)?;
    let fifo: Arc<Fifo> = Fifo::new(true);
    let root: Sched = Sched::new("fifo", fifo.clone());

    let currents: Vec<Option<Sched>> = runtime.block_on(|| {
        let mut currents: Vec<Option<Sched>> = vec![::nestsched::current()];
        for _ in 0..2 {
            ::nestsched::enter(&root);
            currents.push(::nestsched::current());
            ::nestsched::sched_exit();
            currents.push(::nestsched::current());
        }
        currents
    })?;

    let base: Option<Sched> = Some(runtime.base().clone());
    let root: Option<Sched> = Some(root);
    nestsched::ensure_eq!(currents, vec![base.clone(), root.clone(), base.clone(), root, base]);
    Ok(())
}

//======================================================================================================================
// test_unit_scheduler_user_data()
//======================================================================================================================

/// Tests that schedulers can keep private data in their node.
#[test]
fn test_unit_scheduler_user_data() -> Result<()> {
    let runtime: Runtime = common::runtime(1)?;
    let fifo: Arc<Fifo> = Fifo::new(true);
    let root: Sched = Sched::new("fifo", fifo.clone());
    root.set_user_data(String::from("fifo"));

    let name: Option<String> = runtime.block_on(|| {
        ::nestsched::enter(&root);
        let name: Option<String> = ::nestsched::current().and_then(|sched| sched.take_user_data::<String>());
        ::nestsched::sched_exit();
        name
    })?;

    nestsched::ensure_eq!(name, Some(String::from("fifo")));
    Ok(())
}

//======================================================================================================================
// Contract Violations
//======================================================================================================================

/// Tests that a scheduler cannot be entered twice.
#[test]
#[should_panic]
fn test_unit_enter_entered_scheduler() {
    let runtime: Runtime = common::runtime(1).unwrap();
    let root: Sched = Sched::new("fifo", Fifo::new(true));
    let _ = runtime.block_on(|| {
        ::nestsched::enter(&root);
        ::nestsched::enter(&root);
    });
}

/// Tests that the base scheduler has nobody to ask for harts.
#[test]
#[should_panic]
fn test_unit_hart_request_from_base() {
    let runtime: Runtime = common::runtime(1).unwrap();
    let _ = runtime.block_on(|| ::nestsched::hart_request(1));
}

/// Tests that the base scheduler does not exit.
#[test]
#[should_panic]
fn test_unit_exit_base() {
    let runtime: Runtime = common::runtime(1).unwrap();
    let _ = runtime.block_on(::nestsched::sched_exit);
}

/// Tests that the main routine must leave the schedulers it entered.
#[test]
#[should_panic]
fn test_unit_return_while_entered() {
    let runtime: Runtime = common::runtime(1).unwrap();
    let root: Sched = Sched::new("fifo", Fifo::new(true));
    let _ = runtime.block_on(|| ::nestsched::enter(&root));
}
