// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::Backoff,
    runtime::{
        fail::Fail,
        fiber::{
            self,
            Fiber,
        },
        limits,
        scheduler::local,
    },
};
use ::spin::{
    mutex::{
        TicketMutex,
        TicketMutexGuard,
    },
    relax::Yield,
};
use ::std::{
    collections::VecDeque,
    sync::{
        atomic::{
            AtomicI32,
            AtomicUsize,
            Ordering,
        },
        Arc,
        OnceLock,
    },
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Futex operations. Only [FutexOp::Wait] and [FutexOp::Wake] are implemented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FutexOp {
    Wait,
    Wake,
    Requeue,
    CmpRequeue,
    WakeOp,
}

struct Waiter {
    /// Address of the futex word this waiter sleeps on.
    addr: usize,
    /// Set by the block hook once the waiter's state is saved.
    fiber: OnceLock<Fiber>,
}

/// Process-wide FIFO of fibers blocked on futex words.
pub struct BlockingQueue {
    /// Served in ticket order, so wakers and waiters get the queue in the order they asked for it.
    waiters: TicketMutex<VecDeque<Arc<Waiter>>, Yield>,
    spin_limit: AtomicUsize,
}

//======================================================================================================================
// Constants
//======================================================================================================================

static BLOCKING_QUEUE: BlockingQueue = BlockingQueue::new();

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl BlockingQueue {
    pub const fn new() -> Self {
        Self {
            waiters: TicketMutex::new(VecDeque::new()),
            spin_limit: AtomicUsize::new(limits::SPIN_LIMIT_DEFAULT),
        }
    }

    /// Queue shared by every runtime in the process.
    pub fn global() -> &'static BlockingQueue {
        &BLOCKING_QUEUE
    }

    /// Sets how long a waker spins on a waiter that has not finished blocking before it starts yielding its thread.
    pub fn set_spin_limit(&self, spin_limit: usize) {
        self.spin_limit.store(spin_limit.max(1), Ordering::Relaxed);
    }

    /// Blocks the calling fiber until woken, provided `addr` still holds `expected`. Returns right away otherwise.
    pub fn wait(&self, addr: &AtomicI32, expected: i32) {
        // A waiter that never blocks would stall every waker that picks it.
        if local::in_vcore_context() || local::current_fiber().is_none() {
            fatal!("wait(): not running as a fiber");
        }
        let key: usize = Self::key(addr);
        let mut waiters: TicketMutexGuard<VecDeque<Arc<Waiter>>> = self.waiters.lock();
        // Checked under the lock so that a waker that changes the word after this point also sees our entry.
        if addr.load(Ordering::SeqCst) != expected {
            return;
        }
        let waiter: Arc<Waiter> = Arc::new(Waiter {
            addr: key,
            fiber: OnceLock::new(),
        });
        waiters.push_back(waiter.clone());
        drop(waiters);

        fiber::block(move |fiber: &Fiber| {
            if waiter.fiber.set(fiber.clone()).is_err() {
                fatal!("wait(): waiter published twice");
            }
        });
    }

    /// Wakes up to `count` fibers waiting on `addr`, oldest first. Returns how many were woken.
    pub fn wake(&self, addr: &AtomicI32, count: usize) -> usize {
        let key: usize = Self::key(addr);
        let mut woken: Vec<Arc<Waiter>> = Vec::new();
        {
            let mut waiters: TicketMutexGuard<VecDeque<Arc<Waiter>>> = self.waiters.lock();
            let mut i: usize = 0;
            while i < waiters.len() && woken.len() < count {
                if waiters[i].addr != key {
                    i += 1;
                    continue;
                }
                if let Some(waiter) = waiters.remove(i) {
                    woken.push(waiter);
                }
            }
        }

        let spin_limit: usize = self.spin_limit.load(Ordering::Relaxed);
        for waiter in woken.iter() {
            // The waiter left the queue, but may still be on its way into the blocked state.
            let mut backoff: Backoff = Backoff::new(spin_limit);
            let fiber: &Fiber = loop {
                if let Some(fiber) = waiter.fiber.get() {
                    break fiber;
                }
                backoff.snooze();
            };
            fiber::unblock(fiber);
        }
        woken.len()
    }

    /// Number of fibers waiting on `addr`.
    pub fn waiting_on(&self, addr: &AtomicI32) -> usize {
        let key: usize = Self::key(addr);
        self.waiters.lock().iter().filter(|waiter| waiter.addr == key).count()
    }

    fn key(addr: &AtomicI32) -> usize {
        addr as *const AtomicI32 as usize
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Futex system call for fibers. Waiting blocks the calling fiber rather than its hart. Timeouts, second addresses and
/// operations other than [FutexOp::Wait] and [FutexOp::Wake] fail with `ENOSYS`.
pub fn futex(
    addr: &AtomicI32,
    op: FutexOp,
    val: i32,
    timeout: Option<Duration>,
    addr2: Option<&AtomicI32>,
    val3: i32,
) -> Result<usize, Fail> {
    if timeout.is_some() || addr2.is_some() || val3 != 0 {
        let cause: String = format!("unsupported futex arguments (op={:?})", op);
        warn!("futex(): {}", cause);
        return Err(Fail::new(libc::ENOSYS, &cause));
    }
    match op {
        FutexOp::Wait => {
            BlockingQueue::global().wait(addr, val);
            Ok(0)
        },
        FutexOp::Wake => {
            let count: usize = match usize::try_from(val) {
                Ok(count) => count,
                Err(_) => {
                    let cause: String = format!("invalid wake count ({})", val);
                    error!("futex(): {}", cause);
                    return Err(Fail::new(libc::EINVAL, &cause));
                },
            };
            Ok(BlockingQueue::global().wake(addr, count))
        },
        op => {
            let cause: String = format!("unsupported futex operation ({:?})", op);
            warn!("futex(): {}", cause);
            Err(Fail::new(libc::ENOSYS, &cause))
        },
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for BlockingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<i32> for FutexOp {
    type Error = Fail;

    /// Decodes a Linux futex operation code.
    fn try_from(op: i32) -> Result<Self, Self::Error> {
        match op {
            libc::FUTEX_WAIT => Ok(FutexOp::Wait),
            libc::FUTEX_WAKE => Ok(FutexOp::Wake),
            libc::FUTEX_REQUEUE => Ok(FutexOp::Requeue),
            libc::FUTEX_CMP_REQUEUE => Ok(FutexOp::CmpRequeue),
            libc::FUTEX_WAKE_OP => Ok(FutexOp::WakeOp),
            _ => Err(Fail::new(libc::ENOSYS, "unknown futex operation")),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
