// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
    scheduler::{
        hart::{
            self,
            Hart,
            HartToken,
            Transfer,
        },
        node::{
            Sched,
            WeakSched,
        },
    },
};
use ::crossbeam_channel::{
    self,
    Receiver,
    Sender,
};
use ::parking_lot::{
    Mutex,
    MutexGuard,
};
use ::slab::Slab;
use ::std::{
    collections::VecDeque,
    sync::OnceLock,
    thread::{
        self,
        JoinHandle,
    },
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Source of harts for the base scheduler.
pub trait HartBroker: Send + Sync {
    /// Asks for `n` more harts. New harts start in the base scheduler's `hart_enter` callback. Returns how many were
    /// granted, which may be fewer than asked for.
    fn request_harts(&self, n: usize) -> usize;

    /// Parks the calling hart until it is granted again. Returns false if the hart must retire instead.
    fn yield_hart(&self, hart_id: usize) -> bool;

    /// Retires parked harts and refuses further requests.
    fn shutdown(&self);
}

//======================================================================================================================
// Structures
//======================================================================================================================

enum Wakeup {
    Grant,
    Shutdown,
}

struct HartSlot {
    handle: Option<JoinHandle<()>>,
    wakeup_tx: Sender<Wakeup>,
    wakeup_rx: Receiver<Wakeup>,
}

struct BrokerState {
    /// Every hart ever created, keyed by hart id.
    harts: Slab<HartSlot>,
    /// Harts waiting to be granted, oldest first.
    parked: VecDeque<usize>,
    /// Harts currently granted.
    active: usize,
    shutdown: bool,
}

/// Hart broker that backs every hart with a dedicated OS thread.
pub struct ThreadBroker {
    max_harts: usize,
    base: OnceLock<WeakSched>,
    state: Mutex<BrokerState>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ThreadBroker {
    pub fn new(max_harts: usize) -> Self {
        Self {
            max_harts,
            base: OnceLock::new(),
            state: Mutex::new(BrokerState {
                harts: Slab::new(),
                parked: VecDeque::new(),
                active: 0,
                shutdown: false,
            }),
        }
    }

    pub fn max_harts(&self) -> usize {
        self.max_harts
    }

    /// Number of harts currently granted.
    pub fn active(&self) -> usize {
        self.state.lock().active
    }

    /// Binds this broker to the base scheduler that new harts start in.
    pub(crate) fn attach_base(&self, base: &Sched) {
        if self.base.set(base.downgrade()).is_err() {
            fatal!("attach_base(): broker already serves a base scheduler");
        }
    }

    /// Grants a hart whose privileged context waits for the fiber running on the calling thread.
    pub(crate) fn adopt_hart(&self, base: &Sched) -> Result<HartToken, Fail> {
        let mut state: MutexGuard<BrokerState> = self.state.lock();
        if state.shutdown || state.active >= self.max_harts {
            let cause: String = format!("no hart available (max_harts={})", self.max_harts);
            error!("adopt_hart(): {}", cause);
            return Err(Fail::new(libc::EAGAIN, &cause));
        }
        let hart: Hart = Self::new_hart(&mut state);
        let token: HartToken = hart.token();
        Self::start_hart(&mut state, hart, base.clone(), Transfer::wait())?;
        state.active += 1;
        Ok(token)
    }

    /// Stops counting a hart that retired without parking.
    pub(crate) fn release(&self, hart_id: usize) {
        let mut state: MutexGuard<BrokerState> = self.state.lock();
        trace!("release(): hart={}", hart_id);
        state.active = state.active.saturating_sub(1);
    }

    /// Waits for every hart thread to finish.
    pub(crate) fn join(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut state: MutexGuard<BrokerState> = self.state.lock();
            state.harts.iter_mut().filter_map(|(_, slot)| slot.handle.take()).collect()
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("join(): hart thread panicked");
            }
        }
    }

    fn new_hart(state: &mut BrokerState) -> Hart {
        Hart::new(state.harts.vacant_entry().key())
    }

    fn start_hart(state: &mut BrokerState, hart: Hart, sched: Sched, first: Transfer) -> Result<(), Fail> {
        let id: usize = hart.id();
        let (wakeup_tx, wakeup_rx): (Sender<Wakeup>, Receiver<Wakeup>) = crossbeam_channel::unbounded();
        let spawned = thread::Builder::new()
            .name(format!("hart-{}", id))
            .stack_size(limits::HART_STACK_SIZE)
            .spawn(move || hart::run_hart(hart, sched, first));
        match spawned {
            Ok(handle) => {
                state.harts.insert(HartSlot {
                    handle: Some(handle),
                    wakeup_tx,
                    wakeup_rx,
                });
                debug!("start_hart(): hart {} started", id);
                Ok(())
            },
            Err(e) => {
                let cause: String = format!("cannot start hart {} ({})", id, e);
                error!("start_hart(): {}", cause);
                Err(Fail::new(libc::EAGAIN, &cause))
            },
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl HartBroker for ThreadBroker {
    fn request_harts(&self, n: usize) -> usize {
        let base: Sched = match self.base.get().and_then(|base| base.upgrade()) {
            Some(base) => base,
            None => return 0,
        };
        let mut state: MutexGuard<BrokerState> = self.state.lock();
        if state.shutdown {
            return 0;
        }

        let wanted: usize = n.min(self.max_harts.saturating_sub(state.active));
        let mut granted: usize = 0;
        while granted < wanted {
            if let Some(id) = state.parked.pop_front() {
                let woken: bool = match state.harts.get(id) {
                    Some(slot) => slot.wakeup_tx.send(Wakeup::Grant).is_ok(),
                    None => false,
                };
                if !woken {
                    warn!("request_harts(): parked hart {} is gone", id);
                    continue;
                }
            } else {
                let hart: Hart = Self::new_hart(&mut state);
                // New harts start counted by the base scheduler.
                base.join_hart();
                if Self::start_hart(&mut state, hart, base.clone(), Transfer::enter()).is_err() {
                    base.leave_hart();
                    break;
                }
            }
            granted += 1;
            state.active += 1;
        }

        if granted < n {
            debug!("request_harts(): under-granted (requested={}, granted={})", n, granted);
        }
        granted
    }

    fn yield_hart(&self, hart_id: usize) -> bool {
        let wakeup: Receiver<Wakeup> = {
            let mut state: MutexGuard<BrokerState> = self.state.lock();
            state.active = state.active.saturating_sub(1);
            if state.shutdown {
                return false;
            }
            let wakeup: Receiver<Wakeup> = match state.harts.get(hart_id) {
                Some(slot) => slot.wakeup_rx.clone(),
                None => fatal!("yield_hart(): unknown hart {}", hart_id),
            };
            state.parked.push_back(hart_id);
            wakeup
        };

        trace!("yield_hart(): hart {} parked", hart_id);
        matches!(wakeup.recv(), Ok(Wakeup::Grant))
    }

    fn shutdown(&self) {
        let mut state: MutexGuard<BrokerState> = self.state.lock();
        state.shutdown = true;
        let parked: Vec<usize> = state.parked.drain(..).collect();
        for id in parked {
            if let Some(slot) = state.harts.get(id) {
                if slot.wakeup_tx.send(Wakeup::Shutdown).is_err() {
                    warn!("shutdown(): parked hart {} is gone", id);
                }
            }
        }
        debug!("shutdown(): broker stopped");
    }
}
