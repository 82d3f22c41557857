// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod fail;
pub mod fiber;
pub mod futex;
pub mod limits;
pub mod logging;
pub mod mutex;
pub mod scheduler;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        config::Config,
        fail::Fail,
        fiber::Fiber,
        futex::BlockingQueue,
        scheduler::{
            base::BaseScheduler,
            broker::{
                HartBroker,
                ThreadBroker,
            },
            hart::{
                Dispatch,
                Event,
                HartToken,
            },
            local,
            node::Sched,
        },
    },
    substrate::Stack,
};
use ::std::sync::Arc;

//======================================================================================================================
// Structures
//======================================================================================================================

/// A scheduling runtime: a base scheduler together with the broker that supplies its harts.
pub struct Runtime {
    base: Sched,
    broker: Arc<ThreadBroker>,
    stack: Stack,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Runtime {
    pub fn new(config: &Config) -> Result<Self, Fail> {
        logging::initialize();
        let max_harts: usize = config.max_harts()?;
        let stack: Stack = Stack::new(config.stack_size()?)?;
        BlockingQueue::global().set_spin_limit(config.spin_limit()?);

        let broker: Arc<ThreadBroker> = Arc::new(ThreadBroker::new(max_harts));
        let base: Sched = Sched::new_base(Arc::new(BaseScheduler::new(broker.clone())));
        broker.attach_base(&base);
        info!("new(): max_harts={}, stack_size={}", max_harts, stack.size());

        Ok(Self { base, broker, stack })
    }

    /// Runs `main` on the calling thread as the first fiber of the base scheduler, on the runtime's first hart. Once
    /// `main` returns, every hart is retired. `main` must leave any scheduler it entered before returning. A runtime
    /// runs a single main routine.
    pub fn block_on<R, F: FnOnce() -> R>(&self, main: F) -> Result<R, Fail> {
        if local::is_attached() {
            fatal!("block_on(): the calling thread already runs on a hart");
        }
        let hart: HartToken = self.broker.adopt_hart(&self.base)?;
        self.base.join_hart();
        local::install(Dispatch {
            hart,
            fiber: Fiber::adopted(self.base.clone()),
        });
        debug!("block_on(): main fiber started");

        let result: R = main();

        let sched: Option<Sched> = local::current_sched();
        if sched.as_ref() != Some(&self.base) {
            fatal!("block_on(): main returned inside {:?}", sched);
        }
        let (hart, _): (HartToken, Fiber) = fiber::running("block_on");
        self.base.leave_hart();
        hart.send(Event::Retire);
        self.broker.release(hart.id());
        self.broker.shutdown();
        self.broker.join();
        debug!("block_on(): all harts retired");

        Ok(result)
    }

    /// The base scheduler of this runtime.
    pub fn base(&self) -> &Sched {
        &self.base
    }

    /// Default stack for fibers.
    pub fn stack(&self) -> Stack {
        self.stack
    }

    pub fn max_harts(&self) -> usize {
        self.broker.max_harts()
    }

    /// Number of harts currently granted to the base scheduler.
    pub fn active_harts(&self) -> usize {
        self.broker.active()
    }
}
