// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::{
    bail,
    Result,
};
use ::clap::{
    Arg,
    ArgMatches,
    Command,
};
use ::nestsched::{
    Config,
    Fiber,
    Hart,
    Mutex,
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
    },
    time::Instant,
};

//======================================================================================================================
// Program Arguments
//======================================================================================================================

/// Program Arguments
#[derive(Debug)]
pub struct ProgramArguments {
    /// Number of worker fibers.
    contexts: usize,
    /// Most harts to run on.
    harts: Option<usize>,
}

/// Associate functions for Program Arguments
impl ProgramArguments {
    /// Default number of worker fibers.
    const DEFAULT_CONTEXTS: usize = 64;

    /// Parses the program arguments from the command line interface.
    pub fn new(app_name: &'static str, app_author: &'static str, app_about: &'static str) -> Result<Self> {
        let matches: ArgMatches = Command::new(app_name)
            .author(app_author)
            .about(app_about)
            .arg(
                Arg::new("contexts")
                    .long("contexts")
                    .value_parser(clap::value_parser!(String))
                    .required(false)
                    .value_name("COUNT")
                    .help("Sets the number of worker fibers"),
            )
            .arg(
                Arg::new("harts")
                    .long("harts")
                    .value_parser(clap::value_parser!(String))
                    .required(false)
                    .value_name("COUNT")
                    .help("Sets the maximum number of harts"),
            )
            .get_matches();

        // Default arguments.
        let mut args: ProgramArguments = ProgramArguments {
            contexts: Self::DEFAULT_CONTEXTS,
            harts: None,
        };

        // Worker count.
        if let Some(contexts) = matches.get_one::<String>("contexts") {
            args.contexts = Self::parse_count("contexts", contexts)?;
        }

        // Hart count.
        if let Some(harts) = matches.get_one::<String>("harts") {
            args.harts = Some(Self::parse_count("harts", harts)?);
        }

        Ok(args)
    }

    fn parse_count(name: &str, value: &str) -> Result<usize> {
        match value.parse::<usize>() {
            Ok(count) if count > 0 => Ok(count),
            _ => bail!("invalid {} count ({})", name, value),
        }
    }
}

//======================================================================================================================
// Root Scheduler
//======================================================================================================================

/// FIFO scheduler that gives up a hart whenever one of its fibers blocks or exits, and asks for one whenever a fiber
/// becomes runnable again.
struct RootScheduler {
    queue: std::sync::Mutex<VecDeque<Fiber>>,
}

impl RootScheduler {
    fn enqueue(&self, fiber: Fiber) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(fiber),
            Err(_) => panic!("run queue poisoned"),
        }
    }

    fn dequeue(&self) -> Option<Fiber> {
        match self.queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(_) => panic!("run queue poisoned"),
        }
    }
}

impl Scheduler for RootScheduler {
    fn hart_enter(&self, hart: &mut Hart) -> Transfer {
        match self.dequeue() {
            Some(fiber) => hart.run(fiber),
            None => hart.yield_hart(),
        }
    }

    fn context_block(&self, _hart: &mut Hart, _fiber: Fiber) {
        let _ = ::nestsched::hart_request(-1);
    }

    fn context_unblock(&self, fiber: Fiber) {
        self.enqueue(fiber);
        let _ = ::nestsched::hart_request(1);
    }

    fn context_yield(&self, _hart: &mut Hart, fiber: Fiber) {
        self.enqueue(fiber);
    }

    fn context_exit(&self, _hart: &mut Hart, fiber: Fiber) {
        fiber.destroy();
        let _ = ::nestsched::hart_request(-1);
    }
}

//======================================================================================================================
// Workload
//======================================================================================================================

/// Shared state of the workers.
struct Workload {
    mutex: Mutex,
    remaining: AtomicUsize,
}

impl Workload {
    /// Takes the lock and counts one worker as done.
    fn work(&self) {
        self.mutex.lock();
        let remaining: usize = self.remaining.load(Ordering::Relaxed) - 1;
        self.remaining.store(remaining, Ordering::Relaxed);
        let id: usize = Fiber::current().map(|fiber| fiber.id()).unwrap_or_default();
        println!("fiber {} in critical section (count = {})", id, remaining);
        self.unlock();
    }

    /// Returns once every worker is done.
    fn wait(&self) {
        loop {
            self.mutex.lock();
            if self.remaining.load(Ordering::Relaxed) == 0 {
                break;
            }
            self.unlock();
            ::nestsched::yield_now();
        }
        self.unlock();
    }

    fn unlock(&self) {
        if let Err(e) = self.mutex.unlock() {
            panic!("unlock failed: {:?}", e);
        }
    }
}

//======================================================================================================================
// main()
//======================================================================================================================

fn main() -> Result<()> {
    let args: ProgramArguments = ProgramArguments::new(
        "mutex-contention",
        "Microsoft Corporation",
        "Hammers a fiber mutex from many fibers scheduled by a FIFO root scheduler.",
    )?;

    let config: Config = match args.harts {
        Some(harts) => format!("nestsched:\n  max_harts: {}\n", harts).parse()?,
        None => Config::default(),
    };
    let runtime: Runtime = Runtime::new(&config)?;
    let scheduler: Arc<RootScheduler> = Arc::new(RootScheduler {
        queue: std::sync::Mutex::new(VecDeque::new()),
    });
    let root: Sched = Sched::new("root", scheduler.clone());
    let workload: Arc<Workload> = Arc::new(Workload {
        mutex: Mutex::new(),
        remaining: AtomicUsize::new(args.contexts),
    });

    println!("main start");
    let start: Instant = Instant::now();
    let result: Result<()> = runtime.block_on(|| {
        ::nestsched::enter(&root);
        println!("root start");

        // Create the workers.
        let spawned: Result<()> = (0..args.contexts).try_for_each(|_| -> Result<()> {
            let workload: Arc<Workload> = workload.clone();
            scheduler.enqueue(Fiber::create(runtime.stack(), move || workload.work())?);
            Ok(())
        });

        // Start up some more harts to do the work, and wait for it.
        if spawned.is_ok() {
            let granted: isize = ::nestsched::hart_request(args.contexts as isize);
            println!("root granted {} harts", granted);
            workload.wait();
        }

        println!("root finish");
        ::nestsched::sched_exit();
        spawned
    })?;
    result?;

    println!("main finish ({:?})", start.elapsed());
    Ok(())
}
