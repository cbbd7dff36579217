// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    config::StealStrategy,
    context,
    limits,
    scheduler::{
        pool::PoolShared,
        task::{
            Task,
            WorkerId,
        },
    },
};
use ::crossbeam_deque::{
    Steal,
    Stealer,
    Worker as LocalDeque,
};
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    cell::{
        Cell,
        RefCell,
    },
    hint,
    rc::Rc,
    sync::Arc,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Base seed for per-worker random number generators. Each worker derives its own seed from this value and its index,
/// so victim selection is reproducible for a given pool size.
const WORKER_RNG_SEED: u64 = 42;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Per-thread seat of a pool worker: its deque, its view of the pool, and its steal state. Owned by the worker thread
/// and shared with the spawning path through the thread-local context.
pub struct WorkerCore {
    /// Index of this worker within the pool.
    id: WorkerId,
    /// State shared by all workers of the pool.
    shared: Arc<PoolShared>,
    /// Deque owned by this worker. The owner pops newest-first; thieves take oldest-first.
    local: LocalDeque<Task>,
    /// Random number generator for victim selection.
    rng: RefCell<SmallRng>,
    /// Start index of the next round-robin victim scan.
    next_victim: Cell<usize>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl WorkerCore {
    pub fn new(id: WorkerId, shared: Arc<PoolShared>, local: LocalDeque<Task>) -> Rc<Self> {
        let seed: u64 = WORKER_RNG_SEED.wrapping_add(id.0 as u64);
        Rc::new(Self {
            id,
            shared,
            local,
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
            next_victim: Cell::new(id.0),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn shared(&self) -> &Arc<PoolShared> {
        &self.shared
    }

    /// Enqueues a task on this worker's own deque and lets one parked sibling know there is work to steal.
    pub fn push_local(&self, task: Task) {
        trace!("push_local(): worker={} task={}", self.id, task.id());
        self.local.push(task);
        self.shared.gate().wake_one();
    }

    /// Finds the next task to run: own deque first, then the global queue, then sibling deques.
    pub fn find_task(&self) -> Option<Task> {
        if let Some(task) = self.local.pop() {
            return Some(task);
        }
        if let Some(task) = self.shared.injectors().steal_into(&self.local) {
            trace!("find_task(): worker={} took task={} from the global queue", self.id, task.id());
            return Some(task);
        }
        self.steal_from_siblings()
    }

    /// Runs one task to completion and retires it against the pool.
    pub fn run_task(&self, task: Task) {
        trace!("run_task(): worker={} task={}", self.id, task.id());
        task.run(Some(self.id));
        self.shared.task_retired();
    }

    /// Steals a batch from a sibling deque, scanning victims in the order the pool's steal strategy dictates.
    fn steal_from_siblings(&self) -> Option<Task> {
        let stealers: &[Stealer<Task>] = self.shared.stealers();
        let siblings: usize = stealers.len();
        if siblings <= 1 {
            return None;
        }

        let start: usize = match self.shared.steal_strategy() {
            StealStrategy::RoundRobin => {
                let start: usize = self.next_victim.get();
                self.next_victim.set((start + 1) % siblings);
                start
            },
            StealStrategy::Random => self.rng.borrow_mut().gen_range(0..siblings),
        };

        for _ in 0..limits::MAX_STEAL_RETRIES {
            let mut contended: bool = false;
            for offset in 0..siblings {
                let victim: usize = (start + offset) % siblings;
                if victim == self.id.0 {
                    continue;
                }
                match stealers[victim].steal_batch_and_pop(&self.local) {
                    Steal::Success(task) => {
                        trace!("steal_from_siblings(): worker={} stole task={} from={}", self.id, task.id(), victim);
                        return Some(task);
                    },
                    Steal::Retry => contended = true,
                    Steal::Empty => (),
                }
            }
            if !contended {
                break;
            }
        }
        None
    }

    /// Spins briefly, then parks on the pool's idle gate unless work became visible meanwhile.
    fn idle(&self) {
        for _ in 0..limits::WORKER_SPIN_ITERATIONS {
            hint::spin_loop();
        }
        if !self.shared.injectors().is_empty() {
            return;
        }
        self.shared.gate().park_timeout(limits::WORKER_PARK_TIMEOUT);
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Main loop of a worker thread: run every task in reach, otherwise idle until the pool drains and shuts down.
pub fn run(core: Rc<WorkerCore>) {
    let _context_guard = context::WorkerGuard::install(core.clone());
    debug!("run(): worker={} online", core.id());
    loop {
        if let Some(task) = core.find_task() {
            core.run_task(task);
            continue;
        }
        if core.shared().is_drained() {
            break;
        }
        core.idle();
    }
    debug!("run(): worker={} offline", core.id());
}
