//! Deferred dispatch: the "run later" primitive reactions are handed to.
//!
//! Every promise captures a [`Scheduler`] when it is constructed. Reaction
//! dispatch is the only thing ever deferred; executors, the resolution
//! procedure, and combinator wiring all run synchronously.
//!
//! Each thread owns a default [`MicrotaskQueue`]. Code that does not run inside
//! an async runtime drives it with [`run_until_idle`]. Inside a
//! `tokio::task::LocalSet`, install a [`TokioLocalScheduler`] instead and the
//! runtime drives dispatch on its own.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tokio::task::spawn_local;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce()>;

/// Defers a job until after the current synchronous call stack unwinds.
///
/// Implementations must run jobs in the order they were deferred and must
/// never run a job from inside `defer` itself.
pub trait Scheduler {
    fn defer(&self, job: Job);
}

/// Outcome of one drain pass over a [`MicrotaskQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Jobs executed during the pass.
    pub ran: usize,
    /// Jobs still queued when the pass stopped.
    pub remaining: usize,
}

/// FIFO queue of deferred jobs, drained explicitly by its owner.
#[derive(Default)]
pub struct MicrotaskQueue {
    jobs: RefCell<VecDeque<Job>>,
    budget: Cell<Option<usize>>,
}

impl MicrotaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue whose drain passes stop after `budget` jobs.
    #[must_use]
    pub fn with_budget(budget: usize) -> Self {
        let queue = Self::new();
        queue.set_budget(Some(budget));
        queue
    }

    pub fn set_budget(&self, budget: Option<usize>) {
        self.budget.set(budget);
    }

    #[must_use]
    pub fn budget(&self) -> Option<usize> {
        self.budget.get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.borrow().is_empty()
    }

    /// Run the oldest queued job. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        let next = self.jobs.borrow_mut().pop_front();
        match next {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until the queue is empty or the budget is spent.
    ///
    /// Jobs deferred while draining are picked up by the same pass.
    pub fn run_until_idle(&self) -> DrainReport {
        let budget = self.budget.get();
        let mut ran = 0;
        while budget.is_none_or(|limit| ran < limit) && self.run_next() {
            ran += 1;
        }

        let remaining = self.len();
        if remaining > 0 {
            tracing::debug!(ran, remaining, "Microtask drain stopped at budget");
        }
        DrainReport { ran, remaining }
    }
}

impl Scheduler for MicrotaskQueue {
    fn defer(&self, job: Job) {
        self.jobs.borrow_mut().push_back(job);
    }
}

impl fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("queued", &self.len())
            .field("budget", &self.budget.get())
            .finish()
    }
}

/// Defers jobs as tasks on the current `tokio::task::LocalSet`.
///
/// `defer` panics when called outside a `LocalSet`, the same way
/// `tokio::task::spawn_local` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLocalScheduler;

impl TokioLocalScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioLocalScheduler {
    fn defer(&self, job: Job) {
        spawn_local(async move { job() });
    }
}

// ============================================================================
// Per-thread scheduler selection
// ============================================================================

thread_local! {
    static MICROTASKS: Rc<MicrotaskQueue> = Rc::new(MicrotaskQueue::new());
    static INSTALLED: RefCell<Vec<Installed>> = const { RefCell::new(Vec::new()) };
    static NEXT_INSTALL: Cell<u64> = const { Cell::new(0) };
}

struct Installed {
    token: u64,
    scheduler: Rc<dyn Scheduler>,
}

/// The scheduler new promises on this thread capture.
///
/// This is the most recently installed scheduler, or the thread's default
/// [`MicrotaskQueue`] when none is installed.
#[must_use]
pub fn current() -> Rc<dyn Scheduler> {
    INSTALLED
        .with(|stack| stack.borrow().last().map(|entry| Rc::clone(&entry.scheduler)))
        .unwrap_or_else(|| microtasks() as Rc<dyn Scheduler>)
}

/// The thread's default microtask queue.
#[must_use]
pub fn microtasks() -> Rc<MicrotaskQueue> {
    MICROTASKS.with(Rc::clone)
}

/// Drain the thread's default microtask queue.
pub fn run_until_idle() -> DrainReport {
    microtasks().run_until_idle()
}

/// Make `scheduler` the one new promises on this thread capture.
///
/// Installations stack. Dropping the returned guard removes exactly this
/// installation, so guards may be dropped in any order; the latest
/// installation still alive stays current. Promises keep the scheduler they
/// were created with.
#[must_use = "the scheduler is uninstalled when the guard is dropped"]
pub fn install(scheduler: Rc<dyn Scheduler>) -> SchedulerGuard {
    let token = NEXT_INSTALL.with(|next| {
        let token = next.get();
        next.set(token + 1);
        token
    });
    INSTALLED.with(|stack| stack.borrow_mut().push(Installed { token, scheduler }));
    SchedulerGuard { token }
}

/// Uninstalls its scheduler on drop.
pub struct SchedulerGuard {
    token: u64,
}

impl Drop for SchedulerGuard {
    fn drop(&mut self) {
        let token = self.token;
        // Removed entries are dropped after the borrow ends.
        let removed = INSTALLED
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                let index = stack.iter().rposition(|entry| entry.token == token)?;
                Some(stack.remove(index))
            })
            .ok()
            .flatten();
        drop(removed);
    }
}

impl fmt::Debug for SchedulerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerGuard")
            .field("token", &self.token)
            .finish()
    }
}
