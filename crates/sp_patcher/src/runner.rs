//! Task tracking and the concurrent runner.
//!
//! # Error Capture Algorithm
//!
//! 1. Every item becomes one task on a rayon pool sized to the available
//!    hardware parallelism (or runs inline in sequential mode).
//! 2. A task returns a [`TaskOutcome`] for per-item results, or an `Err` for a
//!    fatal condition. Panics are caught and turned into [`Error::TaskPanicked`].
//! 3. The first fatal error is stored and sets the abort flag. Tasks that have not
//!    started yet see the flag and return without running; in-flight tasks finish.
//! 4. Later fatal errors are logged and discarded.
//! 5. Once the pool drains, the stored error is logged once and returned to the
//!    caller.

use crate::error::{Error, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Result of one task, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskOutcome {
    #[default]
    Success,
    SuccessWithWarnings,
    Failure,
}

impl TaskOutcome {
    pub fn label(self) -> &'static str {
        match self {
            TaskOutcome::Success => "COMPLETED",
            TaskOutcome::SuccessWithWarnings => "COMPLETED WITH WARNINGS",
            TaskOutcome::Failure => "FAILED",
        }
    }

    /// Escalate `self` to `other` if worse, capped at `threshold`.
    pub fn escalate(&mut self, other: TaskOutcome, threshold: TaskOutcome) {
        if other > *self {
            *self = other.min(threshold);
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type CompletionCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Counts completed tasks per outcome and logs progress.
pub struct TaskTracker {
    name: String,
    total: usize,
    step: usize,
    state: Mutex<TrackerState>,
    on_complete: Option<CompletionCallback>,
}

#[derive(Default)]
struct TrackerState {
    counts: BTreeMap<TaskOutcome, usize>,
    last_percent: Option<usize>,
    last_step: Option<usize>,
}

impl TrackerState {
    /// Whether `percent` enters a step interval not logged yet.
    fn crosses_step(&mut self, percent: usize, step: usize) -> bool {
        let bucket = Some(percent / step);
        if bucket > self.last_step {
            self.last_step = bucket;
            true
        } else {
            false
        }
    }
}

impl TaskTracker {
    /// # Arguments
    ///
    /// * `name` - Prefix for progress lines
    /// * `total` - Number of tasks expected
    /// * `step` - Percentage interval between progress lines
    pub fn new(name: impl Into<String>, total: usize, step: usize) -> Self {
        let name = name.into();
        tracing::info!("{} Starting...", name);
        Self {
            name,
            total,
            step: step.max(1),
            state: Mutex::new(TrackerState::default()),
            on_complete: None,
        }
    }

    /// Call `f(completed, total)` after every completed task.
    pub fn with_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn complete(&self, outcome: TaskOutcome) {
        let completed = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            *state.counts.entry(outcome).or_default() += 1;
            let completed: usize = state.counts.values().sum();

            let percent = if self.total == 0 {
                100
            } else {
                completed * 100 / self.total
            };
            if state.crosses_step(percent, self.step) {
                tracing::info!(
                    "{} Progress: {}/{} [{}%]",
                    self.name,
                    completed,
                    self.total,
                    percent
                );
            }
            if state.last_percent != Some(percent) {
                state.last_percent = Some(percent);
                if percent == 100 {
                    tracing::info!("{}", self.summary_line(&state.counts));
                }
            }
            completed
        };

        if let Some(callback) = &self.on_complete {
            callback(completed, self.total);
        }
    }

    pub fn completed(&self) -> usize {
        self.counts().values().sum()
    }

    pub fn counts(&self) -> BTreeMap<TaskOutcome, usize> {
        match self.state.lock() {
            Ok(state) => state.counts.clone(),
            Err(poisoned) => poisoned.into_inner().counts.clone(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed() == self.total
    }

    pub fn summary(&self) -> String {
        self.summary_line(&self.counts())
    }

    fn summary_line(&self, counts: &BTreeMap<TaskOutcome, usize>) -> String {
        let mut line = format!("{} Summary: ", self.name);
        for (outcome, count) in counts.iter().filter(|(_, c)| **c > 0) {
            line.push_str(&format!("[ {} : {} ] ", outcome, count));
        }
        line.push_str("See log to see error messages, if any.");
        line
    }
}

/// Runs tasks sequentially or on a bounded pool.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    parallel: bool,
    threads: usize,
}

impl TaskRunner {
    pub fn new(parallel: bool) -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { parallel, threads }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Run `task` over every item, reporting outcomes to `tracker`.
    ///
    /// Returns the first fatal error after all started tasks have finished.
    pub fn run<T, F>(&self, items: Vec<T>, tracker: &TaskTracker, task: F) -> Result<()>
    where
        T: Send,
        F: Fn(T) -> Result<TaskOutcome> + Sync,
    {
        let abort = AtomicBool::new(false);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let started = AtomicUsize::new(0);

        let run_one = |item: T| {
            if abort.load(Ordering::SeqCst) {
                return;
            }
            started.fetch_add(1, Ordering::SeqCst);
            let result = catch_unwind(AssertUnwindSafe(|| task(item)))
                .unwrap_or_else(|panic| Err(Error::TaskPanicked(panic_message(panic.as_ref()))));
            match result {
                Ok(outcome) => tracker.complete(outcome),
                Err(e) => record_error(&abort, &first_error, e),
            }
        };

        if self.parallel && self.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| Error::Other(format!("Unable to start worker pool: {}", e)))?;
            pool.scope(|scope| {
                for item in items {
                    let run_one = &run_one;
                    scope.spawn(move |_| run_one(item));
                }
            });
        } else {
            for item in items {
                if abort.load(Ordering::SeqCst) {
                    break;
                }
                run_one(item);
            }
        }

        tracing::debug!("{} tasks started", started.load(Ordering::SeqCst));
        let captured = match first_error.into_inner() {
            Ok(captured) => captured,
            Err(poisoned) => poisoned.into_inner(),
        };
        match captured {
            Some(e) => {
                tracing::error!("Task failed: {}", e);
                Err(e)
            }
            None => Ok(()),
        }
    }
}

fn record_error(abort: &AtomicBool, slot: &Mutex<Option<Error>>, error: Error) {
    abort.store(true, Ordering::SeqCst);
    let mut slot = match slot.lock() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    if slot.is_none() {
        *slot = Some(error);
    } else {
        tracing::error!("Additional task error: {}", error);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
