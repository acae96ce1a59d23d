//! Line partitioning and the per-call worker pool.
//!
//! Every pass splits its lines into contiguous index ranges, one per task,
//! and waits for all tasks before returning. A failing task does not stop
//! the others; the first failure is kept and reported after the barrier.

use std::any::Any;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use crate::{ConvolveError, Result};

/// Number of tasks per pass. Oversubscribing the pool smooths out uneven
/// line costs near partition boundaries.
pub(crate) fn num_tasks(num_threads: usize) -> usize {
    if num_threads > 1 {
        num_threads * 4
    } else {
        1
    }
}

/// Index range of task `t` out of `num_tasks` over `total` lines.
pub(crate) fn partition(total: usize, num_tasks: usize, t: usize) -> Range<usize> {
    let bound = |t: usize| (t as u128 * total as u128 / num_tasks as u128) as usize;
    bound(t)..bound(t + 1)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Runs the tasks of each pass, on a rayon pool when more than one thread
/// is requested.
pub(crate) struct Executor {
    num_threads: usize,
    num_tasks: usize,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    pub(crate) fn new(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(ConvolveError::InvalidThreadCount(num_threads));
        }
        #[cfg(feature = "parallel")]
        let pool = if num_threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(|i| format!("lattice-conv-{i}"))
                    .build()?,
            )
        } else {
            None
        };
        Ok(Self {
            num_threads,
            num_tasks: num_tasks(num_threads),
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    pub(crate) fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub(crate) fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    #[cfg(feature = "parallel")]
    fn dispatch<G: Fn(usize) + Sync>(&self, run_one: &G) {
        match &self.pool {
            Some(pool) => pool.scope(|s| {
                for t in 0..self.num_tasks {
                    s.spawn(move |_| run_one(t));
                }
            }),
            None => (0..self.num_tasks).for_each(run_one),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn dispatch<G: Fn(usize) + Sync>(&self, run_one: &G) {
        (0..self.num_tasks).for_each(run_one);
    }

    /// Run `task` over every partition of `0..total` and wait for all of
    /// them. Errors and panics are reported for pass dimension `dim`.
    pub(crate) fn run<F>(&self, dim: usize, total: usize, task: F) -> Result<()>
    where
        F: Fn(Range<usize>) -> Result<()> + Sync,
    {
        let first_error: Mutex<Option<ConvolveError>> = Mutex::new(None);
        let run_one = |t: usize| {
            let range = partition(total, self.num_tasks, t);
            if range.is_empty() {
                return;
            }
            let error = match catch_unwind(AssertUnwindSafe(|| task(range))) {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(payload) => ConvolveError::TaskFailed {
                    dim,
                    message: panic_message(payload.as_ref()),
                },
            };
            let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(error);
            }
        };

        self.dispatch(&run_one);

        match first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
