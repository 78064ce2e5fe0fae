//! Worker units for batch evaluation.

use rayon::prelude::*;
use rayon::ThreadPool;

use cf_types::AlgorithmError;

/// A run-scoped pool of evaluation workers.
///
/// One worker means sequential evaluation on the calling thread; more than
/// one builds a dedicated rayon pool so the run never competes with the
/// global pool.
pub struct WorkerPool {
    workers: usize,
    pool: Option<ThreadPool>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, AlgorithmError> {
        let workers = workers.max(1);
        if workers == 1 {
            return Ok(Self {
                workers,
                pool: None,
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cf-worker-{}", i + 1))
            .build()
            .map_err(|e| AlgorithmError::WorkerPool(e.to_string()))?;

        Ok(Self {
            workers,
            pool: Some(pool),
        })
    }

    pub fn sequential() -> Self {
        Self {
            workers: 1,
            pool: None,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `f` to every item, preserving input order in the output.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match &self.pool {
            None => items.iter().map(f).collect(),
            Some(pool) => pool.install(|| items.par_iter().map(f).collect()),
        }
    }

    /// Evaluate the objective at every point.
    pub fn evaluate<F>(&self, f: &F, points: &[Vec<f64>]) -> Vec<f64>
    where
        F: Fn(&[f64]) -> f64 + Sync,
    {
        self.map(points, |p| f(p))
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}
