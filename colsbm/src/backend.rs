//! Pluggable synchronous map over independent tasks.
//!
//! Every fan-out in the crate (multi-start runs of a cell, cells of an
//! exploration wave, candidate groupings of the partitioner) goes
//! through `TaskMap::map`, so the orchestration code never depends on
//! how the tasks are executed. Results always come back in task order.

use crate::error::{Error, Result};
use rayon::prelude::*;

/// Order-preserving parallel map
pub trait TaskMap: Sync {
    /// Apply `f` to every task and return the results in task order
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send;

    /// Number of tasks that may run at once
    fn num_workers(&self) -> usize;
}

/// Runs tasks one after another on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl TaskMap for Sequential {
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        tasks.into_iter().map(f).collect()
    }

    fn num_workers(&self) -> usize {
        1
    }
}

/// Dedicated rayon pool
pub struct ThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| Error::Backend(e.to_string()))?;
        Ok(ThreadPool { pool })
    }
}

impl TaskMap for ThreadPool {
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        self.pool.install(|| tasks.into_par_iter().map(f).collect())
    }

    fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// Backend chosen at run time
pub enum Backend {
    Sequential(Sequential),
    ThreadPool(ThreadPool),
}

impl Backend {
    /// `1` runs sequentially; more cores get a thread pool. Zero cores
    /// is an error.
    pub fn with_cores(num_cores: usize) -> Result<Self> {
        match num_cores {
            0 => Err(Error::InvalidOption(
                "number of cores must be at least 1".to_string(),
            )),
            1 => Ok(Backend::Sequential(Sequential)),
            n => Ok(Backend::ThreadPool(ThreadPool::new(n)?)),
        }
    }

    /// All logical CPUs
    pub fn all_cores() -> Result<Self> {
        Self::with_cores(num_cpus::get().max(1))
    }
}

impl TaskMap for Backend {
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        match self {
            Backend::Sequential(b) => b.map(tasks, f),
            Backend::ThreadPool(b) => b.map(tasks, f),
        }
    }

    fn num_workers(&self) -> usize {
        match self {
            Backend::Sequential(b) => b.num_workers(),
            Backend::ThreadPool(b) => b.num_workers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_cores_rejected() {
        assert!(matches!(Backend::with_cores(0), Err(Error::InvalidOption(_))));
        assert_eq!(Backend::with_cores(1).unwrap().num_workers(), 1);
    }

    #[test]
    fn test_thread_pool_preserves_order() {
        let backend = Backend::with_cores(3).unwrap();
        assert_eq!(backend.num_workers(), 3);
        let out = backend.map((0..100).collect(), |x: usize| x * x);
        let expected: Vec<usize> = (0..100).map(|x| x * x).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_sequential_matches_pool() {
        let f = |x: u64| x.wrapping_mul(2654435761) % 97;
        let a = Sequential.map((0..50).collect(), f);
        let b = ThreadPool::new(2).unwrap().map((0..50).collect(), f);
        assert_eq!(a, b);
    }
}
