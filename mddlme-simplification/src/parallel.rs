//! Thread pool configuration for per-partition work
//!
//! Partitions are independent once border vertices are fixed, so they are
//! simplified concurrently on a dedicated rayon pool. Results are always
//! collected in partition order, which keeps the merged output independent
//! of scheduling.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use mddlme_core::{Error, Result};

/// Parallel execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Run partitions concurrently (disable for debugging)
    pub enabled: bool,
    /// Number of worker threads (None = one per logical CPU)
    pub num_threads: Option<usize>,
    /// Worker thread name prefix
    pub thread_name_prefix: String,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_threads: None,
            thread_name_prefix: "mddlme".to_string(),
        }
    }
}

impl ParallelConfig {
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build a pool for these settings.
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let mut builder = ThreadPoolBuilder::new();

        if let Some(num_threads) = self.num_threads {
            if num_threads == 0 {
                return Err(Error::InvalidParameter(
                    "num_threads must be at least 1".to_string(),
                ));
            }
            builder = builder.num_threads(num_threads);
        }

        if !self.thread_name_prefix.is_empty() {
            let prefix = self.thread_name_prefix.clone();
            builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
        }

        builder
            .build()
            .map_err(|e| Error::Algorithm(format!("Failed to create thread pool: {}", e)))
    }

    /// Apply `f` to every item, in parallel when enabled. The output keeps
    /// the input order; the first error encountered in that order is returned.
    pub fn try_map<T, U, F>(&self, data: &[T], f: F) -> Result<Vec<U>>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> Result<U> + Sync + Send,
    {
        if !self.enabled || data.len() < 2 {
            return data.iter().map(f).collect();
        }

        let pool = self.build_pool()?;
        let results: Vec<Result<U>> = pool.install(|| data.par_iter().map(f).collect());
        results.into_iter().collect()
    }

    /// Number of threads the pool would use.
    pub fn effective_threads(&self) -> usize {
        if !self.enabled {
            1
        } else {
            self.num_threads
                .unwrap_or_else(rayon::current_num_threads)
                .max(1)
        }
    }
}
