//! Engine configuration.

use std::str::FromStr;

use ndengine_buffer::{AllocationMode, EPS_THRESHOLD};
use ndengine_traits::{DataType, Ordering};

use crate::{EngineError, Result};

/// Minimum element count for dispatching work onto the pool.
pub const MIN_THREAD_LENGTH: usize = 1 << 15;

/// Defaults threaded through array factories and the executor.
///
/// Immutable once an [`Engine`](crate::Engine) is built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub dtype: DataType,
    pub ordering: Ordering,
    pub allocation: AllocationMode,
    /// Tolerance for [`Engine::buffers_equal`](crate::Engine::buffers_equal) and
    /// [`Engine::arrays_equal`](crate::Engine::arrays_equal).
    pub eps_threshold: f64,
    /// Element count at or above which tasks run asynchronously.
    pub parallel_threshold: usize,
    /// Worker count for the shared pool; `None` uses rayon's default.
    pub num_threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dtype: DataType::Double,
            ordering: Ordering::RowMajor,
            allocation: AllocationMode::Heap,
            eps_threshold: EPS_THRESHOLD,
            parallel_threshold: MIN_THREAD_LENGTH,
            num_threads: None,
        }
    }
}

impl EngineConfig {
    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_allocation(mut self, allocation: AllocationMode) -> Self {
        self.allocation = allocation;
        self
    }

    pub fn with_eps_threshold(mut self, eps: f64) -> Self {
        self.eps_threshold = eps;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Defaults overridden by `NDENGINE_*` environment variables.
    ///
    /// Recognized: `NDENGINE_DTYPE`, `NDENGINE_ORDERING`, `NDENGINE_ALLOCATION`,
    /// `NDENGINE_EPS`, `NDENGINE_PARALLEL_THRESHOLD`, `NDENGINE_THREADS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup("NDENGINE_DTYPE") {
            config.dtype = parse("NDENGINE_DTYPE", &v)?;
        }
        if let Some(v) = lookup("NDENGINE_ORDERING") {
            config.ordering = parse("NDENGINE_ORDERING", &v)?;
        }
        if let Some(v) = lookup("NDENGINE_ALLOCATION") {
            config.allocation = parse("NDENGINE_ALLOCATION", &v)?;
        }
        if let Some(v) = lookup("NDENGINE_EPS") {
            config.eps_threshold = parse("NDENGINE_EPS", &v)?;
        }
        if let Some(v) = lookup("NDENGINE_PARALLEL_THRESHOLD") {
            config.parallel_threshold = parse("NDENGINE_PARALLEL_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("NDENGINE_THREADS") {
            let threads: usize = parse("NDENGINE_THREADS", &v)?;
            if threads == 0 {
                return Err(EngineError::Config("NDENGINE_THREADS must be positive".into()));
            }
            config.num_threads = Some(threads);
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{key}: cannot parse {value:?}")))
}
