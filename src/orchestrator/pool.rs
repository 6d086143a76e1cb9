//! Bounded worker pool shared by every phase of an orchestration run.
//!
//! Node work is blocking (artifact downloads, filesystem checks, context construction), so it
//! runs on the blocking threads of a dedicated runtime capped at the pool size. Fan-out and
//! fan-in happen on the runtime's async side; excess submissions queue instead of spawning.

use std::future::Future;
use std::io;
use tokio::runtime::{Builder, Runtime};

pub struct WorkerPool {
    runtime: Runtime,
    size: usize,
}

impl WorkerPool {
    /// Default pool size: the platform's available parallelism.
    pub fn available_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// `size == 0` means [`WorkerPool::available_parallelism`].
    pub fn new(size: usize) -> io::Result<Self> {
        let size = if size == 0 {
            Self::available_parallelism()
        } else {
            size
        };
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(size)
            .thread_name("canopy-worker")
            .build()?;
        Ok(Self { runtime, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Drives a phase to completion. Must not be called from inside another async runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Runs one unit of node work on a pool thread. A panicking task is reported as an error.
    pub async fn run<T, F>(&self, work: F) -> Result<T, String>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.runtime
            .spawn_blocking(work)
            .await
            .map_err(|e| format!("worker task failed: {}", e))
    }
}
