//! Runtime configuration.
//!
//! Plain struct with a bon builder and environment variable fallbacks:
//!
//! * `CLCPU_MULTIPROCESSORS` - multiprocessors per device (default 1)
//! * `CLCPU_WORKERS` - worker threads per device (default: logical CPUs)
//! * `CLCPU_PIN_THREADS=0` - do not pin workers to cores
//! * `CLCPU_GLOBAL_MEMORY` - global memory capacity in bytes (default 1 GiB)
//! * `CLCPU_LOCAL_MEMORY` - local memory per worker in bytes (default 32 KiB)

use bon::bon;

pub const DEFAULT_GLOBAL_MEMORY: usize = 1 << 30;
pub const DEFAULT_LOCAL_MEMORY: usize = 512 * clcpu_device::CACHE_LINE;

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub multiprocessors: usize,
    pub workers: usize,
    /// Pin each worker to its assigned core (best-effort, Linux only).
    pub pin_threads: bool,
    pub global_memory: usize,
    pub local_memory: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            multiprocessors: 1,
            workers: default_workers(),
            pin_threads: true,
            global_memory: DEFAULT_GLOBAL_MEMORY,
            local_memory: DEFAULT_LOCAL_MEMORY,
        }
    }
}

#[bon]
impl RuntimeConfig {
    #[builder]
    pub fn builder(
        #[builder(default = 1)] multiprocessors: usize,
        #[builder(default = default_workers())] workers: usize,
        #[builder(default = true)] pin_threads: bool,
        #[builder(default = DEFAULT_GLOBAL_MEMORY)] global_memory: usize,
        #[builder(default = DEFAULT_LOCAL_MEMORY)] local_memory: usize,
    ) -> Self {
        Self { multiprocessors, workers, pin_threads, global_memory, local_memory }
    }

    pub fn from_env() -> Self {
        let multiprocessors = std::env::var("CLCPU_MULTIPROCESSORS").ok().and_then(|s| s.parse().ok()).unwrap_or(1);
        let workers = std::env::var("CLCPU_WORKERS").ok().and_then(|s| s.parse().ok()).unwrap_or_else(default_workers);
        let pin_threads = std::env::var("CLCPU_PIN_THREADS").map(|s| s != "0").unwrap_or(true);
        let global_memory =
            std::env::var("CLCPU_GLOBAL_MEMORY").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_GLOBAL_MEMORY);
        let local_memory =
            std::env::var("CLCPU_LOCAL_MEMORY").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_LOCAL_MEMORY);

        Self { multiprocessors, workers, pin_threads, global_memory, local_memory }
    }

    /// Core assignment per multiprocessor: worker `w` runs on core `w % cpus`
    /// and belongs to multiprocessor `w % multiprocessors`.
    pub fn partition(&self) -> Vec<Vec<usize>> {
        let cpus = num_cpus::get().max(1);
        let groups = self.multiprocessors.max(1);
        let mut partition = vec![Vec::new(); groups];
        for worker in 0..self.workers {
            partition[worker % groups].push(worker % cpus);
        }
        partition
    }
}
