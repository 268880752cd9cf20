//! Error types for the runtime.

use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Memory or event service error.
    #[snafu(display("device error: {source}"))]
    Device { source: clcpu_device::Error },

    #[snafu(display("failed to spawn worker thread '{name}': {source}"))]
    ThreadSpawn { name: String, source: std::io::Error },

    /// Configuration that cannot produce a usable worker pool.
    #[snafu(display("invalid configuration: {reason}"))]
    InvalidConfig { reason: String },

    /// Entry point lookup failed.
    #[snafu(display("kernel '{name}' not found in module"))]
    KernelNotFound { name: String },
}
