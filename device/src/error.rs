use snafu::Snafu;

use crate::object::MemObjectId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Global memory capacity exhausted.
    #[snafu(display("out of global memory: requested {requested} bytes, {available} available"))]
    OutOfGlobalMemory { requested: usize, available: usize },

    /// The host allocator refused a block.
    #[snafu(display("host allocation of {size} bytes failed"))]
    HostAllocation { size: usize },

    /// Sub-object mapped before its parent.
    #[snafu(display("parent {parent} of {object} is not mapped"))]
    ParentNotMapped { object: MemObjectId, parent: MemObjectId },

    #[snafu(display("sub-region at offset {offset} with size {size} exceeds parent size {parent_size}"))]
    InvalidSubRegion { offset: usize, size: usize, parent_size: usize },

    #[snafu(display("memory object {object} is not mapped"))]
    NotMapped { object: MemObjectId },

    #[snafu(display("access at offset {offset} with length {len} exceeds object size {size}"))]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[snafu(display("fill length {len} is not a multiple of pattern length {pattern}"))]
    PatternMismatch { len: usize, pattern: usize },

    /// Initial host data shorter than the layout it is read with.
    #[snafu(display("host data too short: need {required} bytes, got {actual}"))]
    InvalidHostData { required: usize, actual: usize },
}
