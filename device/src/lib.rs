//! Shared runtime services of the clcpu execution core.
//!
//! - [`GlobalMemory`] resolves memory objects (buffers, images and their
//!   sub-objects) to addresses a running kernel can dereference.
//! - [`LocalMemory`] is the per-worker bump arena backing `__local` storage.
//! - [`WaitList`] tracks completion events and their dependency links.
//! - [`GlobalLock`] serializes critical sections across all work-items.

pub mod allocator;
pub mod error;
pub mod local;
pub mod lock;
pub mod object;
pub mod sync;


pub use allocator::{CACHE_LINE, DevicePtr, GlobalMemory};
pub use error::{Error, Result};
pub use local::LocalMemory;
pub use lock::{GlobalLock, GlobalLockGuard};
pub use object::{ImageDesc, MemFlavor, MemKind, MemObjectId, MemoryObject, SubRegion};
pub use sync::{Event, WaitList};
