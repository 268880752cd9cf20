//! Global memory: the address-resolution table for kernel-visible objects.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::collections::HashMap;
use std::ptr::NonNull;

use parking_lot::Mutex;
use smallvec::SmallVec;
use snafu::{OptionExt, ensure};

use crate::error::{
    HostAllocationSnafu, InvalidHostDataSnafu, InvalidSubRegionSnafu, NotMappedSnafu, OutOfBoundsSnafu,
    OutOfGlobalMemorySnafu, ParentNotMappedSnafu, PatternMismatchSnafu, Result,
};
use crate::object::{MemFlavor, MemKind, MemObjectId, MemoryObject};

/// Alignment of every runtime-owned block.
pub const CACHE_LINE: usize = 64;

/// Address of kernel-visible memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(NonNull<u8>);

// SAFETY: a DevicePtr is an address, not an owner; synchronizing accesses through
// it is the kernel's business, as on any device.
unsafe impl Send for DevicePtr {}
unsafe impl Sync for DevicePtr {}

impl DevicePtr {
    pub fn new(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn from_mut<T>(value: &mut T) -> Self {
        Self(NonNull::from(value).cast())
    }

    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Address `offset` bytes further.
    ///
    /// # Safety
    ///
    /// The result must stay within (or one past) the allocation `self` points into.
    pub unsafe fn add(self, offset: usize) -> Self {
        // SAFETY: forwarded to the caller.
        Self(unsafe { self.0.add(offset) })
    }
}

/// Cache-line aligned, zero-initialized heap block.
pub(crate) struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the block exclusively owns its allocation.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    pub(crate) fn zeroed(size: usize) -> Result<Self> {
        let layout = Layout::from_size_align(size.max(1), CACHE_LINE).ok().context(HostAllocationSnafu { size })?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).context(HostAllocationSnafu { size })?;
        Ok(Self { ptr, layout })
    }

    pub(crate) fn ptr(&self) -> DevicePtr {
        DevicePtr(self.ptr)
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with the same layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block").field("ptr", &self.ptr).field("size", &self.layout.size()).finish()
    }
}

#[derive(Debug)]
enum Storage {
    /// Runtime-owned block, counted against capacity.
    Owned(Block),
    /// Aliases a parent object's storage.
    Sub { parent: MemObjectId },
    /// Caller-owned host storage.
    Host,
}

#[derive(Debug)]
struct Mapping {
    ptr: DevicePtr,
    size: usize,
    storage: Storage,
}

#[derive(Debug, Default)]
struct State {
    available: usize,
    mappings: HashMap<MemObjectId, Mapping>,
    /// Buffer → images created over it.
    attachments: HashMap<MemObjectId, SmallVec<[MemObjectId; 2]>>,
    /// Parent → sub-objects aliasing its storage.
    subs: HashMap<MemObjectId, SmallVec<[MemObjectId; 4]>>,
}

impl State {
    fn mapping(&self, object: MemObjectId) -> Result<&Mapping> {
        self.mappings.get(&object).context(NotMappedSnafu { object })
    }

    fn range(&self, object: MemObjectId, offset: usize, len: usize) -> Result<DevicePtr> {
        let mapping = self.mapping(object)?;
        ensure!(
            offset.checked_add(len).is_some_and(|end| end <= mapping.size),
            OutOfBoundsSnafu { offset, len, size: mapping.size }
        );
        // SAFETY: offset is within the mapping.
        Ok(unsafe { mapping.ptr.add(offset) })
    }
}

/// Resolves memory objects to addresses and accounts runtime-owned storage
/// against a fixed capacity.
///
/// One lock guards the table and is held for the duration of a single call.
#[derive(Debug)]
pub struct GlobalMemory {
    capacity: usize,
    state: Mutex<State>,
}

impl GlobalMemory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, state: Mutex::new(State { available: capacity, ..Default::default() }) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Allocate runtime-owned storage for `object` and record the mapping.
    ///
    /// Ignores flavor, parent and host data; use [`map`](Self::map) for the full
    /// resolution rules. An already mapped object keeps its address.
    pub fn alloc(&self, object: &MemoryObject) -> Result<DevicePtr> {
        let mut state = self.state.lock();
        if let Some(mapping) = state.mappings.get(&object.id()) {
            return Ok(mapping.ptr);
        }
        Self::alloc_locked(&mut state, object.id(), object.size())
    }

    fn alloc_locked(state: &mut State, id: MemObjectId, size: usize) -> Result<DevicePtr> {
        ensure!(state.available >= size, OutOfGlobalMemorySnafu { requested: size, available: state.available });

        let block = Block::zeroed(size)?;
        let ptr = block.ptr();
        state.available -= size;
        state.mappings.insert(id, Mapping { ptr, size, storage: Storage::Owned(block) });
        tracing::trace!(object = %id, size, available = state.available, "global block allocated");
        Ok(ptr)
    }

    /// Resolve `object` to an address, allocating storage when it needs its own.
    ///
    /// Mapping an already mapped object returns the existing address.
    pub fn map(&self, object: &MemoryObject) -> Result<DevicePtr> {
        let mut state = self.state.lock();
        let id = object.id();

        if let Some(mapping) = state.mappings.get(&id) {
            return Ok(mapping.ptr);
        }

        if let Some(region) = object.parent() {
            let parent = state
                .mappings
                .get(&region.parent)
                .context(ParentNotMappedSnafu { object: id, parent: region.parent })?;
            ensure!(
                region.offset.checked_add(object.size()).is_some_and(|end| end <= parent.size),
                InvalidSubRegionSnafu { offset: region.offset, size: object.size(), parent_size: parent.size }
            );
            // SAFETY: the sub-region lies within the parent's mapping.
            let ptr = unsafe { parent.ptr.add(region.offset) };
            let storage = Storage::Sub { parent: region.parent };
            state.mappings.insert(id, Mapping { ptr, size: object.size(), storage });
            state.subs.entry(region.parent).or_default().push(id);
            return Ok(ptr);
        }

        if let MemFlavor::HostOwned { host_ptr } = object.flavor() {
            state.mappings.insert(id, Mapping { ptr: host_ptr, size: object.size(), storage: Storage::Host });
            return Ok(host_ptr);
        }

        if let Some(data) = object.host_data() {
            let required = match object.kind() {
                MemKind::Buffer => object.size(),
                MemKind::Image(desc) => desc.host_size(),
            };
            ensure!(data.len() >= required, InvalidHostDataSnafu { required, actual: data.len() });
        }

        if let MemKind::Image(desc) = object.kind()
            && let Some(buffer) = desc.buffer
        {
            ensure!(state.mappings.contains_key(&buffer), NotMappedSnafu { object: buffer });
        }

        let ptr = Self::alloc_locked(&mut state, id, object.size())?;

        match (object.kind(), object.host_data()) {
            (MemKind::Buffer, Some(data)) => {
                // SAFETY: the fresh block holds `size` bytes and data is at least that long.
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), object.size()) }
            }
            (MemKind::Image(desc), Some(data)) => {
                let row = desc.row_bytes();
                for z in 0..desc.depth {
                    for y in 0..desc.height {
                        let src = z * desc.slice_pitch() + y * desc.row_pitch();
                        let dst = (z * desc.height + y) * row;
                        // SAFETY: src rows are bounded by host_size, dst rows by the image size.
                        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr().add(src), ptr.as_ptr().add(dst), row) }
                    }
                }
            }
            _ => {}
        }

        if let MemKind::Image(desc) = object.kind()
            && let Some(buffer) = desc.buffer
        {
            if let Some(source) = state.mappings.get(&buffer) {
                let len = source.size.min(object.size());
                // SAFETY: both regions hold at least `len` bytes and belong to distinct blocks.
                unsafe { std::ptr::copy_nonoverlapping(source.ptr.as_ptr(), ptr.as_ptr(), len) }
            }
            state.attachments.entry(buffer).or_default().push(id);
        }

        Ok(ptr)
    }

    /// Release `object`'s mapping. Unknown objects are ignored.
    ///
    /// Sub-objects of `object` alias its storage and are released with it.
    pub fn free(&self, object: MemObjectId) {
        let mut state = self.state.lock();
        Self::release_locked(&mut state, object);
    }

    fn release_locked(state: &mut State, object: MemObjectId) {
        let Some(mapping) = state.mappings.remove(&object) else {
            return;
        };

        if let Some(subs) = state.subs.remove(&object) {
            for sub in subs {
                Self::release_locked(state, sub);
            }
        }

        match mapping.storage {
            Storage::Owned(block) => {
                state.available += mapping.size;
                drop(block);
            }
            Storage::Sub { parent } => {
                if let Some(siblings) = state.subs.get_mut(&parent) {
                    siblings.retain(|sub| *sub != object);
                    if siblings.is_empty() {
                        state.subs.remove(&parent);
                    }
                }
            }
            Storage::Host => {}
        }

        state.attachments.remove(&object);
        state.attachments.retain(|_, images| {
            images.retain(|image| *image != object);
            !images.is_empty()
        });
        tracing::trace!(%object, available = state.available, "global mapping released");
    }

    pub fn address_of(&self, object: MemObjectId) -> Option<DevicePtr> {
        self.state.lock().mappings.get(&object).map(|mapping| mapping.ptr)
    }

    pub fn size_of(&self, object: MemObjectId) -> Option<usize> {
        self.state.lock().mappings.get(&object).map(|mapping| mapping.size)
    }

    pub fn is_mapped(&self, object: MemObjectId) -> bool {
        self.state.lock().mappings.contains_key(&object)
    }

    /// Images currently attached to `buffer`.
    pub fn attached_images(&self, buffer: MemObjectId) -> Vec<MemObjectId> {
        self.state.lock().attachments.get(&buffer).map(|images| images.to_vec()).unwrap_or_default()
    }

    /// Copy `dst.len()` bytes out of `object` starting at `offset`.
    pub fn read(&self, object: MemObjectId, offset: usize, dst: &mut [u8]) -> Result<()> {
        let state = self.state.lock();
        let src = state.range(object, offset, dst.len())?;
        // SAFETY: range checked against the mapping.
        unsafe { std::ptr::copy(src.as_ptr(), dst.as_mut_ptr(), dst.len()) }
        Ok(())
    }

    /// Copy `src` into `object` starting at `offset`.
    pub fn write(&self, object: MemObjectId, offset: usize, src: &[u8]) -> Result<()> {
        let state = self.state.lock();
        let dst = state.range(object, offset, src.len())?;
        // SAFETY: range checked against the mapping.
        unsafe { std::ptr::copy(src.as_ptr(), dst.as_ptr(), src.len()) }
        Ok(())
    }

    /// Copy `len` bytes between two mapped objects. Overlapping ranges are allowed.
    pub fn copy(&self, src: MemObjectId, src_offset: usize, dst: MemObjectId, dst_offset: usize, len: usize) -> Result<()> {
        let state = self.state.lock();
        let from = state.range(src, src_offset, len)?;
        let to = state.range(dst, dst_offset, len)?;
        // SAFETY: both ranges checked against their mappings.
        unsafe { std::ptr::copy(from.as_ptr(), to.as_ptr(), len) }
        Ok(())
    }

    /// Repeat `pattern` over `len` bytes of `object` starting at `offset`.
    ///
    /// `len` must be a multiple of the pattern length.
    pub fn fill(&self, object: MemObjectId, offset: usize, pattern: &[u8], len: usize) -> Result<()> {
        let state = self.state.lock();
        let dst = state.range(object, offset, len)?;
        if pattern.is_empty() {
            return Ok(());
        }
        ensure!(len % pattern.len() == 0, PatternMismatchSnafu { len, pattern: pattern.len() });
        for chunk in 0..len / pattern.len() {
            // SAFETY: chunk * pattern.len() + pattern.len() <= len, range checked above.
            unsafe {
                std::ptr::copy_nonoverlapping(pattern.as_ptr(), dst.as_ptr().add(chunk * pattern.len()), pattern.len())
            }
        }
        Ok(())
    }
}
