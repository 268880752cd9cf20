//! Memory object descriptions as handed down by the device layer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::allocator::DevicePtr;

/// Process-unique identity of a memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemObjectId(u64);

impl MemObjectId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem#{}", self.0)
    }
}

/// Where the storage of a memory object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFlavor {
    /// Backed by caller-owned host storage; mapping returns `host_ptr` as is.
    HostOwned { host_ptr: DevicePtr },
    /// Runtime-owned storage the host may map.
    HostAccessible,
    /// Runtime-owned storage only kernels touch.
    DevicePrivate,
}

/// Byte range of a parent object aliased by a sub-object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRegion {
    pub parent: MemObjectId,
    pub offset: usize,
}

/// Image geometry.
///
/// Host pitches of zero mean "tightly packed". `buffer` is set for 1-D images
/// created over an existing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub element_size: usize,
    pub host_row_pitch: usize,
    pub host_slice_pitch: usize,
    pub buffer: Option<MemObjectId>,
}

impl ImageDesc {
    pub fn new(width: usize, height: usize, depth: usize, element_size: usize) -> Self {
        Self {
            width,
            height: height.max(1),
            depth: depth.max(1),
            element_size,
            host_row_pitch: 0,
            host_slice_pitch: 0,
            buffer: None,
        }
    }

    /// Natural row width on the device side.
    pub fn row_bytes(&self) -> usize {
        self.width * self.element_size
    }

    pub fn row_pitch(&self) -> usize {
        if self.host_row_pitch == 0 { self.row_bytes() } else { self.host_row_pitch }
    }

    pub fn slice_pitch(&self) -> usize {
        if self.host_slice_pitch == 0 { self.row_pitch() * self.height } else { self.host_slice_pitch }
    }

    /// Device-side size in bytes.
    pub fn size(&self) -> usize {
        self.row_bytes() * self.height * self.depth
    }

    /// Bytes of host data a row-by-row upload reads.
    pub fn host_size(&self) -> usize {
        if self.size() == 0 {
            return 0;
        }
        (self.depth - 1) * self.slice_pitch() + (self.height - 1) * self.row_pitch() + self.row_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemKind {
    Buffer,
    Image(ImageDesc),
}

/// A buffer or image as seen by [`GlobalMemory`](crate::GlobalMemory).
#[derive(Debug, Clone)]
pub struct MemoryObject {
    id: MemObjectId,
    size: usize,
    flavor: MemFlavor,
    kind: MemKind,
    parent: Option<SubRegion>,
    host_data: Option<Vec<u8>>,
}

impl MemoryObject {
    /// Device-private buffer of `size` bytes.
    pub fn buffer(size: usize) -> Self {
        Self { id: MemObjectId::next(), size, flavor: MemFlavor::DevicePrivate, kind: MemKind::Buffer, parent: None, host_data: None }
    }

    /// Buffer backed by host storage at `host_ptr`.
    ///
    /// The caller keeps `size` bytes at `host_ptr` alive for as long as the
    /// object stays mapped.
    pub fn host_owned(host_ptr: DevicePtr, size: usize) -> Self {
        Self { flavor: MemFlavor::HostOwned { host_ptr }, ..Self::buffer(size) }
    }

    pub fn image(desc: ImageDesc) -> Self {
        Self { kind: MemKind::Image(desc), ..Self::buffer(desc.size()) }
    }

    /// Sub-object aliasing `size` bytes of `parent` starting at `offset`.
    pub fn sub_object(parent: &MemoryObject, offset: usize, size: usize) -> Self {
        Self {
            id: MemObjectId::next(),
            size,
            flavor: parent.flavor,
            kind: parent.kind.clone(),
            parent: Some(SubRegion { parent: parent.id, offset }),
            host_data: None,
        }
    }

    pub fn with_flavor(mut self, flavor: MemFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Initial contents copied in when the object is mapped.
    pub fn with_host_data(mut self, data: Vec<u8>) -> Self {
        self.host_data = Some(data);
        self
    }

    pub fn id(&self) -> MemObjectId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn flavor(&self) -> MemFlavor {
        self.flavor
    }

    pub fn kind(&self) -> &MemKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<SubRegion> {
        self.parent
    }

    pub fn host_data(&self) -> Option<&[u8]> {
        self.host_data.as_deref()
    }

    pub fn is_sub_object(&self) -> bool {
        self.parent.is_some()
    }
}
