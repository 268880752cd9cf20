use snafu::ensure;

use crate::error::{InvalidDimsSnafu, LengthMismatchSnafu, NotDivisibleSnafu, Result, ZeroSizeSnafu};

/// Maximum NDRange dimensionality.
pub const MAX_DIMS: usize = 3;

/// Immutable description of an NDRange dispatch.
///
/// Unused dimensions are padded with a global/local size of one and a zero
/// offset so that products over all three dimensions stay meaningful, but every
/// per-dimension query beyond [`dims`](Self::dims) answers zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionIndex {
    dims: usize,
    global: [usize; MAX_DIMS],
    local: [usize; MAX_DIMS],
    offset: [usize; MAX_DIMS],
    groups: [usize; MAX_DIMS],
}

impl DimensionIndex {
    /// Build an index space from per-dimension global size, local size and offset.
    ///
    /// All three slices must have the same length (1 to 3), every size must be
    /// non-zero and each global size must be a multiple of its local size.
    pub fn new(global: &[usize], local: &[usize], offset: &[usize]) -> Result<Self> {
        let dims = global.len();
        ensure!((1..=MAX_DIMS).contains(&dims), InvalidDimsSnafu { dims });
        ensure!(
            local.len() == dims && offset.len() == dims,
            LengthMismatchSnafu { dims, local: local.len(), offset: offset.len() }
        );

        let mut index = Self { dims, global: [1; MAX_DIMS], local: [1; MAX_DIMS], offset: [0; MAX_DIMS], groups: [1; MAX_DIMS] };
        for dim in 0..dims {
            ensure!(global[dim] > 0 && local[dim] > 0, ZeroSizeSnafu { dim });
            ensure!(
                global[dim] % local[dim] == 0,
                NotDivisibleSnafu { dim, global: global[dim], local: local[dim] }
            );
            index.global[dim] = global[dim];
            index.local[dim] = local[dim];
            index.offset[dim] = offset[dim];
            index.groups[dim] = global[dim] / local[dim];
        }
        Ok(index)
    }

    /// One-dimensional index space without offset.
    pub fn linear(global: usize, local: usize) -> Result<Self> {
        Self::new(&[global], &[local], &[0])
    }

    /// Index space of a task: a single work-item in a single group.
    pub const fn single() -> Self {
        Self { dims: 1, global: [1; MAX_DIMS], local: [1; MAX_DIMS], offset: [0; MAX_DIMS], groups: [1; MAX_DIMS] }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn global_size(&self, dim: usize) -> usize {
        if dim < self.dims { self.global[dim] } else { 0 }
    }

    pub fn local_size(&self, dim: usize) -> usize {
        if dim < self.dims { self.local[dim] } else { 0 }
    }

    pub fn global_offset(&self, dim: usize) -> usize {
        if dim < self.dims { self.offset[dim] } else { 0 }
    }

    pub fn num_groups(&self, dim: usize) -> usize {
        if dim < self.dims { self.groups[dim] } else { 0 }
    }

    /// Number of work-items in every work-group.
    pub fn work_items_per_group(&self) -> usize {
        self.local.iter().product()
    }

    pub fn total_groups(&self) -> usize {
        self.groups.iter().product()
    }

    pub fn total_work_items(&self) -> usize {
        self.global.iter().product()
    }

    /// Cursor on the first work-item of the first group.
    pub fn begin(&self) -> IndexIter {
        IndexIter { index: *self, local_id: [0; MAX_DIMS], group_id: [0; MAX_DIMS] }
    }

    /// The end sentinel: one past the last work-item.
    pub fn end(&self) -> IndexIter {
        let mut group_id = [0; MAX_DIMS];
        group_id[0] = self.groups[0];
        IndexIter { index: *self, local_id: [0; MAX_DIMS], group_id }
    }

    /// Cursor on the first work-item of the group with little-endian linear id `linear`.
    ///
    /// Returns the end sentinel when `linear` is past the last group.
    pub fn group_start(&self, linear: usize) -> IndexIter {
        if linear >= self.total_groups() {
            return self.end();
        }

        let mut group_id = [0; MAX_DIMS];
        let mut rest = linear;
        for dim in 0..self.dims {
            group_id[dim] = rest % self.groups[dim];
            rest /= self.groups[dim];
        }
        IndexIter { index: *self, local_id: [0; MAX_DIMS], group_id }
    }
}

/// Identity of one work-item as produced by [`IndexIter`]'s `Iterator` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkItemId {
    pub local_id: [usize; MAX_DIMS],
    pub group_id: [usize; MAX_DIMS],
}

/// Mixed-radix cursor over the work-items of a [`DimensionIndex`].
///
/// The cursor carries its own copy of the index space, so a worker can keep it
/// as the "current index" of a running kernel without borrowing the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexIter {
    index: DimensionIndex,
    local_id: [usize; MAX_DIMS],
    group_id: [usize; MAX_DIMS],
}

impl IndexIter {
    /// Move forward by `n` work-items.
    ///
    /// Carries through the local dimensions first, then through the group
    /// dimensions. A carry out of the last group dimension lands on the end
    /// sentinel; advancing the sentinel leaves it in place.
    pub fn advance(&mut self, n: usize) {
        if n == 0 || self.is_end() {
            return;
        }

        let dims = self.index.dims;
        let mut carry = n;

        for dim in 0..dims {
            if carry == 0 {
                return;
            }
            let Some(value) = self.local_id[dim].checked_add(carry) else {
                *self = self.index.end();
                return;
            };
            self.local_id[dim] = value % self.index.local[dim];
            carry = value / self.index.local[dim];
        }

        for dim in 0..dims {
            if carry == 0 {
                return;
            }
            let Some(value) = self.group_id[dim].checked_add(carry) else {
                *self = self.index.end();
                return;
            };
            self.group_id[dim] = value % self.index.groups[dim];
            carry = value / self.index.groups[dim];
        }

        if carry > 0 {
            *self = self.index.end();
        }
    }

    /// Copy of this cursor moved forward by `n` work-items.
    pub fn advanced(mut self, n: usize) -> Self {
        self.advance(n);
        self
    }

    pub fn is_end(&self) -> bool {
        self.group_id[0] == self.index.groups[0]
    }

    /// True on the first work-item of a group (all local ids zero).
    pub fn is_group_start(&self) -> bool {
        self.local_id.iter().all(|&id| id == 0)
    }

    pub fn index(&self) -> &DimensionIndex {
        &self.index
    }

    pub fn dims(&self) -> usize {
        self.index.dims
    }

    pub fn local_id(&self, dim: usize) -> usize {
        if dim < self.index.dims { self.local_id[dim] } else { 0 }
    }

    pub fn group_id(&self, dim: usize) -> usize {
        if dim < self.index.dims { self.group_id[dim] } else { 0 }
    }

    pub fn global_id(&self, dim: usize) -> usize {
        if dim < self.index.dims {
            self.group_id[dim] * self.index.local[dim] + self.local_id[dim] + self.index.offset[dim]
        } else {
            0
        }
    }

    pub fn local_ids(&self) -> &[usize] {
        &self.local_id[..self.index.dims]
    }

    pub fn group_ids(&self) -> &[usize] {
        &self.group_id[..self.index.dims]
    }

    /// Little-endian linear id of the work-item inside its group.
    pub fn local_linear(&self) -> usize {
        linearize(&self.local_id, &self.index.local)
    }

    /// Little-endian mixed-radix linear id of the current group.
    pub fn group_linear(&self) -> usize {
        linearize(&self.group_id, &self.index.groups)
    }

    /// Number of work-items visited before this one.
    pub fn position(&self) -> usize {
        if self.is_end() {
            return self.index.total_work_items();
        }
        self.group_linear() * self.index.work_items_per_group() + self.local_linear()
    }
}

fn linearize(ids: &[usize; MAX_DIMS], radix: &[usize; MAX_DIMS]) -> usize {
    ids.iter().zip(radix).rev().fold(0, |acc, (&id, &size)| acc * size + id)
}

impl Iterator for IndexIter {
    type Item = WorkItemId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_end() {
            return None;
        }
        let current = WorkItemId { local_id: self.local_id, group_id: self.group_id };
        self.advance(1);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.index.total_work_items() - self.position();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for IndexIter {}
