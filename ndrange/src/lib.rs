//! NDRange index spaces for the clcpu execution core.
//!
//! A kernel dispatch describes its index space as a global size, a work-group
//! (local) size and a global offset in one to three dimensions. This crate turns
//! that description into a [`DimensionIndex`] and walks it with [`IndexIter`],
//! a mixed-radix cursor over `(local_id, group_id)` pairs.
//!
//! # Iteration order
//!
//! Work-items are visited group by group. Inside a group the local id advances
//! fastest in dimension 0, then 1, then 2; once the local id wraps, the group id
//! advances in the same little-endian order. One step past the last work-item the
//! cursor lands on the end sentinel (`group_id[0] == groups[0]`, everything else
//! zero).
//!
//! ```
//! use clcpu_ndrange::DimensionIndex;
//!
//! let index = DimensionIndex::new(&[8], &[4], &[0]).unwrap();
//! let mut cursor = index.begin();
//! cursor.advance(5);
//! assert_eq!(cursor.group_id(0), 1);
//! assert_eq!(cursor.local_id(0), 1);
//! assert_eq!(cursor.global_id(0), 5);
//! ```

pub mod error;
pub mod index;


pub use error::{Error, Result};
pub use index::{DimensionIndex, IndexIter, MAX_DIMS, WorkItemId};
