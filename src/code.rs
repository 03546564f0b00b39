//! The `CodeWidth` trait stands in for the generic constraint the Go
//! reference expresses as `CodeType interface { ~uint8 | ~uint16 | ~uint32 }`.
//!
//! PQ and IVF indices are generic over one or two of these widths so that a
//! codebook of, say, 40 clusters costs one byte per code instead of four.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// An unsigned integer narrow enough to hold a cluster index, and wide
/// enough to be the chosen code width for a quantizer.
pub trait CodeWidth:
    Copy + Clone + Debug + Eq + Ord + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Upper bound (exclusive) on the cluster count this width can address.
    const CLUSTER_BOUND: u32;

    fn from_usize(v: usize) -> Self;
    fn to_usize(self) -> usize;

    /// The tag this width is serialized under in a persisted `Header`.
    fn tag() -> CodeTypeTag;
}

impl CodeWidth for u8 {
    const CLUSTER_BOUND: u32 = 256;

    fn from_usize(v: usize) -> Self {
        v as u8
    }
    fn to_usize(self) -> usize {
        self as usize
    }
    fn tag() -> CodeTypeTag {
        CodeTypeTag::U8
    }
}

impl CodeWidth for u16 {
    const CLUSTER_BOUND: u32 = 65_536;

    fn from_usize(v: usize) -> Self {
        v as u16
    }
    fn to_usize(self) -> usize {
        self as usize
    }
    fn tag() -> CodeTypeTag {
        CodeTypeTag::U16
    }
}

impl CodeWidth for u32 {
    const CLUSTER_BOUND: u32 = u32::MAX;

    fn from_usize(v: usize) -> Self {
        v as u32
    }
    fn to_usize(self) -> usize {
        self as usize
    }
    fn tag() -> CodeTypeTag {
        CodeTypeTag::U32
    }
}

/// Which unsigned width (if any) a wire-format body uses for its codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CodeTypeTag {
    None,
    U8,
    U16,
    U32,
}

/// Picks the narrowest width that can address `num_clusters` distinct
/// cluster indices: `u8` for `< 256`, `u16` for `< 65_536`, `u32` otherwise.
///
/// Matches invariant 4 of the data model: the builder is the single place
/// this decision is made, so every quantizer constructed through it already
/// satisfies "code width wide enough to hold any centroid index".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
}

pub fn pick_width(num_clusters: usize) -> crate::error::Result<Width> {
    use crate::error::IndexError;

    if num_clusters == 0 || num_clusters as u64 > u32::MAX as u64 {
        return Err(IndexError::InvalidNumClusters);
    }
    Ok(if num_clusters < 256 {
        Width::U8
    } else if num_clusters < 65_536 {
        Width::U16
    } else {
        Width::U32
    })
}
