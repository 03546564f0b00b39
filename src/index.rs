//! The object-safe interface every concrete index type implements, plus the
//! self-describing header persistence dispatches on.
//!
//! This is the Rust realization of the Go reference's `ANNIndex` interface
//! (`examples/original_source/interface.go`): a small dispatch surface that
//! lets `builder` and `persistence` talk about "an index" without knowing
//! which of Flat/PQ/IVF — and without which of IVF's two `CodeWidth` type
//! parameters — they are holding.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::code::CodeTypeTag;
use crate::error::Result;

/// Which of the three index families a persisted stream holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexTypeTag {
    Flat,
    Pq,
    Ivf,
}

/// The self-describing header that precedes every persisted index body.
/// `code_type1` names the coarse/PQ code width; `code_type2` names the
/// IVF sub-PQ code width, or `None` when there is no second width (Flat,
/// bare PQ, or IVF-Flat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub index_type: IndexTypeTag,
    pub code_type1: CodeTypeTag,
    pub code_type2: CodeTypeTag,
}

/// Common operations over any of Flat, PQ, or IVF indices.
///
/// Search returns ids *and* distances for every query row, batched:
/// `ids[q]`/`distances[q]` are the `k` (or fewer) nearest neighbors of
/// query row `q`, ascending by distance.
pub trait AnnIndex: Send + Sync {
    fn num_features(&self) -> usize;
    fn is_trained(&self) -> bool;
    fn num_vectors(&self) -> usize;

    fn train(&mut self, data: &[f32]) -> Result<()>;
    fn add(&mut self, data: &[f32]) -> Result<()>;
    fn search(&self, query: &[f32], k: usize) -> Result<(Vec<Vec<u64>>, Vec<Vec<f32>>)>;

    /// The header this index should be persisted under.
    fn header(&self) -> Header;

    /// Writes this index's body (everything after the shared `Header`).
    fn save_body(&self, writer: &mut dyn Write) -> Result<()>;
}
