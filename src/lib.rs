//! # annix — approximate nearest neighbor vector indices
//!
//! Three index families over squared Euclidean distance, picked through one
//! builder entry point and dispatched behind a single object-safe trait:
//!
//! - **Flat** ([`flat::FlatIndex`]): exhaustive brute-force search. No
//!   training phase; exact results.
//! - **PQ** ([`pq::PqIndex`]): vectors split into subspaces, each encoded
//!   against its own learned codebook; search compares a raw query to
//!   stored codes via asymmetric distance computation.
//! - **IVF** ([`ivf::IvfIndex`]): vectors routed to one of several coarse
//!   k-means partitions, each of which owns an independent Flat or PQ
//!   sub-index.
//!
//! [`builder::new_index`] is the entry point: it picks the narrowest code
//! width(s) each index needs and returns the result behind
//! [`index::AnnIndex`], so callers never name the monomorphized type.
//! [`persistence::save`]/[`persistence::load`] round-trip any of the three
//! through a self-describing header. [`ffi`] exposes the same operations
//! over a C ABI for non-Rust hosts.

// mimalloc replaces the system allocator globally: per-thread heaps with
// size-segregated free lists keep the small, frequent allocations in the
// k-means and PQ training loops close to O(1) and contention-free. Declared
// at the crate root so it covers every allocation in this process, including
// ones made inside parking_lot and rayon.
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod builder;
pub mod code;
pub mod error;
pub mod ffi;
pub mod flat;
pub mod index;
pub mod ivf;
pub mod kmeans;
pub mod persistence;
pub mod pq;
pub mod topk;

pub use builder::{new_index, Flavor};
pub use error::{IndexError, Result};
pub use index::AnnIndex;
pub use ivf::IvfOptions;
pub use persistence::{load, save};
pub use pq::PqOptions;
