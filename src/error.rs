//! Typed error taxonomy for every fallible operation in the crate.
//!
//! The shape follows the named errors in the specification this crate
//! implements: a flat set of sentinel conditions rather than a type per
//! component. `thiserror` gives each variant a `Display` impl whose message
//! is what crosses the FFI boundary verbatim (see `ffi`).

use thiserror::Error;

/// Every way a call into `annix` can fail.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("data is empty")]
    EmptyData,

    #[error("data length must be divisible by the number of features")]
    InvalidDataLength,

    #[error("number of features must be greater than 0")]
    InvalidNumFeatures,

    #[error("k must be greater than 0")]
    InvalidK,

    #[error("number of clusters must be greater than 0 and at most {}", u32::MAX)]
    InvalidNumClusters,

    #[error("number of subspaces must divide the number of features evenly and be greater than 0")]
    InvalidNumSubspaces,

    #[error("number of iterations must be greater than 0")]
    InvalidNumIterations,

    #[error("tolerance must be greater than 0")]
    InvalidTolerance,

    #[error("index is not trained")]
    NotTrained,

    #[error("pq options can only be used with a PQ sub-index")]
    InvalidPQOptions,

    #[error("unknown wire tag: {0}")]
    UnknownTag(String),

    #[error("unknown index handle")]
    UnknownHandle,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
