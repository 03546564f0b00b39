//! Construction entry point (C6): picks concrete code widths via
//! [`crate::code::pick_width`] and returns the result boxed behind
//! [`AnnIndex`], so callers never have to name the monomorphized type.
//!
//! This is the Rust answer to the Go reference's `NewIndex` switch over
//! sixteen concrete `(indexType, CodeType1, CodeType2)` combinations
//! (`examples/original_source/builder.go`): the combinatorics are the same,
//! but they live in one function instead of sixteen generated constructors.

use crate::code::{pick_width, Width};
use crate::error::{IndexError, Result};
use crate::flat::FlatIndex;
use crate::index::AnnIndex;
use crate::ivf::{IvfIndex, IvfOptions};
use crate::pq::{PqIndex, PqOptions};

/// Which index family, and with what training knobs, [`new_index`] builds.
pub enum Flavor {
    Flat,
    Pq {
        num_subspaces: usize,
        num_clusters: usize,
        options: PqOptions,
    },
    IvfFlat {
        num_clusters: usize,
        options: IvfOptions,
    },
    IvfPq {
        num_clusters: usize,
        pq_num_subspaces: usize,
        pq_num_clusters: usize,
        options: IvfOptions,
    },
}

/// Builds an index over `num_features`-dimensional vectors per `flavor`,
/// picking the narrowest code width(s) each cluster count needs.
pub fn new_index(num_features: usize, flavor: Flavor) -> Result<Box<dyn AnnIndex>> {
    match flavor {
        Flavor::Flat => Ok(Box::new(FlatIndex::new(num_features)?)),

        Flavor::Pq {
            num_subspaces,
            num_clusters,
            options,
        } => match pick_width(num_clusters)? {
            Width::U8 => Ok(Box::new(PqIndex::<u8>::new(num_features, num_subspaces, num_clusters, options)?)),
            Width::U16 => Ok(Box::new(PqIndex::<u16>::new(num_features, num_subspaces, num_clusters, options)?)),
            Width::U32 => Ok(Box::new(PqIndex::<u32>::new(num_features, num_subspaces, num_clusters, options)?)),
        },

        Flavor::IvfFlat { num_clusters, options } => match pick_width(num_clusters)? {
            Width::U8 => Ok(Box::new(IvfIndex::<u8, u8>::new_flat(num_features, num_clusters, options)?)),
            Width::U16 => Ok(Box::new(IvfIndex::<u16, u8>::new_flat(num_features, num_clusters, options)?)),
            Width::U32 => Ok(Box::new(IvfIndex::<u32, u8>::new_flat(num_features, num_clusters, options)?)),
        },

        Flavor::IvfPq {
            num_clusters,
            pq_num_subspaces,
            pq_num_clusters,
            options,
        } => {
            let coarse_width = pick_width(num_clusters)?;
            let sub_width = pick_width(pq_num_clusters)?;
            match (coarse_width, sub_width) {
                (Width::U8, Width::U8) => Ok(Box::new(IvfIndex::<u8, u8>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
                (Width::U8, Width::U16) => Ok(Box::new(IvfIndex::<u8, u16>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
                (Width::U8, Width::U32) => Ok(Box::new(IvfIndex::<u8, u32>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
                (Width::U16, Width::U8) => Ok(Box::new(IvfIndex::<u16, u8>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
                (Width::U16, Width::U16) => Ok(Box::new(IvfIndex::<u16, u16>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
                (Width::U16, Width::U32) => Ok(Box::new(IvfIndex::<u16, u32>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
                (Width::U32, Width::U8) => Ok(Box::new(IvfIndex::<u32, u8>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
                (Width::U32, Width::U16) => Ok(Box::new(IvfIndex::<u32, u16>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
                (Width::U32, Width::U32) => Ok(Box::new(IvfIndex::<u32, u32>::new_pq(
                    num_features,
                    num_clusters,
                    pq_num_subspaces,
                    pq_num_clusters,
                    options,
                )?)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_flavor_builds_a_usable_index() {
        let mut idx = new_index(2, Flavor::Flat).unwrap();
        idx.train(&[]).unwrap();
        idx.add(&[0.0, 0.0, 1.0, 1.0]).unwrap();
        let (ids, _) = idx.search(&[0.0, 0.0], 1).unwrap();
        assert_eq!(ids[0][0], 0);
    }

    #[test]
    fn pq_flavor_picks_u8_width_for_small_cluster_counts() {
        let mut idx = new_index(
            4,
            Flavor::Pq {
                num_subspaces: 2,
                num_clusters: 2,
                options: PqOptions::default(),
            },
        )
        .unwrap();
        let data = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        idx.train(&data).unwrap();
        idx.add(&data).unwrap();
        assert_eq!(idx.num_vectors(), 2);
    }

    #[test]
    fn ivf_flat_flavor_builds_and_round_trips_vectors() {
        let data = vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
        let mut idx = new_index(
            2,
            Flavor::IvfFlat {
                num_clusters: 2,
                options: IvfOptions::default(),
            },
        )
        .unwrap();
        idx.train(&data).unwrap();
        idx.add(&data).unwrap();
        assert_eq!(idx.num_vectors(), 4);
    }

    #[test]
    fn ivf_pq_flavor_builds_with_mixed_widths() {
        let data = vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
        let mut idx = new_index(
            2,
            Flavor::IvfPq {
                num_clusters: 2,
                pq_num_subspaces: 1,
                pq_num_clusters: 2,
                options: IvfOptions::default(),
            },
        )
        .unwrap();
        idx.train(&data).unwrap();
        idx.add(&data).unwrap();
        assert_eq!(idx.num_vectors(), 4);
    }

    #[test]
    fn zero_clusters_is_rejected_before_any_allocation() {
        let err = new_index(
            2,
            Flavor::Pq {
                num_subspaces: 1,
                num_clusters: 0,
                options: PqOptions::default(),
            },
        );
        assert!(matches!(err, Err(IndexError::InvalidNumClusters)));
    }
}
