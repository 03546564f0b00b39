//! Inverted-file index (C5): vectors are partitioned by a coarse
//! k-means quantizer; each partition (cell) owns an independent sub-index
//! (Flat or PQ) plus a local-to-global identifier mapping. Search routes a
//! query to its single nearest cell (`nprobe = 1`; multi-probe is out of
//! scope per the Non-goals) and translates the cell's local results back
//! to global ids.

use std::io::{Read, Write};
use std::marker::PhantomData;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::code::CodeWidth;
use crate::error::{IndexError, Result};
use crate::index::{AnnIndex, Header, IndexTypeTag};
use crate::kmeans::KMeans;
use crate::pq::{PqIndex, PqOptions};

/// Training knobs for the coarse quantizer, plus pass-through options for
/// the sub-index when it is PQ. Defaults match spec.md §4.5.
#[derive(Debug, Clone, Copy)]
pub struct IvfOptions {
    pub max_iterations: usize,
    pub tolerance: f32,
    pub pq_options: PqOptions,
}

impl Default for IvfOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-4,
            pq_options: PqOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct IvfConfig {
    max_iterations: usize,
    tolerance: f32,
}

/// The per-partition sub-index: either Flat or PQ, sharing the sub-PQ code
/// width `T2` when it is PQ.
enum SubIndex<T2: CodeWidth> {
    Flat(crate::flat::FlatIndex),
    Pq(PqIndex<T2>),
}

impl<T2: CodeWidth> SubIndex<T2> {
    fn inner(&self) -> &dyn AnnIndex {
        match self {
            SubIndex::Flat(f) => f,
            SubIndex::Pq(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AnnIndex {
        match self {
            SubIndex::Flat(f) => f,
            SubIndex::Pq(p) => p,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IvfState<T1: CodeWidth> {
    num_features: usize,
    num_clusters: T1,
    is_trained: bool,
    should_train_indexes: bool,
    config: IvfConfig,
    /// `mapping[c]` holds the ascending global ids stored in partition `c`.
    mapping: Vec<Vec<u64>>,
}

/// Inverted-file index. `T1` sizes the coarse cluster count in the
/// persisted header; `T2` sizes the sub-PQ cluster count when the
/// sub-index is PQ (unused, but still a real type parameter, when it is
/// Flat).
pub struct IvfIndex<T1: CodeWidth, T2: CodeWidth> {
    state: IvfState<T1>,
    coarse: KMeans,
    sub_indexes: Vec<SubIndex<T2>>,
    _coarse_width: PhantomData<T1>,
}

impl<T1: CodeWidth, T2: CodeWidth> IvfIndex<T1, T2> {
    fn new_inner(
        num_features: usize,
        num_clusters: usize,
        should_train_indexes: bool,
        pq_num_subspaces: usize,
        pq_num_clusters: usize,
        ivf_opts: IvfOptions,
    ) -> Result<Self> {
        if num_features == 0 {
            return Err(IndexError::InvalidNumFeatures);
        }
        if num_clusters == 0 || num_clusters as u64 > T1::CLUSTER_BOUND as u64 {
            return Err(IndexError::InvalidNumClusters);
        }

        let coarse = KMeans::new(num_clusters, num_features)?;

        let mut sub_indexes = Vec::with_capacity(num_clusters);
        for _ in 0..num_clusters {
            let sub = if should_train_indexes {
                SubIndex::Pq(PqIndex::<T2>::new(
                    num_features,
                    pq_num_subspaces,
                    pq_num_clusters,
                    ivf_opts.pq_options,
                )?)
            } else {
                SubIndex::Flat(crate::flat::FlatIndex::new(num_features)?)
            };
            sub_indexes.push(sub);
        }

        Ok(Self {
            state: IvfState {
                num_features,
                num_clusters: T1::from_usize(num_clusters),
                is_trained: false,
                should_train_indexes,
                config: IvfConfig {
                    max_iterations: ivf_opts.max_iterations,
                    tolerance: ivf_opts.tolerance,
                },
                mapping: vec![Vec::new(); num_clusters],
            },
            coarse,
            sub_indexes,
            _coarse_width: PhantomData,
        })
    }

    /// Builds an IVF index whose sub-index is Flat.
    pub fn new_flat(num_features: usize, num_clusters: usize, opts: IvfOptions) -> Result<Self> {
        Self::new_inner(num_features, num_clusters, false, 0, 0, opts)
    }

    /// Builds an IVF index whose sub-index is PQ.
    pub fn new_pq(
        num_features: usize,
        num_clusters: usize,
        pq_num_subspaces: usize,
        pq_num_clusters: usize,
        opts: IvfOptions,
    ) -> Result<Self> {
        Self::new_inner(num_features, num_clusters, true, pq_num_subspaces, pq_num_clusters, opts)
    }

    pub fn load_body(reader: &mut dyn Read) -> Result<Self> {
        let state: IvfState<T1> = bincode::deserialize_from(&mut *reader)?;
        let coarse: KMeans = bincode::deserialize_from(&mut *reader)?;

        let num_clusters = state.num_clusters.to_usize();
        let mut sub_indexes = Vec::with_capacity(num_clusters);
        for _ in 0..num_clusters {
            if state.should_train_indexes {
                sub_indexes.push(SubIndex::Pq(PqIndex::<T2>::load_body(reader)?));
            } else {
                sub_indexes.push(SubIndex::Flat(crate::flat::FlatIndex::load_body(reader)?));
            }
        }

        Ok(Self {
            state,
            coarse,
            sub_indexes,
            _coarse_width: PhantomData,
        })
    }
}

impl<T1: CodeWidth, T2: CodeWidth> AnnIndex for IvfIndex<T1, T2> {
    fn num_features(&self) -> usize {
        self.state.num_features
    }

    fn is_trained(&self) -> bool {
        self.state.is_trained
    }

    fn num_vectors(&self) -> usize {
        self.sub_indexes.iter().map(|s| s.inner().num_vectors()).sum()
    }

    fn train(&mut self, data: &[f32]) -> Result<()> {
        if data.is_empty() {
            return Err(IndexError::EmptyData);
        }
        if data.len() % self.state.num_features != 0 {
            return Err(IndexError::InvalidDataLength);
        }

        self.coarse
            .train(data, self.state.config.max_iterations, self.state.config.tolerance)?;

        let num_features = self.state.num_features;
        let num_vectors = data.len() / num_features;
        let num_clusters = self.state.num_clusters.to_usize();

        let mut assignment = vec![0usize; num_vectors];
        self.coarse.predict(data, |row, cluster, _dist| {
            assignment[row] = cluster;
        })?;

        if !self.state.should_train_indexes {
            self.state.is_trained = true;
            tracing::info!(num_clusters, "ivf-flat training done (no sub-training needed)");
            return Ok(());
        }

        tracing::info!(num_clusters, num_vectors, "ivf+pq sub-training start");

        let mut gathered = vec![Vec::new(); num_clusters];
        for (row, &cluster) in assignment.iter().enumerate() {
            gathered[cluster].extend_from_slice(&data[row * num_features..(row + 1) * num_features]);
        }

        let first_error: Mutex<Option<IndexError>> = Mutex::new(None);
        self.sub_indexes
            .par_iter_mut()
            .zip(gathered.par_iter())
            .for_each(|(sub, rows)| {
                if rows.is_empty() {
                    // An empty partition has nothing to train on. A query
                    // can still route here by nearest centroid; `search`
                    // treats a zero-vector sub-index as an empty result
                    // rather than calling into an untrained PQ index.
                    return;
                }
                if let SubIndex::Pq(pq) = sub {
                    if let Err(e) = pq.train(rows) {
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                }
            });

        if let Some(e) = first_error.into_inner() {
            // Partial sub-training failure: leave the index untrained, as
            // spec.md §4.4 requires.
            return Err(e);
        }

        self.state.is_trained = true;
        tracing::info!("ivf+pq sub-training done");
        Ok(())
    }

    fn add(&mut self, data: &[f32]) -> Result<()> {
        if data.is_empty() {
            return Err(IndexError::EmptyData);
        }
        if data.len() % self.state.num_features != 0 {
            return Err(IndexError::InvalidDataLength);
        }
        if !self.state.is_trained {
            return Err(IndexError::NotTrained);
        }

        let num_features = self.state.num_features;
        let num_vectors = data.len() / num_features;
        let mut next_id = self.num_vectors() as u64;

        let mut assignment = vec![0usize; num_vectors];
        self.coarse.predict(data, |row, cluster, _dist| {
            assignment[row] = cluster;
        })?;

        // Sequential on purpose: global ids must increase strictly with
        // input row order within this call (spec.md §5).
        for row in 0..num_vectors {
            let cluster = assignment[row];
            let row_data = &data[row * num_features..(row + 1) * num_features];
            self.sub_indexes[cluster].inner_mut().add(row_data)?;
            self.state.mapping[cluster].push(next_id);
            next_id += 1;
        }

        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<(Vec<Vec<u64>>, Vec<Vec<f32>>)> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        if query.is_empty() {
            return Err(IndexError::EmptyData);
        }
        let d = self.state.num_features;
        if query.len() % d != 0 {
            return Err(IndexError::InvalidDataLength);
        }
        if !self.state.is_trained {
            return Err(IndexError::NotTrained);
        }

        let num_queries = query.len() / d;
        let mut partitions = vec![0usize; num_queries];
        self.coarse.predict(query, |row, cluster, _dist| {
            partitions[row] = cluster;
        })?;

        let mut ids = Vec::with_capacity(num_queries);
        let mut dists = Vec::with_capacity(num_queries);
        for q in 0..num_queries {
            let cluster = partitions[q];
            let row_query = &query[q * d..(q + 1) * d];

            // A partition that never received a training vector has an
            // untrained PQ sub-index (see `train`'s empty-partition skip);
            // a query can still route here by nearest centroid, so treat it
            // as holding zero vectors rather than propagating `NotTrained`.
            if self.sub_indexes[cluster].inner().num_vectors() == 0 {
                ids.push(Vec::new());
                dists.push(Vec::new());
                continue;
            }

            let (local_ids, local_dists) = self.sub_indexes[cluster].inner().search(row_query, k)?;
            let global_ids: Vec<u64> = local_ids[0]
                .iter()
                .map(|&local| self.state.mapping[cluster][local as usize])
                .collect();
            ids.push(global_ids);
            dists.push(local_dists[0].clone());
        }

        Ok((ids, dists))
    }

    fn header(&self) -> Header {
        Header {
            index_type: IndexTypeTag::Ivf,
            code_type1: T1::tag(),
            code_type2: if self.state.should_train_indexes {
                T2::tag()
            } else {
                crate::code::CodeTypeTag::None
            },
        }
    }

    fn save_body(&self, writer: &mut dyn Write) -> Result<()> {
        bincode::serialize_into(&mut *writer, &self.state)?;
        bincode::serialize_into(&mut *writer, &self.coarse)?;
        for sub in &self.sub_indexes {
            sub.inner().save_body(writer)?;
        }
        Ok(())
    }
}
