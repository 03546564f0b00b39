//! Product-quantization index (C4): vectors are split into `M` equal
//! subspaces, each encoded against its own learned codebook, and search
//! compares a raw query to the stored codes via asymmetric distance
//! computation (ADC) — a per-query lookup table rather than decoding codes
//! back to floats.

use std::io::{Read, Write};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::code::CodeWidth;
use crate::error::{IndexError, Result};
use crate::index::{AnnIndex, Header, IndexTypeTag};
use crate::kmeans::KMeans;
use crate::topk::SmallestK;

const SEARCH_CHUNK: usize = 512;

/// Training/encoding knobs for each subspace's k-means. Defaults match
/// spec.md §4.5's option table.
#[derive(Debug, Clone, Copy)]
pub struct PqOptions {
    pub max_iterations: usize,
    pub tolerance: f32,
}

impl Default for PqOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PqConfig {
    max_iterations: usize,
    tolerance: f32,
}

/// Everything about a `PqIndex` except the per-subspace k-means models,
/// which are kept alongside for wire-format fidelity (see module docs on
/// `persistence`).
#[derive(Serialize, Deserialize)]
struct PqState<T: CodeWidth> {
    num_features: usize,
    num_subspaces: usize,
    num_sub_features: usize,
    is_trained: bool,
    num_vectors: usize,
    config: PqConfig,
    num_clusters: T,
    /// `[m][c]` -> centroid, each of length `num_sub_features`.
    codebooks: Vec<Vec<Vec<f32>>>,
    /// Vector-major: `codes[n * num_subspaces + m]`.
    codes: Vec<T>,
}

/// Product-quantized index. `T` is the narrowest unsigned width that can
/// address `num_clusters` codebook entries.
pub struct PqIndex<T: CodeWidth> {
    state: PqState<T>,
    /// One k-means model per subspace, trained on that subspace's column
    /// slab. Holds the same centroids as `state.codebooks[m]`.
    subspace_models: Vec<KMeans>,
}

impl<T: CodeWidth> PqIndex<T> {
    pub fn new(num_features: usize, num_subspaces: usize, num_clusters: usize, opts: PqOptions) -> Result<Self> {
        if num_features == 0 {
            return Err(IndexError::InvalidNumFeatures);
        }
        if num_subspaces == 0 || num_subspaces > num_features || num_features % num_subspaces != 0 {
            return Err(IndexError::InvalidNumSubspaces);
        }
        if num_clusters == 0 || num_clusters as u64 > T::CLUSTER_BOUND as u64 {
            return Err(IndexError::InvalidNumClusters);
        }

        let num_sub_features = num_features / num_subspaces;
        Ok(Self {
            state: PqState {
                num_features,
                num_subspaces,
                num_sub_features,
                is_trained: false,
                num_vectors: 0,
                config: PqConfig {
                    max_iterations: opts.max_iterations,
                    tolerance: opts.tolerance,
                },
                num_clusters: T::from_usize(num_clusters),
                codebooks: vec![Vec::new(); num_subspaces],
                codes: Vec::new(),
            },
            subspace_models: Vec::new(),
        })
    }

    fn extract_subspace(data: &[f32], num_features: usize, num_vectors: usize, m: usize, sub_d: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; num_vectors * sub_d];
        for v in 0..num_vectors {
            let start = v * num_features + m * sub_d;
            out[v * sub_d..(v + 1) * sub_d].copy_from_slice(&data[start..start + sub_d]);
        }
        out
    }

    pub fn load_body(reader: &mut dyn Read) -> Result<Self> {
        let state: PqState<T> = bincode::deserialize_from(&mut *reader)?;
        let mut subspace_models = Vec::with_capacity(state.num_subspaces);
        for _ in 0..state.num_subspaces {
            subspace_models.push(bincode::deserialize_from(&mut *reader)?);
        }
        Ok(Self { state, subspace_models })
    }
}

impl<T: CodeWidth> AnnIndex for PqIndex<T> {
    fn num_features(&self) -> usize {
        self.state.num_features
    }

    fn is_trained(&self) -> bool {
        self.state.is_trained
    }

    fn num_vectors(&self) -> usize {
        self.state.num_vectors
    }

    fn train(&mut self, data: &[f32]) -> Result<()> {
        if data.is_empty() {
            return Err(IndexError::EmptyData);
        }
        if data.len() % self.state.num_features != 0 {
            return Err(IndexError::InvalidDataLength);
        }

        let num_vectors = data.len() / self.state.num_features;
        let num_clusters = self.state.num_clusters.to_usize();
        let num_subspaces = self.state.num_subspaces;
        let sub_d = self.state.num_sub_features;
        let num_features = self.state.num_features;
        let max_iterations = self.state.config.max_iterations;
        let tolerance = self.state.config.tolerance;

        tracing::info!(num_subspaces, num_clusters, num_vectors, "pq training start");

        // Each subspace's k-means runs independently against disjoint
        // column slabs; results land in disjoint `Vec` slots so no lock is
        // needed across the fan-out.
        let trained: Vec<Result<(KMeans, Vec<Vec<f32>>)>> = (0..num_subspaces)
            .into_par_iter()
            .map(|m| {
                let sub_data = Self::extract_subspace(data, num_features, num_vectors, m, sub_d);
                let mut km = KMeans::new(num_clusters, sub_d)?;
                km.train(&sub_data, max_iterations, tolerance)?;
                let centroids: Vec<Vec<f32>> = km
                    .centroids()
                    .chunks(sub_d)
                    .map(|c| c.to_vec())
                    .collect();
                Ok((km, centroids))
            })
            .collect();

        let mut subspace_models = Vec::with_capacity(num_subspaces);
        let mut codebooks = Vec::with_capacity(num_subspaces);
        for r in trained {
            let (km, centroids) = r?;
            subspace_models.push(km);
            codebooks.push(centroids);
        }

        self.subspace_models = subspace_models;
        self.state.codebooks = codebooks;
        self.state.is_trained = true;

        tracing::info!(num_subspaces, "pq training done");
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

        let num_vectors = data.len() / self.state.num_features;
        let old_num_vectors = self.state.num_vectors;
        let num_subspaces = self.state.num_subspaces;
        let sub_d = self.state.num_sub_features;
        let num_features = self.state.num_features;

        self.state
            .codes
            .resize((old_num_vectors + num_vectors) * num_subspaces, T::from_usize(0));

        let codes_slot: Vec<(usize, T)> = (0..num_subspaces)
            .into_par_iter()
            .flat_map(|m| {
                let sub_data = Self::extract_subspace(data, num_features, num_vectors, m, sub_d);
                let mut local = Vec::with_capacity(num_vectors);
                self.subspace_models[m]
                    .predict(&sub_data, |row, cluster, _dist| {
                        local.push(((old_num_vectors + row) * num_subspaces + m, T::from_usize(cluster)));
                    })
                    .expect("subspace model is trained");
                local
            })
            .collect();

        for (offset, code) in codes_slot {
            self.state.codes[offset] = code;
        }

        self.state.num_vectors += num_vectors;
        tracing::debug!(num_added = num_vectors, "pq add");
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<(Vec<Vec<u64>>, Vec<Vec<f32>>)> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        if query.is_empty() {
            return Err(IndexError::EmptyData);
        }
        if query.len() % self.state.num_features != 0 {
            return Err(IndexError::InvalidDataLength);
        }
        if !self.state.is_trained {
            return Err(IndexError::NotTrained);
        }

        let d = self.state.num_features;
        let num_queries = query.len() / d;
        let num_subspaces = self.state.num_subspaces;
        let sub_d = self.state.num_sub_features;
        let num_clusters = self.state.num_clusters.to_usize();
        let n = self.state.num_vectors;

        let mut ids = Vec::with_capacity(num_queries);
        let mut dists = Vec::with_capacity(num_queries);

        for q in 0..num_queries {
            let q_row = &query[q * d..(q + 1) * d];

            // Distance table T[m][c] = ||q_m - codebook[m][c]||^2, built in
            // parallel over subspaces (disjoint writes).
            let table: Vec<Vec<f32>> = (0..num_subspaces)
                .into_par_iter()
                .map(|m| {
                    let sub_q = &q_row[m * sub_d..(m + 1) * sub_d];
                    self.state.codebooks[m]
                        .iter()
                        .map(|centroid| {
                            sub_q
                                .iter()
                                .zip(centroid.iter())
                                .map(|(a, b)| (a - b) * (a - b))
                                .sum::<f32>()
                        })
                        .collect()
                })
                .collect();

            let num_chunks = n.div_ceil(SEARCH_CHUNK).max(1);
            let chunk_results: Vec<SmallestK> = (0..num_chunks)
                .into_par_iter()
                .map(|chunk| {
                    let start = chunk * SEARCH_CHUNK;
                    let end = (start + SEARCH_CHUNK).min(n);
                    let mut local = SmallestK::new(k);
                    for i in start..end {
                        let mut dist = 0.0f32;
                        for m in 0..num_subspaces {
                            let code = self.state.codes[i * num_subspaces + m].to_usize();
                            debug_assert!(code < num_clusters);
                            dist += table[m][code];
                        }
                        local.push(i as u64, dist);
                    }
                    local
                })
                .collect();

            let mut merged = SmallestK::new(k);
            for chunk in chunk_results {
                merged.merge(chunk);
            }

            let (row_ids, row_dists): (Vec<u64>, Vec<f32>) = merged.smallest_k().into_iter().unzip();
            ids.push(row_ids);
            dists.push(row_dists);
        }

        Ok((ids, dists))
    }

    fn header(&self) -> Header {
        Header {
            index_type: IndexTypeTag::Pq,
            code_type1: T::tag(),
            code_type2: crate::code::CodeTypeTag::None,
        }
    }

    fn save_body(&self, writer: &mut dyn Write) -> Result<()> {
        bincode::serialize_into(&mut *writer, &self.state)?;
        for km in &self.subspace_models {
            bincode::serialize_into(&mut *writer, km)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_clustered_rows() -> Vec<f32> {
        // D=4, two pairs of near-identical rows.
        vec![
            0.0, 0.0, 0.0, 0.0, //
            0.1, 0.1, 0.1, 0.1, //
            10.0, 10.0, 10.0, 10.0, //
            10.1, 10.1, 10.1, 10.1, //
        ]
    }

    #[test]
    fn train_add_search_roundtrip() {
        let data = four_clustered_rows();
        let mut idx = PqIndex::<u8>::new(4, 2, 2, PqOptions::default()).unwrap();
        idx.train(&data).unwrap();
        idx.add(&data).unwrap();

        assert_eq!(idx.num_vectors(), 4);
        let (ids, _) = idx.search(&[0.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(ids[0][0], 0);
    }

    #[test]
    fn codes_stay_within_declared_cluster_count() {
        let data = four_clustered_rows();
        let mut idx = PqIndex::<u8>::new(4, 2, 2, PqOptions::default()).unwrap();
        idx.train(&data).unwrap();
        idx.add(&data).unwrap();

        for &code in &idx.state.codes {
            assert!((code as usize) < 2);
        }
    }

    #[test]
    fn add_before_train_fails() {
        let mut idx = PqIndex::<u8>::new(4, 2, 2, PqOptions::default()).unwrap();
        assert!(matches!(idx.add(&four_clustered_rows()), Err(IndexError::NotTrained)));
    }

    #[test]
    fn rejects_subspace_count_that_does_not_divide_features() {
        let err = PqIndex::<u8>::new(5, 2, 4, PqOptions::default());
        assert!(matches!(err, Err(IndexError::InvalidNumSubspaces)));
    }

    #[test]
    fn top1_is_the_minimum_adc_distance_id() {
        // Invariant 2: the returned top-1 id's ADC distance is <= every
        // other stored id's ADC distance under the same query, recomputed
        // independently from the codebooks and codes rather than trusting
        // `search`'s own table.
        let data = vec![
            0.0, 0.0, 0.0, 0.0, //
            1.0, 1.0, 1.0, 1.0, //
            5.0, 5.0, 5.0, 5.0, //
            -3.0, 2.0, 0.5, 9.0, //
        ];
        let mut idx = PqIndex::<u8>::new(4, 2, 3, PqOptions::default()).unwrap();
        idx.train(&data).unwrap();
        idx.add(&data).unwrap();

        let query = [0.5f32, 0.5, 0.5, 0.5];
        let (ids, dists) = idx.search(&query, 1).unwrap();
        let top1 = ids[0][0];
        let top1_dist = dists[0][0];

        let sub_d = idx.state.num_sub_features;
        let num_subspaces = idx.state.num_subspaces;
        let n = idx.num_vectors();

        let adc_dist = |id: u64| -> f32 {
            let mut total = 0.0f32;
            for m in 0..num_subspaces {
                let code = idx.state.codes[id as usize * num_subspaces + m].to_usize();
                let centroid = &idx.state.codebooks[m][code];
                let sub_q = &query[m * sub_d..(m + 1) * sub_d];
                total += sub_q
                    .iter()
                    .zip(centroid.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
            }
            total
        };

        assert!((adc_dist(top1) - top1_dist).abs() < 1e-6);
        for other in 0..n as u64 {
            assert!(adc_dist(top1) <= adc_dist(other) + 1e-6);
        }
    }

    #[test]
    fn roundtrip_preserves_codebooks_and_search() {
        let data = four_clustered_rows();
        let mut idx = PqIndex::<u8>::new(4, 2, 2, PqOptions::default()).unwrap();
        idx.train(&data).unwrap();
        idx.add(&data).unwrap();

        let mut buf = Vec::new();
        idx.save_body(&mut buf).unwrap();
        let loaded = PqIndex::<u8>::load_body(&mut buf.as_slice()).unwrap();

        assert_eq!(loaded.state.codebooks.len(), idx.state.codebooks.len());
        assert_eq!(loaded.state.codes, idx.state.codes);
        assert_eq!(
            loaded.search(&[0.0, 0.0, 0.0, 0.0], 1).unwrap(),
            idx.search(&[0.0, 0.0, 0.0, 0.0], 1).unwrap()
        );
    }
}
