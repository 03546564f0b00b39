//! K-means quantizer (C2): the coarse/sub-space clustering primitive shared
//! by PQ and IVF. The specification treats this component as an external
//! collaborator with a fixed contract but unspecified internals — `annix`
//! ships a concrete implementation since there is no external k-means crate
//! in play.
//!
//! Initialization is k-means++ (weighted sampling proportional to squared
//! distance from already-chosen centroids); refinement is standard Lloyd
//! iteration. The assignment step — the only part of either phase that
//! scales with `N` rather than `k` — is parallelized with `rayon`.

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// A trained (or in-training) set of `num_clusters` centroids over
/// `num_features`-dimensional points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    num_clusters: usize,
    num_features: usize,
    /// Row-major `num_clusters x num_features`. Empty until `train` runs.
    centroids: Vec<f32>,
    iterations_run: usize,
    final_shift: f32,
}

impl KMeans {
    pub fn new(num_clusters: usize, num_features: usize) -> Result<Self> {
        if num_clusters == 0 {
            return Err(IndexError::InvalidNumClusters);
        }
        if num_features == 0 {
            return Err(IndexError::InvalidNumFeatures);
        }
        Ok(Self {
            num_clusters,
            num_features,
            centroids: Vec::new(),
            iterations_run: 0,
            final_shift: 0.0,
        })
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    pub fn iterations_run(&self) -> usize {
        self.iterations_run
    }

    pub fn final_shift(&self) -> f32 {
        self.final_shift
    }

    fn row(data: &[f32], i: usize, d: usize) -> &[f32] {
        &data[i * d..(i + 1) * d]
    }

    fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    /// Picks `num_clusters` initial centroids from `samples` via k-means++:
    /// the first centroid is uniform-random, each subsequent one is sampled
    /// with probability proportional to its squared distance from the
    /// nearest already-chosen centroid.
    fn kmeans_plus_plus_init(&self, samples: &[f32], n: usize) -> Vec<f32> {
        let d = self.num_features;
        let mut rng = rand::thread_rng();
        let mut centroids = Vec::with_capacity(self.num_clusters * d);

        let first = rng.gen_range(0..n);
        centroids.extend_from_slice(Self::row(samples, first, d));

        let mut min_sq_dist = vec![f32::INFINITY; n];
        while centroids.len() / d < self.num_clusters {
            let last = &centroids[centroids.len() - d..];
            min_sq_dist
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, best)| {
                    let dist = Self::squared_distance(Self::row(samples, i, d), last);
                    if dist < *best {
                        *best = dist;
                    }
                });

            let total: f64 = min_sq_dist.iter().map(|&v| v as f64).sum();
            let next = if total <= 0.0 {
                // All remaining points coincide with a chosen centroid;
                // fall back to uniform sampling rather than fail training.
                rng.gen_range(0..n)
            } else {
                let weights: Vec<f64> = min_sq_dist.iter().map(|&v| v as f64).collect();
                let dist = WeightedIndex::new(&weights).expect("non-empty positive weights");
                dist.sample(&mut rng)
            };
            centroids.extend_from_slice(Self::row(samples, next, d));
        }
        centroids
    }

    /// Trains on `samples` (`n * num_features` row-major floats), running at
    /// most `max_iterations` Lloyd iterations or until the total centroid
    /// shift (sum of squared per-centroid displacement) drops below
    /// `tolerance`. Returns `(iterations_run, final_shift)`.
    pub fn train(&mut self, samples: &[f32], max_iterations: usize, tolerance: f32) -> Result<(usize, f32)> {
        if samples.is_empty() {
            return Err(IndexError::EmptyData);
        }
        if samples.len() % self.num_features != 0 {
            return Err(IndexError::InvalidDataLength);
        }
        if max_iterations == 0 {
            return Err(IndexError::InvalidNumIterations);
        }
        if tolerance <= 0.0 {
            return Err(IndexError::InvalidTolerance);
        }

        let d = self.num_features;
        let n = samples.len() / d;

        // Training with fewer distinct points than clusters degrades
        // gracefully to one cluster per available point, mirroring the
        // reference's "reduce clusters if not enough data" latitude while
        // keeping this index's own `num_clusters` field fixed (unfilled
        // centroids duplicate the last chosen one, which is also
        // read-for-ADC-safe: a duplicate centroid just never wins a tie).
        let mut centroids = self.kmeans_plus_plus_init(samples, n);
        while centroids.len() / d < self.num_clusters {
            let last = centroids[centroids.len() - d..].to_vec();
            centroids.extend_from_slice(&last);
        }

        let mut iterations_run = 0;
        let mut final_shift = 0.0f32;

        for _ in 0..max_iterations {
            iterations_run += 1;

            let assignments: Vec<usize> = (0..n)
                .into_par_iter()
                .map(|i| {
                    let point = Self::row(samples, i, d);
                    let mut best = 0usize;
                    let mut best_dist = f32::INFINITY;
                    for c in 0..self.num_clusters {
                        let dist = Self::squared_distance(point, Self::row(&centroids, c, d));
                        if dist < best_dist {
                            best_dist = dist;
                            best = c;
                        }
                    }
                    best
                })
                .collect();

            let mut sums = vec![0.0f32; self.num_clusters * d];
            let mut counts = vec![0usize; self.num_clusters];
            for (i, &c) in assignments.iter().enumerate() {
                let point = Self::row(samples, i, d);
                let sum_row = &mut sums[c * d..(c + 1) * d];
                for (s, &x) in sum_row.iter_mut().zip(point.iter()) {
                    *s += x;
                }
                counts[c] += 1;
            }

            let mut shift = 0.0f32;
            for c in 0..self.num_clusters {
                if counts[c] == 0 {
                    // An empty cluster keeps its previous centroid rather
                    // than collapsing to the origin.
                    continue;
                }
                let inv = 1.0 / counts[c] as f32;
                let old = centroids[c * d..(c + 1) * d].to_vec();
                let new_row = &mut centroids[c * d..(c + 1) * d];
                for (nv, &sv) in new_row.iter_mut().zip(sums[c * d..(c + 1) * d].iter()) {
                    *nv = sv * inv;
                }
                shift += Self::squared_distance(&old, &centroids[c * d..(c + 1) * d]);
            }

            final_shift = shift;
            if shift < tolerance {
                break;
            }
        }

        self.centroids = centroids;
        self.iterations_run = iterations_run;
        self.final_shift = final_shift;

        tracing::debug!(
            num_clusters = self.num_clusters,
            num_features = self.num_features,
            n,
            iterations_run,
            final_shift,
            "kmeans training converged"
        );

        Ok((iterations_run, final_shift))
    }

    /// For each row of `samples`, invokes `callback(row, nearest_cluster,
    /// squared_distance)`. Distance computation is parallelized; the
    /// callback itself runs sequentially in row order.
    pub fn predict<F>(&self, samples: &[f32], mut callback: F) -> Result<()>
    where
        F: FnMut(usize, usize, f32),
    {
        if self.centroids.is_empty() {
            return Err(IndexError::NotTrained);
        }
        if samples.is_empty() {
            return Err(IndexError::EmptyData);
        }
        if samples.len() % self.num_features != 0 {
            return Err(IndexError::InvalidDataLength);
        }

        let d = self.num_features;
        let n = samples.len() / d;

        let assignments: Vec<(usize, f32)> = (0..n)
            .into_par_iter()
            .map(|i| {
                let point = Self::row(samples, i, d);
                let mut best = 0usize;
                let mut best_dist = f32::INFINITY;
                for c in 0..self.num_clusters {
                    let dist = Self::squared_distance(point, Self::row(&self.centroids, c, d));
                    if dist < best_dist {
                        best_dist = dist;
                        best = c;
                    }
                }
                (best, best_dist)
            })
            .collect();

        for (row, (cluster, dist)) in assignments.into_iter().enumerate() {
            callback(row, cluster, dist);
        }
        Ok(())
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_well_separated_points() -> Vec<f32> {
        vec![
            0.0, 0.0, //
            0.0, 0.1, //
            10.0, 10.0, //
            10.0, 10.1, //
        ]
    }

    #[test]
    fn train_separates_two_clusters() {
        let data = four_well_separated_points();
        let mut km = KMeans::new(2, 2).unwrap();
        let (iters, shift) = km.train(&data, 50, 1e-6).unwrap();
        assert!(iters >= 1);
        assert!(shift.is_finite());
        assert_eq!(km.centroids().len(), 4);
    }

    #[test]
    fn predict_assigns_each_point_to_its_own_cluster() {
        let data = four_well_separated_points();
        let mut km = KMeans::new(2, 2).unwrap();
        km.train(&data, 50, 1e-6).unwrap();

        let mut assignments = vec![];
        km.predict(&data, |row, cluster, _dist| assignments.push((row, cluster)))
            .unwrap();

        assert_eq!(assignments[0].1, assignments[1].1);
        assert_eq!(assignments[2].1, assignments[3].1);
        assert_ne!(assignments[0].1, assignments[2].1);
    }

    #[test]
    fn predict_before_train_fails() {
        let km = KMeans::new(2, 2).unwrap();
        let err = km.predict(&[0.0, 0.0], |_, _, _| {});
        assert!(matches!(err, Err(IndexError::NotTrained)));
    }

    #[test]
    fn roundtrip_preserves_centroids() {
        let data = four_well_separated_points();
        let mut km = KMeans::new(2, 2).unwrap();
        km.train(&data, 50, 1e-6).unwrap();

        let bytes = bincode::serialize(&km).unwrap();
        let loaded: KMeans = bincode::deserialize(&bytes).unwrap();
        assert_eq!(loaded.centroids(), km.centroids());
        assert_eq!(loaded.iterations_run(), km.iterations_run());
    }

    #[test]
    fn rejects_empty_data() {
        let mut km = KMeans::new(2, 2).unwrap();
        assert!(matches!(km.train(&[], 10, 1e-4), Err(IndexError::EmptyData)));
    }

    #[test]
    fn rejects_misaligned_data() {
        let mut km = KMeans::new(2, 2).unwrap();
        assert!(matches!(
            km.train(&[1.0, 2.0, 3.0], 10, 1e-4),
            Err(IndexError::InvalidDataLength)
        ));
    }
}
