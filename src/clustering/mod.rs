//! Response clustering: embed, reduce, label, summarise.
//!
//! Groups mined responses into distinct approaches so the miner can pick one
//! representative per approach. The embedding backend and label strategy are
//! both resolved at construction; the `cluster` call itself is deterministic
//! given the inputs.

pub mod embed;
pub mod strategy;

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

pub use embed::{Embedder, EmbeddingCache, HashEmbedder};
pub use strategy::{ClusterCapabilities, ClusterStrategy, NOISE};

/// Outcome of one clustering run.
#[derive(Debug, Clone)]
pub struct ClusterResult {
    /// Cluster label per input, in input order. `NOISE` marks unclustered.
    pub labels: Vec<i32>,
    /// Number of clusters found, noise excluded.
    pub n_clusters: usize,
    /// Mean silhouette coefficient; 0.0 outside 2 <= k < n.
    pub silhouette: f64,
    /// Reduced embeddings, rows aligned with inputs. Empty below 3 inputs.
    pub reduced: DMatrix<f64>,
    /// Centroid per cluster label, noise excluded.
    pub centers: HashMap<i32, DVector<f64>>,
}

/// Clusters response texts into distinct approaches.
pub struct ResponseClusterer {
    embedder: Box<dyn Embedder>,
    cache: EmbeddingCache,
    strategy: ClusterStrategy,
    target_dims: usize,
    min_cluster_size: usize,
}

impl Default for ResponseClusterer {
    fn default() -> Self {
        Self::new(ClusterCapabilities::default())
    }
}

impl ResponseClusterer {
    pub fn new(capabilities: ClusterCapabilities) -> Self {
        Self {
            embedder: Box::new(HashEmbedder::default()),
            cache: EmbeddingCache::new(),
            strategy: capabilities.select(),
            target_dims: 10,
            min_cluster_size: 2,
        }
    }

    /// Swap in a different embedding backend.
    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn strategy(&self) -> ClusterStrategy {
        self.strategy
    }

    /// Cluster responses into distinct approaches.
    ///
    /// Below 3 inputs there is nothing to estimate: every response becomes
    /// its own cluster with no embeddings and silhouette 0.0.
    pub fn cluster(&mut self, responses: &[&str]) -> ClusterResult {
        let n = responses.len();
        if n < 3 {
            return ClusterResult {
                labels: strategy::singleton_cluster(n),
                n_clusters: n,
                silhouette: 0.0,
                reduced: DMatrix::zeros(0, 0),
                centers: HashMap::new(),
            };
        }

        let embeddings = self.embed_all(responses);
        let reduced = strategy::reduce_dimensionality(&embeddings, self.target_dims);

        let labels = match self.strategy {
            ClusterStrategy::Density => {
                strategy::density_cluster(&reduced, self.min_cluster_size)
            }
            ClusterStrategy::Agglomerative => strategy::agglomerative_cluster(&reduced),
            ClusterStrategy::Singleton => strategy::singleton_cluster(n),
        };

        let centers = compute_centers(&reduced, &labels);
        let n_clusters = centers.len();

        let silhouette = if n_clusters > 1 && n_clusters < n {
            strategy::silhouette(&reduced, &labels)
        } else {
            0.0
        };

        debug!(
            samples = n,
            clusters = n_clusters,
            silhouette,
            strategy = ?self.strategy,
            "clustered responses"
        );

        ClusterResult {
            labels,
            n_clusters,
            silhouette,
            reduced,
            centers,
        }
    }

    fn embed_all(&mut self, responses: &[&str]) -> DMatrix<f64> {
        let dim = self.embedder.dimension();
        let mut m = DMatrix::zeros(responses.len(), dim);
        for (i, text) in responses.iter().enumerate() {
            let embedder = &self.embedder;
            let v = self.cache.get_or_insert_with(text, || embedder.embed(text));
            m.row_mut(i).copy_from(&v.transpose());
        }
        m
    }

    /// Index of the cluster member nearest its centroid, by Euclidean
    /// distance in the reduced space. Falls back to the first member when
    /// the cluster has no centroid.
    pub fn nearest_to_center(&self, cluster_id: i32, result: &ClusterResult) -> Option<usize> {
        let members: Vec<usize> = result
            .labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == cluster_id)
            .map(|(i, _)| i)
            .collect();
        let first = *members.first()?;

        let center = match result.centers.get(&cluster_id) {
            Some(c) => c,
            None => return Some(first),
        };

        members
            .into_iter()
            .min_by(|&a, &b| {
                let da = (result.reduced.row(a).transpose() - center).norm();
                let db = (result.reduced.row(b).transpose() - center).norm();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .or(Some(first))
    }
}

/// Per-label centroid means over the reduced embeddings, noise excluded.
fn compute_centers(reduced: &DMatrix<f64>, labels: &[i32]) -> HashMap<i32, DVector<f64>> {
    let mut centers = HashMap::new();
    let mut counts: HashMap<i32, usize> = HashMap::new();
    for (i, &label) in labels.iter().enumerate() {
        if label == NOISE {
            continue;
        }
        let entry = centers
            .entry(label)
            .or_insert_with(|| DVector::zeros(reduced.ncols()));
        *entry += reduced.row(i).transpose();
        *counts.entry(label).or_insert(0) += 1;
    }
    for (label, center) in centers.iter_mut() {
        *center /= counts[label] as f64;
    }
    centers
}
