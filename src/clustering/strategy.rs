//! Dimensionality reduction and label assignment strategies.
//!
//! The fallback ladder: density-based clustering with noise labels when
//! enabled, hierarchical agglomerative search otherwise, singletons as the
//! last resort. The choice is made once at clusterer construction, not per
//! call. All numerics run on nalgebra matrices with rows as samples.

use nalgebra::{DMatrix, DVector};

/// Noise label assigned by the density strategy.
pub const NOISE: i32 = -1;

/// Which label-assignment algorithm a clusterer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStrategy {
    /// Density-based with noise labels, DBSCAN-style.
    Density,
    /// Agglomerative with silhouette-guided cluster count search.
    Agglomerative,
    /// Every sample its own cluster.
    Singleton,
}

/// Which strategies are available to this process.
///
/// Everything here is implemented natively, so both default on; the knobs
/// exist so callers can force a lower rung of the ladder.
#[derive(Debug, Clone, Copy)]
pub struct ClusterCapabilities {
    pub density: bool,
    pub agglomerative: bool,
}

impl Default for ClusterCapabilities {
    fn default() -> Self {
        Self {
            density: true,
            agglomerative: true,
        }
    }
}

impl ClusterCapabilities {
    /// Resolve the ladder to one concrete strategy.
    pub fn select(&self) -> ClusterStrategy {
        if self.density {
            ClusterStrategy::Density
        } else if self.agglomerative {
            ClusterStrategy::Agglomerative
        } else {
            ClusterStrategy::Singleton
        }
    }
}

// =============================================================================
// Dimensionality reduction
// =============================================================================

/// Project onto the top-variance directions via SVD.
///
/// Input already at or below `target_dims` passes through unchanged. Data is
/// column-centred before decomposition; the projection keeps the first
/// `target_dims` right-singular vectors (nalgebra orders singular values
/// descending).
pub fn reduce_dimensionality(embeddings: &DMatrix<f64>, target_dims: usize) -> DMatrix<f64> {
    let (n, d) = embeddings.shape();
    if d <= target_dims || n == 0 {
        return embeddings.clone();
    }

    let col_means = embeddings.row_mean();
    let mut centered = embeddings.clone();
    for mut row in centered.row_iter_mut() {
        row -= &col_means;
    }

    let svd = centered.clone().svd(false, true);
    match svd.v_t {
        Some(v_t) => {
            let k = target_dims.min(v_t.nrows());
            &centered * v_t.rows(0, k).transpose()
        }
        None => centered,
    }
}

// =============================================================================
// Distance helpers
// =============================================================================

fn row(m: &DMatrix<f64>, i: usize) -> DVector<f64> {
    m.row(i).transpose()
}

fn euclidean(m: &DMatrix<f64>, i: usize, j: usize) -> f64 {
    (row(m, i) - row(m, j)).norm()
}

fn pairwise_distances(m: &DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows();
    let mut d = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let dist = euclidean(m, i, j);
            d[(i, j)] = dist;
            d[(j, i)] = dist;
        }
    }
    d
}

// =============================================================================
// Density strategy
// =============================================================================

/// DBSCAN-style density clustering with a core threshold of one.
///
/// With that threshold the algorithm is connected components of the
/// eps-neighbourhood graph; components below `min_cluster_size` become noise.
/// Eps is derived from the data as 1.5 times the median nearest-neighbour
/// distance.
pub fn density_cluster(embeddings: &DMatrix<f64>, min_cluster_size: usize) -> Vec<i32> {
    let n = embeddings.nrows();
    if n == 0 {
        return Vec::new();
    }
    let distances = pairwise_distances(embeddings);

    let mut nn_distances: Vec<f64> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i)
                .map(|j| distances[(i, j)])
                .fold(f64::INFINITY, f64::min)
        })
        .collect();
    nn_distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let eps = 1.5 * nn_distances[n / 2];

    // Connected components over the eps graph.
    let mut labels = vec![i32::MIN; n];
    let mut next_label = 0;
    for start in 0..n {
        if labels[start] != i32::MIN {
            continue;
        }
        let mut stack = vec![start];
        let mut members = Vec::new();
        labels[start] = next_label;
        while let Some(i) = stack.pop() {
            members.push(i);
            for j in 0..n {
                if labels[j] == i32::MIN && distances[(i, j)] <= eps {
                    labels[j] = next_label;
                    stack.push(j);
                }
            }
        }
        if members.len() < min_cluster_size {
            for i in members {
                labels[i] = NOISE;
            }
        } else {
            next_label += 1;
        }
    }
    labels
}

// =============================================================================
// Agglomerative strategy
// =============================================================================

/// Average-linkage agglomerative clustering down to `k` clusters.
fn agglomerate(distances: &DMatrix<f64>, n: usize, k: usize) -> Vec<i32> {
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    while clusters.len() > k {
        let mut best = (0usize, 1usize);
        let mut best_dist = f64::INFINITY;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let mut sum = 0.0;
                for &i in &clusters[a] {
                    for &j in &clusters[b] {
                        sum += distances[(i, j)];
                    }
                }
                let avg = sum / (clusters[a].len() * clusters[b].len()) as f64;
                if avg < best_dist {
                    best_dist = avg;
                    best = (a, b);
                }
            }
        }
        let merged = clusters.remove(best.1);
        clusters[best.0].extend(merged);
    }

    let mut labels = vec![0i32; n];
    for (label, members) in clusters.iter().enumerate() {
        for &i in members {
            labels[i] = label as i32;
        }
    }
    labels
}

/// Agglomerative clustering with the cluster count chosen by silhouette.
///
/// Searches k in 2..min(n/2 + 1, 10) and keeps the best-scoring labelling;
/// if no candidate scores, everything lands in one cluster.
pub fn agglomerative_cluster(embeddings: &DMatrix<f64>) -> Vec<i32> {
    let n = embeddings.nrows();
    let distances = pairwise_distances(embeddings);

    let mut best_labels = None;
    let mut best_score = -1.0;
    for k in 2..(n / 2 + 1).min(10) {
        let labels = agglomerate(&distances, n, k);
        let score = silhouette(embeddings, &labels);
        if score > best_score {
            best_score = score;
            best_labels = Some(labels);
        }
    }
    best_labels.unwrap_or_else(|| vec![0; n])
}

/// Every sample its own cluster.
pub fn singleton_cluster(n: usize) -> Vec<i32> {
    (0..n as i32).collect()
}

// =============================================================================
// Silhouette
// =============================================================================

/// Mean silhouette coefficient over all samples.
///
/// a(i) = mean distance to own-cluster peers, b(i) = smallest mean distance
/// to any other cluster, s(i) = (b - a) / max(a, b). Samples alone in their
/// cluster score 0. Noise counts as a cluster of its own, matching how the
/// score is conventionally computed over raw labels.
pub fn silhouette(embeddings: &DMatrix<f64>, labels: &[i32]) -> f64 {
    let n = embeddings.nrows();
    if n < 2 {
        return 0.0;
    }
    let distinct: Vec<i32> = {
        let mut seen = Vec::new();
        for &l in labels {
            if !seen.contains(&l) {
                seen.push(l);
            }
        }
        seen
    };
    if distinct.len() < 2 {
        return 0.0;
    }

    let distances = pairwise_distances(embeddings);
    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        let own_peers: Vec<usize> = (0..n).filter(|&j| j != i && labels[j] == own).collect();
        if own_peers.is_empty() {
            continue; // s(i) = 0
        }
        let a = own_peers.iter().map(|&j| distances[(i, j)]).sum::<f64>()
            / own_peers.len() as f64;

        let mut b = f64::INFINITY;
        for &other in &distinct {
            if other == own {
                continue;
            }
            let members: Vec<usize> = (0..n).filter(|&j| labels[j] == other).collect();
            if members.is_empty() {
                continue;
            }
            let mean_dist = members.iter().map(|&j| distances[(i, j)]).sum::<f64>()
                / members.len() as f64;
            b = b.min(mean_dist);
        }

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blob_matrix() -> DMatrix<f64> {
        // Two tight groups far apart in 2D.
        DMatrix::from_row_slice(
            6,
            2,
            &[
                0.0, 0.0, //
                0.1, 0.0, //
                0.0, 0.1, //
                10.0, 10.0, //
                10.1, 10.0, //
                10.0, 10.1, //
            ],
        )
    }

    #[test]
    fn reduction_passes_through_small_dims() {
        let m = two_blob_matrix();
        let reduced = reduce_dimensionality(&m, 10);
        assert_eq!(reduced.shape(), (6, 2));
        assert_eq!(reduced, m);
    }

    #[test]
    fn reduction_projects_to_target_dims() {
        let m = DMatrix::from_fn(8, 20, |i, j| ((i * 7 + j * 3) % 11) as f64);
        let reduced = reduce_dimensionality(&m, 5);
        assert_eq!(reduced.shape(), (8, 5));
    }

    #[test]
    fn reduction_preserves_separation() {
        // Blobs padded out to 20 dims still separate after projection.
        let mut m = DMatrix::zeros(6, 20);
        let blobs = two_blob_matrix();
        for i in 0..6 {
            m[(i, 0)] = blobs[(i, 0)];
            m[(i, 1)] = blobs[(i, 1)];
        }
        let reduced = reduce_dimensionality(&m, 3);
        let within = (reduced.row(0) - reduced.row(1)).norm();
        let across = (reduced.row(0) - reduced.row(3)).norm();
        assert!(across > within * 10.0);
    }

    #[test]
    fn density_finds_two_blobs() {
        let labels = density_cluster(&two_blob_matrix(), 2);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
        assert!(labels.iter().all(|&l| l != NOISE));
    }

    #[test]
    fn density_marks_isolated_point_as_noise() {
        let m = DMatrix::from_row_slice(
            5,
            2,
            &[
                0.0, 0.0, //
                0.1, 0.0, //
                0.0, 0.1, //
                0.1, 0.1, //
                50.0, 50.0, //
            ],
        );
        let labels = density_cluster(&m, 2);
        assert_eq!(labels[4], NOISE);
        assert!(labels[..4].iter().all(|&l| l == labels[0]));
    }

    #[test]
    fn density_handles_empty_input() {
        let labels = density_cluster(&DMatrix::zeros(0, 0), 2);
        assert!(labels.is_empty());
    }

    #[test]
    fn agglomerative_finds_two_blobs() {
        let labels = agglomerative_cluster(&two_blob_matrix());
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn silhouette_high_for_clean_split() {
        let m = two_blob_matrix();
        let labels = vec![0, 0, 0, 1, 1, 1];
        assert!(silhouette(&m, &labels) > 0.9);
    }

    #[test]
    fn silhouette_low_for_bad_split() {
        let m = two_blob_matrix();
        // Split crosses both blobs.
        let labels = vec![0, 1, 0, 1, 0, 1];
        assert!(silhouette(&m, &labels) < 0.1);
    }

    #[test]
    fn silhouette_zero_for_single_cluster() {
        let m = two_blob_matrix();
        assert_eq!(silhouette(&m, &[0, 0, 0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn capability_ladder_resolves_in_order() {
        let both = ClusterCapabilities::default();
        assert_eq!(both.select(), ClusterStrategy::Density);
        let agg_only = ClusterCapabilities {
            density: false,
            agglomerative: true,
        };
        assert_eq!(agg_only.select(), ClusterStrategy::Agglomerative);
        let neither = ClusterCapabilities {
            density: false,
            agglomerative: false,
        };
        assert_eq!(neither.select(), ClusterStrategy::Singleton);
    }
}
