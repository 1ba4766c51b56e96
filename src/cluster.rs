//! Diversity clustering over prepared embeddings.

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Assigns one integer label per row.
pub trait Clusterer: Send + Sync {
    fn fit_predict(&self, vectors: &[Vec<f64>]) -> Vec<usize>;
}

/// Seeded k-means with k-means++ initialization.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub n_clusters: usize,
    pub seed: u64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            n_clusters: 50,
            seed: 42,
            max_iter: 300,
            tol: 1e-4,
        }
    }
}

impl KMeans {
    #[must_use]
    pub fn new(n_clusters: usize, seed: u64) -> Self {
        Self {
            n_clusters,
            seed,
            ..Self::default()
        }
    }

    fn init_centroids(&self, vectors: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
        let mut centroids = Vec::with_capacity(k);
        centroids.push(vectors[rng.gen_range(0..vectors.len())].clone());

        let mut nearest: Vec<f64> = vectors
            .iter()
            .map(|v| squared_distance(v, &centroids[0]))
            .collect();

        while centroids.len() < k {
            let total: f64 = nearest.iter().sum();
            let next = if total > 0.0 {
                let mut target = rng.gen::<f64>() * total;
                let mut chosen = vectors.len() - 1;
                for (i, d) in nearest.iter().enumerate() {
                    if target < *d {
                        chosen = i;
                        break;
                    }
                    target -= d;
                }
                chosen
            } else {
                // Every row already coincides with a centroid
                rng.gen_range(0..vectors.len())
            };

            let centroid = vectors[next].clone();
            for (d, v) in nearest.iter_mut().zip(vectors) {
                *d = d.min(squared_distance(v, &centroid));
            }
            centroids.push(centroid);
        }
        centroids
    }
}

impl Clusterer for KMeans {
    fn fit_predict(&self, vectors: &[Vec<f64>]) -> Vec<usize> {
        if vectors.is_empty() || self.n_clusters == 0 {
            return vec![0; vectors.len()];
        }

        let k = self.n_clusters.min(vectors.len());
        let dim = vectors[0].len();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = self.init_centroids(vectors, k, &mut rng);
        let mut labels = assign(vectors, &centroids);

        for iteration in 0..self.max_iter {
            let mut sums = vec![vec![0.0; dim]; k];
            let mut counts = vec![0usize; k];
            for (v, &label) in vectors.iter().zip(&labels) {
                counts[label] += 1;
                for (s, x) in sums[label].iter_mut().zip(v) {
                    *s += x;
                }
            }

            let mut shift = 0.0;
            for (c, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
                // Empty clusters keep their previous centroid
                if count == 0 {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let updated: Vec<f64> = sum.into_iter().map(|s| s / count as f64).collect();
                shift += squared_distance(&updated, &centroids[c]);
                centroids[c] = updated;
            }

            labels = assign(vectors, &centroids);
            trace!("k-means iteration {iteration}: centroid shift {shift:.6}");
            if shift <= self.tol {
                debug!("k-means converged after {} iterations", iteration + 1);
                break;
            }
        }
        labels
    }
}

fn assign(vectors: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    vectors
        .iter()
        .map(|v| {
            centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, squared_distance(v, c)))
                .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map_or(0, |(i, _)| i)
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
