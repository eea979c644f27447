//! Model-based anomaly scoring.
//!
//! The model capability is supplied at construction as an `AnomalyModel`
//! trait object. The built-in backend is an isolation forest that is fitted
//! on the entity's history every time it scores.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ModelError;
use crate::features::FeatureVector;

use super::types::AnomalyStatus;

/// Euler–Mascheroni constant, used by the harmonic approximation.
const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Native score at or above which a flagged sample is HIGH.
const HIGH_SCORE: f64 = 0.70;

/// Native score at or above which a flagged sample is MEDIUM.
const MEDIUM_SCORE: f64 = 0.60;

/// Result of fitting on a history and scoring one vector.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelScore {
    /// Native anomaly score.
    pub score: f64,
    /// Cut-off derived from the training data.
    pub threshold: f64,
    pub status: AnomalyStatus,
}

/// Pluggable model backend.
///
/// `fit_score` fits on `history` (which never contains `current`) and scores
/// `current`. Failures are reported, never panicked.
pub trait AnomalyModel: Send + Sync {
    fn fit_score(
        &self,
        history: &[FeatureVector],
        current: &FeatureVector,
    ) -> Result<ModelScore, ModelError>;

    /// Name of this backend (for logs).
    fn name(&self) -> &str;
}

// ── Isolation Forest ────────────────────────────────────────────────────

/// Isolation forest over standardized features.
#[derive(Clone, Debug)]
pub struct IsolationForest {
    pub trees: usize,
    /// Upper bound on the per-tree subsample.
    pub max_samples: usize,
    /// Expected fraction of anomalies in the training data.
    pub contamination: f64,
    pub seed: u64,
    /// Minimum training vectors.
    pub min_samples: usize,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
            min_samples: 2,
        }
    }
}

impl IsolationForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees.max(1);
        self
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination.clamp(0.0, 0.5);
        self
    }

    fn classify(&self, score: f64, threshold: f64) -> AnomalyStatus {
        if score <= threshold {
            AnomalyStatus::Normal
        } else if score >= HIGH_SCORE {
            AnomalyStatus::HighAnomaly
        } else if score >= MEDIUM_SCORE {
            AnomalyStatus::MediumAnomaly
        } else {
            AnomalyStatus::LowAnomaly
        }
    }
}

impl AnomalyModel for IsolationForest {
    fn fit_score(
        &self,
        history: &[FeatureVector],
        current: &FeatureVector,
    ) -> Result<ModelScore, ModelError> {
        let needed = self.min_samples.max(2);
        if history.len() < needed {
            return Err(ModelError::InsufficientSamples {
                needed,
                got: history.len(),
            });
        }

        let scaler = Scaler::fit(history, current)?;
        let data: Vec<Vec<f64>> = history.iter().map(|v| scaler.transform(v)).collect();
        let forest = Forest::grow(&data, self.trees.max(1), self.max_samples, self.seed);

        let mut training: Vec<f64> = data.iter().map(|row| forest.score(row)).collect();
        training.sort_by(f64::total_cmp);
        let threshold = quantile(&training, 1.0 - self.contamination);

        let score = forest.score(&scaler.transform(current));
        Ok(ModelScore {
            score,
            threshold,
            status: self.classify(score, threshold),
        })
    }

    fn name(&self) -> &str {
        "isolation_forest"
    }
}

// ── Standardization ─────────────────────────────────────────────────────

struct Scaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl Scaler {
    /// Validate shapes and values, then learn per-feature mean and std.
    fn fit(history: &[FeatureVector], current: &FeatureVector) -> Result<Self, ModelError> {
        let dims = history[0].len();
        for v in history.iter().chain(std::iter::once(current)) {
            if v.len() != dims {
                return Err(ModelError::DimensionMismatch {
                    expected: dims,
                    got: v.len(),
                });
            }
            if let Some(feature) = v.values().iter().position(|x| !x.is_finite()) {
                return Err(ModelError::NonFinite { feature });
            }
        }

        let n = history.len() as f64;
        let mut mean = vec![0.0; dims];
        let mut std = vec![0.0; dims];
        for i in 0..dims {
            mean[i] = history.iter().map(|v| v.get(i)).sum::<f64>() / n;
            let var = history
                .iter()
                .map(|v| (v.get(i) - mean[i]).powi(2))
                .sum::<f64>()
                / n;
            std[i] = var.sqrt();
        }
        if std.iter().all(|s| *s <= f64::EPSILON) {
            return Err(ModelError::Degenerate);
        }
        Ok(Self { mean, std })
    }

    fn transform(&self, v: &FeatureVector) -> Vec<f64> {
        self.mean
            .iter()
            .zip(&self.std)
            .enumerate()
            .map(|(i, (m, s))| {
                if *s > f64::EPSILON {
                    (v.get(i) - m) / s
                } else {
                    0.0
                }
            })
            .collect()
    }
}

// ── Trees ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One isolation tree stored as an arena; node 0 is the root.
#[derive(Clone, Debug)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn grow(data: &[Vec<f64>], rows: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Tree { nodes: Vec::new() };
        tree.build(data, rows, 0, height_limit, rng);
        tree
    }

    fn build(
        &mut self,
        data: &[Vec<f64>],
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= height_limit || rows.len() <= 1 {
            return id;
        }

        let dims = data[rows[0]].len();
        let ranges: Vec<(usize, f64, f64)> = (0..dims)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &r| {
                    (lo.min(data[r][f]), hi.max(data[r][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if ranges.is_empty() {
            return id;
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] < threshold);

        let left = self.build(data, left_rows, depth + 1, height_limit, rng);
        let right = self.build(data, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if point[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

struct Forest {
    trees: Vec<Tree>,
    subsample: usize,
}

impl Forest {
    fn grow(data: &[Vec<f64>], trees: usize, max_samples: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let subsample = max_samples.clamp(1, data.len());
        let height_limit = (subsample as f64).log2().ceil() as usize;

        let trees = (0..trees)
            .map(|_| {
                let rows = rand::seq::index::sample(&mut rng, data.len(), subsample).into_vec();
                Tree::grow(data, rows, height_limit, &mut rng)
            })
            .collect();
        Self { trees, subsample }
    }

    /// `2^(-E[h(x)] / c(subsample))`, in (0, 1].
    fn score(&self, point: &[f64]) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|t| t.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.subsample);
        if norm <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / norm)
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
