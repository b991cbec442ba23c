//! Randomized partition tree (a single isolation tree).
//!
//! Nodes live in a flat arena indexed by `usize`; the root is always node 0.
//! Children are only ever referenced from their parent, so no back-links exist.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::detect::normalize::adjusted_path_length;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        depth: usize,
        size: usize,
    },
}

/// A single randomized binary partition tree.
#[derive(Debug, Clone)]
pub struct PartitionTree {
    nodes: Vec<Node>,
    dimensions: usize,
}

impl PartitionTree {
    /// Build a tree over `sample`, splitting until every leaf holds at most one
    /// observation, no feature discriminates any more, or `max_depth` is reached.
    ///
    /// All observations in `sample` must share the same dimensionality.
    pub fn build<R: Rng + ?Sized>(sample: &[&[f64]], max_depth: usize, rng: &mut R) -> Self {
        let dimensions = sample.first().map(|o| o.len()).unwrap_or(0);
        let mut tree = Self {
            nodes: Vec::with_capacity(2 * sample.len().max(1)),
            dimensions,
        };
        let mut indices: Vec<usize> = (0..sample.len()).collect();
        tree.grow(sample, &mut indices, 0, max_depth, rng);
        tree
    }

    fn grow<R: Rng + ?Sized>(
        &mut self,
        sample: &[&[f64]],
        indices: &mut [usize],
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> usize {
        if indices.len() <= 1 || depth >= max_depth {
            return self.push(Node::Leaf {
                depth,
                size: indices.len(),
            });
        }

        let Some((feature, min, max)) = self.choose_feature(sample, indices, rng) else {
            // Every feature is constant over this subset.
            return self.push(Node::Leaf {
                depth,
                size: indices.len(),
            });
        };

        let value = draw_split(min, max, rng);
        let mid = partition(sample, indices, feature, value);

        // Reserve the slot so the parent index is fixed before the children are pushed.
        let slot = self.push(Node::Leaf { depth, size: 0 });
        let (lower, upper) = indices.split_at_mut(mid);
        let left = self.grow(sample, lower, depth + 1, max_depth, rng);
        let right = self.grow(sample, upper, depth + 1, max_depth, rng);
        self.nodes[slot] = Node::Split {
            feature,
            value,
            left,
            right,
        };
        slot
    }

    /// Pick a feature uniformly at random; if it is constant over the subset,
    /// re-draw among the features that still discriminate.
    fn choose_feature<R: Rng + ?Sized>(
        &self,
        sample: &[&[f64]],
        indices: &[usize],
        rng: &mut R,
    ) -> Option<(usize, f64, f64)> {
        if self.dimensions == 0 {
            return None;
        }

        let first = rng.gen_range(0..self.dimensions);
        let (min, max) = feature_range(sample, indices, first);
        if max > min {
            return Some((first, min, max));
        }

        let candidates: Vec<(usize, f64, f64)> = (0..self.dimensions)
            .filter(|&f| f != first)
            .map(|f| {
                let (lo, hi) = feature_range(sample, indices, f);
                (f, lo, hi)
            })
            .filter(|(_, lo, hi)| hi > lo)
            .collect();

        candidates.choose(rng).copied()
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Depth at which `point` lands in a leaf, corrected by the expected
    /// remaining depth for the observations that leaf still holds.
    ///
    /// Values outside the training range route like any other value: `< split`
    /// goes left, everything else (NaN included) goes right.
    ///
    /// `point` must have [`dimensions`](Self::dimensions) features; the ensemble
    /// checks this before calling.
    pub fn path_length(&self, point: &[f64]) -> f64 {
        debug_assert_eq!(point.len(), self.dimensions, "query dimensionality");
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { depth, size } => {
                    return *depth as f64 + adjusted_path_length(*size);
                }
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    index = if point[*feature] < *value { *left } else { *right };
                }
            }
        }
    }

    /// Number of features the tree was built over.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Deepest leaf in the tree.
    pub fn height(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Leaf { depth, .. } => Some(*depth),
                Node::Split { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }
}

fn feature_range(sample: &[&[f64]], indices: &[usize], feature: usize) -> (f64, f64) {
    indices
        .iter()
        .map(|&i| sample[i][feature])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

/// Draw a split value in the open interval (min, max). Requires `min < max`.
fn draw_split<R: Rng + ?Sized>(min: f64, max: f64, rng: &mut R) -> f64 {
    let midpoint = min / 2.0 + max / 2.0;
    if !(max - min).is_finite() {
        return midpoint;
    }
    let value = rng.gen_range(min..max);
    if value > min {
        value
    } else if midpoint > min {
        midpoint
    } else {
        // min and max are adjacent floats; `< max` still separates them.
        max
    }
}

/// Reorder `indices` so observations with `feature < value` come first.
/// Returns the number of such observations.
fn partition(sample: &[&[f64]], indices: &mut [usize], feature: usize, value: f64) -> usize {
    let mut mid = 0;
    for i in 0..indices.len() {
        if sample[indices[i]][feature] < value {
            indices.swap(i, mid);
            mid += 1;
        }
    }
    mid
}
