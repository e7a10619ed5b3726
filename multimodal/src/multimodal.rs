use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};

use tracing::debug;

use crate::distance::l2_distance;
use crate::error::ModeError;
use crate::multimodal_io;
use crate::store::{ModeStore, Peak};

/// Quick-shift link radius, in units of the kernel bandwidth.
const LINK_RADIUS: f64 = 2.0;

/// A weighted summary of one or more inserted vectors.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) id: u64,
    pub(crate) count: u64,
    pub(crate) mean: Vec<f32>,
    /// Index and distance of the nearest other node. Derived state.
    nearest: Option<(usize, f32)>,
}

impl Node {
    pub(crate) fn new(id: u64, count: u64, mean: Vec<f32>) -> Self {
        Self {
            id,
            count,
            mean,
            nearest: None,
        }
    }

    /// Heavier nodes win; equal weights fall back to the older id.
    fn outranks(&self, other: &Node) -> bool {
        self.count > other.count || (self.count == other.count && self.id < other.id)
    }
}

/// Bounded mode-seeking structure implementing [`ModeStore`].
///
/// Every insert adds a node. When `max_nodes` is positive and the node count
/// exceeds it, the closest pair of nodes is merged into its count-weighted
/// mean; the merged node keeps the id of the heavier side, so ids stay
/// stable for the dominant part of each mode.
///
/// Peaks are computed by quick-shift: each node links to the densest node
/// within `2 * bandwidth` (the bandwidth being the median nearest-neighbour
/// distance), and the roots of the resulting forest are the modes.
pub struct MultiModal {
    dim: usize,
    max_nodes: usize,
    next_id: u64,
    nodes: Vec<Node>,
}

impl MultiModal {
    /// Creates an empty store. `max_nodes == 0` means unbounded.
    /// Panics if `dim` is 0.
    pub fn new(dim: usize, max_nodes: usize) -> Self {
        assert!(dim > 0, "multimodal: dim must be positive");
        Self {
            dim,
            max_nodes,
            next_id: 0,
            nodes: Vec::new(),
        }
    }

    /// Returns the node capacity (0 for unbounded).
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Returns the total number of vectors absorbed by all nodes.
    pub fn inserted(&self) -> u64 {
        self.nodes.iter().map(|n| n.count).sum()
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Build from deserialized state; nearest-neighbour links are recomputed.
    pub(crate) fn from_parts(dim: usize, max_nodes: usize, next_id: u64, nodes: Vec<Node>) -> Self {
        let mut mm = Self {
            dim,
            max_nodes,
            next_id,
            nodes,
        };
        for i in 0..mm.nodes.len() {
            mm.nodes[i].nearest = mm.scan_nearest(i);
        }
        mm.enforce_capacity();
        mm
    }

    /// Reads a store of whatever dimension the stream holds. `max_nodes == 0`
    /// keeps the stream's capacity.
    pub fn read(r: &mut dyn Read, max_nodes: usize) -> Result<Self, ModeError> {
        let decoded = multimodal_io::load(r)?;
        let max_nodes = if max_nodes == 0 { decoded.max_nodes } else { max_nodes };
        let mm = MultiModal::from_parts(decoded.dim, max_nodes, decoded.next_id, decoded.nodes);
        debug!(dim = mm.dim, nodes = mm.nodes.len(), max_nodes, "multimodal: state loaded");
        Ok(mm)
    }

    fn scan_nearest(&self, i: usize) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (j, other) in self.nodes.iter().enumerate() {
            if j == i {
                continue;
            }
            let d = l2_distance(&self.nodes[i].mean, &other.mean);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((j, d));
            }
        }
        best
    }

    fn enforce_capacity(&mut self) {
        while self.max_nodes > 0 && self.nodes.len() > self.max_nodes {
            self.merge_closest();
        }
    }

    fn closest_pair(&self) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f32)> = None;
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some((j, d)) = node.nearest {
                if best.is_none_or(|(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }
        best.map(|(i, j, _)| (i, j))
    }

    fn merge_closest(&mut self) {
        let Some((a, b)) = self.closest_pair() else {
            return;
        };
        let (keep_old, gone) = if self.nodes[a].outranks(&self.nodes[b]) {
            (a, b)
        } else {
            (b, a)
        };

        let removed = self.nodes.remove(gone);
        let keep = if gone < keep_old { keep_old - 1 } else { keep_old };

        {
            let kept = &mut self.nodes[keep];
            let kc = kept.count as f64;
            let rc = removed.count as f64;
            let total = kc + rc;
            for (m, &x) in kept.mean.iter_mut().zip(&removed.mean) {
                *m = ((*m as f64 * kc + x as f64 * rc) / total) as f32;
            }
            kept.count += removed.count;
            debug!(
                kept = kept.id,
                absorbed = removed.id,
                count = kept.count,
                "multimodal: merged nodes"
            );
        }

        // Links into either merged node are stale; everything past `gone` shifts down.
        let mut stale = vec![keep];
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if i == keep {
                node.nearest = None;
                continue;
            }
            node.nearest = match node.nearest {
                Some((j, _)) if j == gone || j == keep_old => {
                    stale.push(i);
                    None
                }
                Some((j, d)) if j > gone => Some((j - 1, d)),
                other => other,
            };
        }

        // The merged node moved, so it may now be someone's nearest.
        for i in 0..self.nodes.len() {
            if i == keep {
                continue;
            }
            if let Some((_, current)) = self.nodes[i].nearest {
                let d = l2_distance(&self.nodes[i].mean, &self.nodes[keep].mean);
                if d < current {
                    self.nodes[i].nearest = Some((keep, d));
                }
            }
        }

        for i in stale {
            self.nodes[i].nearest = self.scan_nearest(i);
        }
    }

    /// Median nearest-neighbour distance, floored to keep the kernel finite.
    fn bandwidth(&self) -> f64 {
        let mut dists: Vec<f32> = self.nodes.iter().filter_map(|n| n.nearest.map(|(_, d)| d)).collect();
        if dists.is_empty() {
            return 1.0;
        }
        dists.sort_by(|a, b| a.total_cmp(b));
        (dists[dists.len() / 2] as f64).max(f64::EPSILON)
    }
}

impl fmt::Debug for MultiModal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiModal")
            .field("dim", &self.dim)
            .field("max_nodes", &self.max_nodes)
            .field("nodes", &self.nodes.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl ModeStore for MultiModal {
    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn insert(&mut self, v: &[f32]) -> Result<(), ModeError> {
        if v.len() != self.dim {
            return Err(ModeError::DimensionMismatch {
                expected: self.dim,
                got: v.len(),
            });
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(ModeError::NonFinite);
        }

        let idx = self.nodes.len();
        let mut node = Node::new(self.next_id, 1, v.to_vec());
        self.next_id += 1;

        for (j, other) in self.nodes.iter_mut().enumerate() {
            let d = l2_distance(v, &other.mean);
            if other.nearest.is_none_or(|(_, od)| d < od) {
                other.nearest = Some((idx, d));
            }
            if node.nearest.is_none_or(|(_, nd)| d < nd) {
                node.nearest = Some((j, d));
            }
        }
        self.nodes.push(node);
        self.enforce_capacity();
        Ok(())
    }

    fn peaks(&self) -> Vec<Peak> {
        let n = self.nodes.len();
        if n == 0 {
            return Vec::new();
        }

        let bw = self.bandwidth();
        let two_bw2 = 2.0 * bw * bw;
        let radius = LINK_RADIUS * bw;

        let density: Vec<f64> = self
            .nodes
            .iter()
            .map(|a| {
                self.nodes
                    .iter()
                    .map(|b| {
                        let d = l2_distance(&a.mean, &b.mean) as f64;
                        b.count as f64 * (-(d * d) / two_bw2).exp()
                    })
                    .sum()
            })
            .collect();

        let denser = |j: usize, k: usize| {
            density[j] > density[k] || (density[j] == density[k] && self.nodes[j].id < self.nodes[k].id)
        };

        let parent: Vec<usize> = (0..n)
            .map(|i| {
                let mut best = i;
                for j in 0..n {
                    if j != i
                        && denser(j, best)
                        && (l2_distance(&self.nodes[i].mean, &self.nodes[j].mean) as f64) <= radius
                    {
                        best = j;
                    }
                }
                best
            })
            .collect();

        // Parents are strictly denser, so every chain ends at a root.
        let root_of = |mut i: usize| {
            while parent[i] != i {
                i = parent[i];
            }
            i
        };

        let mut basins: HashMap<usize, (Vec<f64>, u64)> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let (sum, count) = basins
                .entry(root_of(i))
                .or_insert_with(|| (vec![0.0; self.dim], 0));
            for (s, &x) in sum.iter_mut().zip(&node.mean) {
                *s += x as f64 * node.count as f64;
            }
            *count += node.count;
        }

        let mut peaks: Vec<Peak> = basins
            .into_iter()
            .map(|(root, (sum, count))| Peak {
                id: self.nodes[root].id,
                mean: sum.iter().map(|&s| (s / count as f64) as f32).collect(),
                count,
            })
            .collect();
        peaks.sort_by_key(|p| p.id);
        peaks
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<u64, ModeError> {
        multimodal_io::save(self, w)
    }

    fn read_from(&mut self, r: &mut dyn Read) -> Result<u64, ModeError> {
        let decoded = multimodal_io::load(r)?;
        if decoded.dim != self.dim {
            return Err(ModeError::DimensionMismatch {
                expected: self.dim,
                got: decoded.dim,
            });
        }
        let read = multimodal_io::encoded_len(decoded.dim, decoded.nodes.len());
        let max_nodes = if self.max_nodes == 0 {
            decoded.max_nodes
        } else {
            self.max_nodes
        };
        *self = MultiModal::from_parts(decoded.dim, max_nodes, decoded.next_id, decoded.nodes);
        debug!(nodes = self.nodes.len(), max_nodes, "multimodal: state loaded");
        Ok(read)
    }
}
