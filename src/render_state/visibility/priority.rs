//! Upload priority: how urgently a section's mesh should be (re)uploaded.
//!
//! ```text
//! priority = (distance * distance_weight + bfs * bfs_weight) * boost
//! distance = 1 / (1 + dist² / falloff²)
//! bfs      = 1 / (1 + order / order_falloff)   if reached by the latest traversal
//!          = unvisited_bfs_priority            otherwise
//! boost    = gpu_boost if occlusion feedback said visible, else 1
//! ```

use std::cmp::Ordering;

use cgmath::{MetricSpace, Point3};

use crate::{config::TrackerConfig, render_state::sections::{SectionId, SectionState}};

/// The tunables of the priority blend, lifted out of [`TrackerConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorityWeights {
    /// Weight of the distance term.
    pub distance_weight: f64,
    /// Weight of the traversal-order term.
    pub bfs_weight: f64,
    /// Multiplier for sections hardware occlusion saw.
    pub gpu_boost: f64,
    /// Distance in blocks at which the distance term halves.
    pub distance_falloff: f64,
    /// Traversal order at which the order term halves.
    pub bfs_order_falloff: f64,
    /// Order term for sections the traversal did not reach.
    pub unvisited_bfs_priority: f64,
    /// Section edge length in blocks.
    pub section_size: u32,
}

impl From<&TrackerConfig> for PriorityWeights {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            distance_weight: config.distance_weight,
            bfs_weight: config.bfs_weight,
            gpu_boost: config.gpu_boost,
            distance_falloff: config.distance_falloff,
            bfs_order_falloff: config.bfs_order_falloff,
            unvisited_bfs_priority: config.unvisited_bfs_priority,
            section_size: config.section_size,
        }
    }
}

impl PriorityWeights {
    /// Priority of `state` seen from `camera`.
    ///
    /// # Arguments
    /// * `state` - The section being ranked
    /// * `camera` - Camera position in blocks
    /// * `generation` - The traversal whose visit counts as "visited this run"
    pub fn priority(&self, state: &SectionState, camera: Point3<f64>, generation: u64) -> f64 {
        let distance_sq = state
            .origin
            .origin_block(self.section_size)
            .distance2(camera);
        let falloff_sq = self.distance_falloff * self.distance_falloff;
        let distance_priority = 1.0 / (1.0 + distance_sq / falloff_sq);

        let bfs_priority = if state.visited_in(generation) {
            1.0 / (1.0 + state.bfs_order as f64 / self.bfs_order_falloff)
        } else {
            self.unvisited_bfs_priority
        };

        let boost = if state.gpu_confirmed_visible() {
            self.gpu_boost
        } else {
            1.0
        };

        (distance_priority * self.distance_weight + bfs_priority * self.bfs_weight) * boost
    }
}

/// A section waiting for upload, ranked by priority.
#[derive(Clone, Copy, Debug)]
pub struct UploadCandidate {
    /// Packed form of `origin`.
    pub key: u64,
    /// Section to upload.
    pub origin: SectionId,
    /// Higher uploads first.
    pub priority: f64,
}

impl UploadCandidate {
    /// A candidate for `origin`.
    pub fn new(origin: SectionId, priority: f64) -> Self {
        Self {
            key: origin.pack(),
            origin,
            priority,
        }
    }
}

impl PartialEq for UploadCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for UploadCandidate {}

impl PartialOrd for UploadCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UploadCandidate {
    /// Higher priority first; ties go to the lower key so draining is deterministic.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.key.cmp(&self.key))
    }
}
