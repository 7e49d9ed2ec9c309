//! The bounded breadth-first traversal run by the visibility worker.
//!
//! ## Algorithm
//! Starting from the camera's section, sections are dequeued in BFS order over the
//! 6-connected grid. Each dequeued section that is registered is stamped visible with the
//! next traversal rank and becomes an upload candidate. Expansion stops at:
//! - the vertical band `[min_section_y, max_section_y]`
//! - `max_depth` hops from the start
//! - `sections_per_tick * max_depth` dequeued nodes in total
//!
//! The cancellation token is polled before every dequeue.

use std::collections::{BinaryHeap, HashSet, VecDeque};

use bitvec::vec::BitVec;
use cgmath::Point3;

use crate::{
    config::TrackerConfig,
    core::{CancellationToken, MtResource},
    render_state::sections::{SectionId, SectionRegistry},
};

use super::priority::{PriorityWeights, UploadCandidate};

/// Everything the worker needs to run one traversal.
#[derive(Clone, Debug)]
pub struct TraversalRequest {
    /// Section the camera is in.
    pub start: SectionId,
    /// Camera position in blocks, for distance priority.
    pub camera: Point3<f64>,
    /// Unique, increasing stamp for this traversal.
    pub generation: u64,
    /// Flipped when a newer request supersedes this one.
    pub token: CancellationToken,
}

/// What a completed traversal produced.
#[derive(Debug, Default)]
pub struct TraversalOutcome {
    /// Generation of the request that produced this outcome.
    pub generation: u64,
    /// Registered sections reached, in traversal order.
    pub candidates: Vec<UploadCandidate>,
    /// Nodes dequeued, registered or not.
    pub dequeued: usize,
    /// Deepest hop count dequeued.
    pub deepest: u32,
}

/// Per-run visited set.
///
/// The bit-set is a fast filter indexed by a hash of the packed key. Distant keys may share
/// a bit, so a set bit is confirmed against the exact key set before a neighbor is skipped.
struct VisitedSet {
    bits: BitVec,
    shift: u32,
    exact: HashSet<u64>,
}

impl VisitedSet {
    fn new(bits_log2: u32) -> Self {
        let bits_log2 = bits_log2.clamp(6, 30);
        Self {
            bits: BitVec::repeat(false, 1 << bits_log2),
            shift: 64 - bits_log2,
            exact: HashSet::new(),
        }
    }

    fn clear(&mut self) {
        self.bits.fill(false);
        self.exact.clear();
    }

    /// Marks `key` visited, returning `false` if it already was.
    fn insert(&mut self, key: u64) -> bool {
        let index = (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> self.shift) as usize;
        let seen_bit = self.bits.replace(index, true);
        if seen_bit && self.exact.contains(&key) {
            return false;
        }
        self.exact.insert(key)
    }
}

/// Reusable traversal state owned by the visibility worker.
pub struct Traversal {
    config: TrackerConfig,
    weights: PriorityWeights,
    visited: VisitedSet,
    queue: VecDeque<(SectionId, u32)>,
}

impl Traversal {
    /// A traversal with buffers sized for `config`.
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            config: config.clone(),
            weights: PriorityWeights::from(config),
            visited: VisitedSet::new(config.visited_bits_log2),
            queue: VecDeque::new(),
        }
    }

    fn in_band(&self, section: SectionId) -> bool {
        (self.config.min_section_y..=self.config.max_section_y).contains(&section.y)
    }

    /// Runs one traversal against `sections`.
    ///
    /// # Returns
    /// `None` if the request was cancelled before the traversal finished. Sections stamped
    /// before the cancellation keep their marks until the next completed traversal sweeps
    /// them.
    pub fn run(
        &mut self,
        request: &TraversalRequest,
        sections: &MtResource<SectionRegistry>,
    ) -> Option<TraversalOutcome> {
        self.visited.clear();
        self.queue.clear();

        let node_cap = self.config.node_cap();
        let mut outcome = TraversalOutcome {
            generation: request.generation,
            ..Default::default()
        };
        let mut order = 0u32;

        self.visited.insert(request.start.pack());
        self.queue.push_back((request.start, 0));

        while let Some((section, depth)) = self.queue.pop_front() {
            if request.token.is_cancelled() {
                return None;
            }
            if outcome.dequeued >= node_cap {
                break;
            }
            outcome.dequeued += 1;
            outcome.deepest = outcome.deepest.max(depth);

            if let Some(state) = sections.get_mut().get_mut(section) {
                state.mark_traversed(order, request.generation);
                order += 1;
                let priority = self
                    .weights
                    .priority(state, request.camera, request.generation);
                outcome
                    .candidates
                    .push(UploadCandidate::new(section, priority));
            }

            if depth >= self.config.max_depth {
                continue;
            }
            for neighbor in section.neighbors() {
                if self.in_band(neighbor) && self.visited.insert(neighbor.pack()) {
                    self.queue.push_back((neighbor, depth + 1));
                }
            }
        }

        Some(outcome)
    }
}

/// Makes a completed traversal the visible state.
///
/// The candidate queue is swapped in one write, then every section the traversal did not
/// reach loses its traversal visibility.
pub fn publish(
    outcome: TraversalOutcome,
    candidates: &MtResource<BinaryHeap<UploadCandidate>>,
    sections: &MtResource<SectionRegistry>,
) {
    candidates.replace(BinaryHeap::from(outcome.candidates));

    for state in sections.get_mut().iter_mut() {
        if state.bfs_visible && !state.visited_in(outcome.generation) {
            state.bfs_visible = false;
        }
    }
}
