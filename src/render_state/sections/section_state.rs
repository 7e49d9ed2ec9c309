//! Per-section visibility record.

use super::SectionId;

/// Visibility bookkeeping for one registered section.
///
/// Written only by the traversal worker and by hardware occlusion feedback; everything else
/// sees copies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectionState {
    /// The section this record describes.
    pub origin: SectionId,
    /// Reached by the most recent traversal.
    pub bfs_visible: bool,
    /// Last hardware occlusion verdict. Starts `true` until feedback arrives.
    pub gpu_visible: bool,
    /// Whether any hardware occlusion verdict has arrived yet.
    pub gpu_feedback: bool,
    /// Rank in the traversal that last reached this section. Lower is closer.
    pub bfs_order: u32,
    /// Generation of the traversal that last reached this section. `0` means never.
    pub last_bfs_generation: u64,
    /// Camera-update frame of the last hardware occlusion verdict.
    pub last_gpu_check_frame: u64,
}

impl SectionState {
    /// A fresh record: not yet traversed, visible to hardware until told otherwise.
    pub fn new(origin: SectionId) -> Self {
        Self {
            origin,
            bfs_visible: false,
            gpu_visible: true,
            gpu_feedback: false,
            bfs_order: 0,
            last_bfs_generation: 0,
            last_gpu_check_frame: 0,
        }
    }

    /// Whether either visibility source currently vouches for the section.
    pub fn is_likely_visible(&self) -> bool {
        self.bfs_visible || self.gpu_visible
    }

    /// Whether the traversal with `generation` reached this section.
    pub fn visited_in(&self, generation: u64) -> bool {
        generation != 0 && self.last_bfs_generation == generation
    }

    /// Records a traversal visit.
    pub fn mark_traversed(&mut self, order: u32, generation: u64) {
        self.bfs_visible = true;
        self.bfs_order = order;
        self.last_bfs_generation = generation;
    }

    /// Records a hardware occlusion verdict. Last write wins.
    pub fn mark_gpu(&mut self, visible: bool, frame: u64) {
        self.gpu_visible = visible;
        self.gpu_feedback = true;
        self.last_gpu_check_frame = frame;
    }

    /// Whether the gpu priority boost applies.
    pub fn gpu_confirmed_visible(&self) -> bool {
        self.gpu_feedback && self.gpu_visible
    }
}
