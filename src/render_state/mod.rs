//! # Render State Module
//!
//! The CPU side of the section render pipeline, owned by a single [`RenderContext`].
//!
//! ## Key Components
//!
//! * `sections` - Section identifiers and the registry of known sections
//! * `visibility` - Asynchronous BFS visibility tracking and upload ranking
//! * `upload` - Single-writer mesh upload scheduler with handle pooling
//! * `batching` - Per-category vertex batching and ordered flushing
//! * `backend` - The opaque handle-based native backend facade
//!
//! ## Architecture
//!
//! Per frame:
//! 1. The camera moves; the tracker re-ranks sections in the background.
//! 2. The renderer drains the top-ranked sections and hands their geometry to the scheduler.
//! 3. Objects emit vertices into the compositor.
//! 4. The compositor flushes every category in priority order to the backend.
//!
//! The tracker and the scheduler each own one worker thread. The compositor lives on the
//! render thread.

pub mod backend;
pub mod batching;
pub mod sections;
pub mod upload;
pub mod visibility;

use std::sync::Arc;

use cgmath::{Matrix4, Point3};
use log::info;

use crate::{config::PipelineConfig, error::PipelineResult};

use backend::{Backend, MeshData, NativeBackend};
use batching::{FrameCompositor, FrameStats};
use sections::SectionId;
use upload::{MeshUploadScheduler, UploadTicket};
use visibility::{VisibilityStats, VisibilityTracker};

/// Owns every pipeline subsystem and the backend they share.
///
/// Construction starts the worker threads; [`shutdown`](Self::shutdown) (or dropping the
/// context) stops them and releases every backend resource.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use cgmath::{Matrix4, Point3, SquareMatrix};
/// use voxel_pipeline::{
///     config::PipelineConfig,
///     render_state::{backend::{Backend, HeadlessBackend, MeshData}, sections::SectionId, RenderContext},
/// };
///
/// let backend = Backend::native(Arc::new(HeadlessBackend::new())).unwrap();
/// let mut context = RenderContext::new(PipelineConfig::default(), backend).unwrap();
///
/// let section = SectionId::new(0, 4, 0);
/// context.register_section(section);
/// context.update_camera(Point3::new(8.0, 64.0, 8.0));
/// assert!(context.tracker().wait_for_idle(Duration::from_secs(5)));
///
/// let uploads = context.schedule_uploads(16, |_| Some(MeshData::new(vec![0; 32], 1, 32)));
/// assert_eq!(uploads.len(), 1);
///
/// context.begin_frame(Matrix4::identity(), Point3::new(8.0, 64.0, 8.0));
/// context.flush_frame();
/// context.shutdown();
/// ```
pub struct RenderContext {
    config: PipelineConfig,
    backend: Backend,
    tracker: VisibilityTracker,
    scheduler: MeshUploadScheduler,
    compositor: FrameCompositor,
    shut_down: bool,
}

impl RenderContext {
    /// Builds every subsystem against `backend`.
    ///
    /// # Errors
    /// Fails if a worker thread cannot be spawned or the batching configuration names an
    /// unknown category.
    pub fn new(config: PipelineConfig, backend: Backend) -> PipelineResult<Self> {
        let tracker = VisibilityTracker::new(config.tracker.clone())?;
        let scheduler = MeshUploadScheduler::new(config.upload.clone(), backend.clone())?;
        let compositor = FrameCompositor::new(&config.batching, backend.clone())?;

        info!("Render context initialized with backend {:?}", backend);

        Ok(Self {
            config,
            backend,
            tracker,
            scheduler,
            compositor,
            shut_down: false,
        })
    }

    /// Builds a context from an optional native backend, falling back to a disabled one.
    ///
    /// # Errors
    /// Same as [`new`](Self::new).
    pub fn probe(
        config: PipelineConfig,
        candidate: Option<Arc<dyn NativeBackend>>,
    ) -> PipelineResult<Self> {
        Self::new(config, Backend::probe(candidate))
    }

    /// The configuration the context was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The backend shared by every subsystem.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The visibility tracker.
    pub fn tracker(&self) -> &VisibilityTracker {
        &self.tracker
    }

    /// The mesh upload scheduler.
    pub fn scheduler(&self) -> &MeshUploadScheduler {
        &self.scheduler
    }

    /// The render thread's compositor, for per-object emission.
    pub fn compositor(&mut self) -> &mut FrameCompositor {
        &mut self.compositor
    }

    /// Starts tracking `section`. Idempotent.
    pub fn register_section(&self, section: SectionId) {
        self.tracker.register_section(section);
    }

    /// Stops tracking `section` and releases its mesh. Idempotent.
    pub fn unregister_section(&self, section: SectionId) {
        self.tracker.unregister_section(section);
        self.scheduler.remove(section);
    }

    /// Feeds a camera position in blocks. Never blocks.
    pub fn update_camera(&self, position: Point3<f64>) {
        self.tracker.update_camera(position);
    }

    /// Hardware occlusion feedback for `section`.
    pub fn mark_visible(&self, section: SectionId, visible: bool) {
        self.tracker.mark_visible(section, visible);
    }

    /// The per-frame culling predicate. `true` for unknown sections.
    pub fn is_section_visible(&self, section: SectionId) -> bool {
        self.tracker.is_likely_visible(section)
    }

    /// Registers `section` and queues its geometry for upload.
    pub fn upload_section_mesh(&self, section: SectionId, mesh: MeshData) -> UploadTicket {
        self.tracker.register_section(section);
        self.scheduler.upload(section, mesh)
    }

    /// Drains up to `max_count` top-ranked sections and queues their geometry.
    ///
    /// `mesh_source` supplies each section's geometry; sections it returns `None` for are
    /// skipped.
    pub fn schedule_uploads(
        &self,
        max_count: usize,
        mut mesh_source: impl FnMut(SectionId) -> Option<MeshData>,
    ) -> Vec<(SectionId, UploadTicket)> {
        self.tracker
            .upload_priorities(max_count)
            .into_iter()
            .filter_map(|section| {
                let mesh = mesh_source(section)?;
                Some((section, self.scheduler.upload(section, mesh)))
            })
            .collect()
    }

    /// Starts a compositor frame.
    pub fn begin_frame(&mut self, view_projection: Matrix4<f32>, camera: Point3<f32>) {
        self.compositor.begin_frame(view_projection, camera);
    }

    /// Flushes the compositor to the backend.
    pub fn flush_frame(&mut self) -> FrameStats {
        self.compositor.flush()
    }

    /// Snapshot of the tracker's counters.
    pub fn visibility_stats(&self) -> VisibilityStats {
        self.tracker.stats()
    }

    /// Stops both workers and releases every backend resource. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.tracker.shutdown();
        self.scheduler.destroy();
        self.compositor.destroy();
        info!("Render context shut down");
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
