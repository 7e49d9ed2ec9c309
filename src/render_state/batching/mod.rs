//! # Frame Batch Compositor
//!
//! Turns per-object immediate-mode vertex emission into a small number of backend
//! submissions per frame.
//!
//! ## Architecture
//! - One [`RenderBatch`] per [`RenderCategory`]. Vertices are transformed by the current
//!   [`TransformState`] on the way in and appended to their category's batch.
//! - A batch cuts a segment whenever the texture key changes or the segment reaches
//!   `max_vertices_per_segment`.
//! - [`FrameCompositor::flush`] walks the categories in fixed priority order and issues one
//!   `begin_pass` / `draw_mesh`-per-segment / `end_pass` sequence per non-empty category.
//!   Texture keys are resolved through an LRU [`TextureCache`]; unknown keys draw untextured.
//!
//! ## Threading
//! The compositor belongs to the render thread and is not shared. Nothing here locks.
//!
//! ## Frame Lifecycle
//! ```text
//! begin_frame -> (set_transform -> add_vertex | begin_object ... finish)* -> flush
//! ```

pub mod object_emitter;
pub mod render_batch;
pub mod render_category;
pub mod texture_cache;
pub mod transform;
pub mod vertex;

use std::fmt;

use cgmath::{Matrix3, Matrix4, Point3, SquareMatrix};
use log::{debug, info, warn};

use crate::{
    config::BatchConfig,
    error::PipelineResult,
    render_state::backend::Backend,
};

pub use object_emitter::ObjectEmitter;
pub use render_batch::{BatchedMesh, RenderBatch};
pub use render_category::{CategorySet, RenderCategory};
pub use texture_cache::TextureCache;
pub use transform::TransformState;
pub use vertex::{GuiVertex, StandardVertex, VertexFormat};

/// What one [`FrameCompositor::flush`] submitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, counted by `begin_frame`.
    pub frame: u64,
    /// Vertices drawn.
    pub vertices: u64,
    /// Segments drawn.
    pub segments: u32,
    /// Passes begun.
    pub passes: u32,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame {} flushed: {} vertices in {} segments over {} passes",
            self.frame, self.vertices, self.segments, self.passes
        )
    }
}

/// Per-category vertex batching with ordered multi-pass flushing.
pub struct FrameCompositor {
    backend: Backend,
    batches: Vec<RenderBatch>,
    flush_order: [RenderCategory; RenderCategory::COUNT],
    enabled: CategorySet,
    transform: TransformState,
    textures: TextureCache,
    view_projection: [f32; 16],
    camera: [f32; 4],
    frame: u64,
    stats_log_interval: u64,
    last_stats: FrameStats,
}

impl FrameCompositor {
    /// Creates a compositor with one empty batch per category.
    ///
    /// # Errors
    /// Returns [`PipelineError::UnknownCategory`](crate::error::PipelineError::UnknownCategory)
    /// if `disabled_categories` names a category that does not exist.
    pub fn new(config: &BatchConfig, backend: Backend) -> PipelineResult<Self> {
        let enabled = config.enabled_categories()?;
        let batches = RenderCategory::ALL
            .into_iter()
            .map(|category| {
                RenderBatch::new(
                    category,
                    config.initial_vertex_capacity,
                    config.max_vertices_per_segment,
                )
            })
            .collect();

        Ok(Self {
            backend,
            batches,
            flush_order: RenderCategory::flush_order(),
            enabled,
            transform: TransformState::identity(),
            textures: TextureCache::new(config.texture_cache_capacity),
            view_projection: column_major(Matrix4::identity()),
            camera: [0.0, 0.0, 0.0, 1.0],
            frame: 0,
            stats_log_interval: config.stats_log_interval.max(1),
            last_stats: FrameStats::default(),
        })
    }

    /// Starts a frame: clears every batch and resets the transform to identity.
    pub fn begin_frame(&mut self, view_projection: Matrix4<f32>, camera: Point3<f32>) {
        self.frame += 1;
        self.view_projection = column_major(view_projection);
        self.camera = [camera.x, camera.y, camera.z, 1.0];
        for batch in &mut self.batches {
            batch.reset();
        }
        self.transform = TransformState::identity();
    }

    /// Sets the model transform; the normal matrix is derived from it.
    pub fn set_transform(&mut self, model: Matrix4<f32>) {
        self.transform.set(model);
    }

    /// Sets the model transform with an explicit normal matrix.
    pub fn set_transform_with_normal(&mut self, model: Matrix4<f32>, normal: Matrix3<f32>) {
        self.transform.set_with_normal(model, normal);
    }

    /// Back to the identity transform.
    pub fn reset_transform(&mut self) {
        self.transform = TransformState::identity();
    }

    /// The transform applied to emitted vertices.
    pub fn transform(&self) -> &TransformState {
        &self.transform
    }

    /// Emits one model-space vertex into `category`.
    ///
    /// # Arguments
    /// * `position` - Model-space position, transformed by the model matrix
    /// * `uv` - Texture coordinates
    /// * `color` - Packed RGBA color
    /// * `normal` - Model-space normal, transformed by the normal matrix and renormalized
    /// * `texture` - Texture key; `None` draws untextured
    pub fn add_vertex(
        &mut self,
        category: RenderCategory,
        position: [f32; 3],
        uv: [f32; 2],
        color: u32,
        normal: [f32; 3],
        texture: Option<&str>,
    ) {
        let vertex = StandardVertex::new(
            self.transform.transform_position(position),
            uv,
            color,
            self.transform.transform_normal(normal),
        );
        self.batches[category as usize].add_standard(vertex, texture);
    }

    /// Emits one screen-space vertex, bypassing the model transform.
    pub fn add_gui_vertex(
        &mut self,
        category: RenderCategory,
        position: [f32; 3],
        uv: [f32; 2],
        color: u32,
        texture: Option<&str>,
    ) {
        self.batches[category as usize].add_gui(GuiVertex::new(position, uv, color), texture);
    }

    /// Starts an attribute-stream object in `category`.
    pub fn begin_object(&mut self, category: RenderCategory, texture: Option<&str>) -> ObjectEmitter<'_> {
        ObjectEmitter::new(self, category, texture)
    }

    /// The pending batch of `category`.
    pub fn batch(&self, category: RenderCategory) -> &RenderBatch {
        &self.batches[category as usize]
    }

    /// Submits every non-empty category in priority order.
    ///
    /// Disabled categories have their geometry discarded. If the backend is disabled,
    /// or fails to begin a pass, everything pending is discarded; a failed pass also
    /// disables the backend for the rest of the compositor's life.
    pub fn flush(&mut self) -> FrameStats {
        let mut stats = FrameStats {
            frame: self.frame,
            ..Default::default()
        };

        for category in self.flush_order {
            let batch = &mut self.batches[category as usize];
            if !batch.has_data() {
                continue;
            }
            let segments = batch.harvest();
            if !self.enabled.contains(category) {
                continue;
            }
            let Some(native) = self.backend.as_native().cloned() else {
                continue;
            };

            if let Err(err) = native.begin_pass(&self.view_projection, self.camera) {
                warn!("Native pass unavailable, compositor disabled: {err}");
                self.backend = Backend::Disabled;
                continue;
            }
            stats.passes += 1;

            for segment in &segments {
                if segment.vertex_count == 0 {
                    continue;
                }
                let texture = segment
                    .texture
                    .as_deref()
                    .map_or(0, |key| self.textures.resolve(native.as_ref(), key));
                native.draw_mesh(0, &segment.vertex_data, segment.vertex_count, texture);
                stats.vertices += segment.vertex_count as u64;
                stats.segments += 1;
            }

            native.end_pass();
        }

        if self.frame <= 10 || self.frame % self.stats_log_interval == 0 {
            info!("{stats}");
        } else {
            debug!("{stats}");
        }

        self.last_stats = stats;
        stats
    }

    /// Frames begun so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Stats of the most recent flush.
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Resolved texture handles.
    pub fn texture_cache(&self) -> &TextureCache {
        &self.textures
    }

    /// Discards all batches and detaches the backend.
    pub fn destroy(&mut self) {
        for batch in &mut self.batches {
            batch.reset();
        }
        self.textures.clear();
        self.backend = Backend::Disabled;
    }
}

fn column_major(matrix: Matrix4<f32>) -> [f32; 16] {
    let columns: &[f32; 16] = matrix.as_ref();
    *columns
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cgmath::Vector3;

    use super::*;
    use crate::render_state::backend::{BackendCall, HeadlessBackend};

    fn compositor_with(config: BatchConfig) -> (Arc<HeadlessBackend>, FrameCompositor) {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(HeadlessBackend::new().with_texture("stone", 5));
        let compositor = FrameCompositor::new(&config, Backend::native(backend.clone()).unwrap())
            .unwrap();
        (backend, compositor)
    }

    fn emit(compositor: &mut FrameCompositor, category: RenderCategory, count: u32, texture: Option<&str>) {
        for i in 0..count {
            compositor.add_vertex(category, [i as f32, 0.0, 0.0], [0.0, 0.0], u32::MAX, [0.0, 1.0, 0.0], texture);
        }
    }

    fn begin(compositor: &mut FrameCompositor) {
        compositor.begin_frame(Matrix4::identity(), Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn draws_are_bracketed_by_passes() {
        let (backend, mut compositor) = compositor_with(BatchConfig::default());
        begin(&mut compositor);
        emit(&mut compositor, RenderCategory::Entity, 3, Some("stone"));
        emit(&mut compositor, RenderCategory::Entity, 2, Some("missing"));
        let stats = compositor.flush();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::BeginPass {
                    camera: [0.0, 0.0, 0.0, 1.0]
                },
                BackendCall::DrawMesh {
                    mesh: 0,
                    vertex_count: 3,
                    byte_len: 96,
                    texture: 5
                },
                BackendCall::DrawMesh {
                    mesh: 0,
                    vertex_count: 2,
                    byte_len: 64,
                    texture: 0
                },
                BackendCall::EndPass,
            ]
        );
        assert_eq!(
            stats,
            FrameStats {
                frame: 1,
                vertices: 5,
                segments: 2,
                passes: 1
            }
        );
    }

    #[test]
    fn transform_applies_to_positions() {
        let (_, mut compositor) = compositor_with(BatchConfig::default());
        begin(&mut compositor);
        compositor.set_transform(Matrix4::from_translation(Vector3::new(0.0, 10.0, 0.0)));
        emit(&mut compositor, RenderCategory::Item, 1, None);

        let batch = &mut compositor.batches[RenderCategory::Item as usize];
        let segment = batch.harvest().remove(0);
        let vertex: StandardVertex = bytemuck::pod_read_unaligned(&segment.vertex_data);
        assert_eq!(vertex.position, [0.0, 10.0, 0.0]);
    }

    #[test]
    fn begin_frame_clears_batches_and_transform() {
        let (backend, mut compositor) = compositor_with(BatchConfig::default());
        begin(&mut compositor);
        compositor.set_transform(Matrix4::from_scale(3.0));
        emit(&mut compositor, RenderCategory::Terrain, 4, None);

        begin(&mut compositor);
        assert!(!compositor.batch(RenderCategory::Terrain).has_data());
        assert_eq!(*compositor.transform(), TransformState::identity());
        assert_eq!(compositor.flush().passes, 0);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn disabled_categories_are_discarded() {
        let (backend, mut compositor) = compositor_with(BatchConfig {
            disabled_categories: vec!["particle".into()],
            ..Default::default()
        });
        begin(&mut compositor);
        emit(&mut compositor, RenderCategory::Particle, 5, None);
        emit(&mut compositor, RenderCategory::Sky, 1, None);
        let stats = compositor.flush();

        assert_eq!(stats.passes, 1);
        assert_eq!(stats.vertices, 1);
        assert!(!compositor.batch(RenderCategory::Particle).has_data());
        assert_eq!(backend.calls().len(), 3);
    }

    #[test]
    fn object_emitter_feeds_its_category() {
        let (_, mut compositor) = compositor_with(BatchConfig::default());
        begin(&mut compositor);
        let mut object = compositor.begin_object(RenderCategory::BlockEntity, Some("stone"));
        object.vertex(0.0, 0.0, 0.0).color(1, 2, 3, 4);
        object.vertex(1.0, 0.0, 0.0);
        object.vertex(1.0, 1.0, 0.0).uv(1.0, 1.0);
        assert_eq!(object.finish(), 3);

        let batch = compositor.batch(RenderCategory::BlockEntity);
        assert_eq!(batch.pending_vertices(), 3);
    }

    #[test]
    fn disabled_backend_discards_quietly() {
        let mut compositor = FrameCompositor::new(&BatchConfig::default(), Backend::Disabled).unwrap();
        begin(&mut compositor);
        emit(&mut compositor, RenderCategory::Terrain, 3, None);
        assert_eq!(compositor.flush(), FrameStats { frame: 1, ..Default::default() });
        assert!(!compositor.batch(RenderCategory::Terrain).has_data());
    }

    #[test]
    fn destroy_detaches_backend() {
        let (backend, mut compositor) = compositor_with(BatchConfig::default());
        begin(&mut compositor);
        emit(&mut compositor, RenderCategory::Gui, 3, None);
        compositor.destroy();
        emit(&mut compositor, RenderCategory::Gui, 3, None);
        compositor.flush();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn unknown_disabled_category_fails_construction() {
        let config = BatchConfig {
            disabled_categories: vec!["lava".into()],
            ..Default::default()
        };
        assert!(FrameCompositor::new(&config, Backend::Disabled).is_err());
    }
}
