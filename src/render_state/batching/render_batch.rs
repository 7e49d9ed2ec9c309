//! Per-category vertex accumulation.
//!
//! A [`RenderBatch`] appends vertices to a growable byte buffer and cuts it into
//! [`BatchedMesh`] segments whenever the texture changes or the segment reaches its vertex
//! cap. Segments are drawn in the order they were cut.

use super::{
    render_category::RenderCategory,
    vertex::{GuiVertex, StandardVertex, VertexFormat},
};

/// A finished run of vertices sharing one texture.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchedMesh {
    /// Packed vertices in the category's format.
    pub vertex_data: Vec<u8>,
    /// Vertices in `vertex_data`.
    pub vertex_count: u32,
    /// Texture key shared by every vertex, if any.
    pub texture: Option<String>,
    /// Category the segment was cut from.
    pub category: RenderCategory,
}

/// Vertex accumulator for one category.
#[derive(Debug)]
pub struct RenderBatch {
    category: RenderCategory,
    format: VertexFormat,
    max_vertices_per_segment: u32,
    buffer: Vec<u8>,
    vertex_count: u32,
    texture: Option<String>,
    segments: Vec<BatchedMesh>,
}

impl RenderBatch {
    /// # Arguments
    /// * `category` - Category whose vertex format the batch writes
    /// * `initial_capacity` - Buffer size to start with, in vertices
    /// * `max_vertices_per_segment` - Segment length that forces a cut
    pub fn new(category: RenderCategory, initial_capacity: usize, max_vertices_per_segment: u32) -> Self {
        let format = category.vertex_format();
        Self {
            category,
            format,
            max_vertices_per_segment: max_vertices_per_segment.max(1),
            buffer: Vec::with_capacity(initial_capacity.max(1) * format.stride()),
            vertex_count: 0,
            texture: None,
            segments: Vec::new(),
        }
    }

    /// The category this batch collects.
    pub fn category(&self) -> RenderCategory {
        self.category
    }

    /// Layout of the bytes this batch writes.
    pub fn format(&self) -> VertexFormat {
        self.format
    }

    /// Drops all pending and cut geometry.
    pub fn reset(&mut self) {
        self.segments.clear();
        self.buffer.clear();
        self.vertex_count = 0;
        self.texture = None;
    }

    /// Appends a vertex, converting it to the batch's format.
    pub fn add_standard(&mut self, vertex: StandardVertex, texture: Option<&str>) {
        match self.format {
            VertexFormat::Standard => self.push(bytemuck::bytes_of(&vertex), texture),
            VertexFormat::Gui => self.push(bytemuck::bytes_of(&GuiVertex::from(vertex)), texture),
        }
    }

    /// Appends a screen-space vertex, converting it to the batch's format.
    pub fn add_gui(&mut self, vertex: GuiVertex, texture: Option<&str>) {
        match self.format {
            VertexFormat::Gui => self.push(bytemuck::bytes_of(&vertex), texture),
            VertexFormat::Standard => {
                self.push(bytemuck::bytes_of(&StandardVertex::from(vertex)), texture)
            }
        }
    }

    fn push(&mut self, bytes: &[u8], texture: Option<&str>) {
        if self.texture.as_deref() != texture {
            self.cut_segment();
            self.texture = texture.map(str::to_string);
        }
        if self.vertex_count >= self.max_vertices_per_segment {
            self.cut_segment();
        }

        self.ensure_capacity(bytes.len());
        self.buffer.extend_from_slice(bytes);
        self.vertex_count += 1;
    }

    /// Doubles the buffer when less than one vertex of room is left.
    fn ensure_capacity(&mut self, stride: usize) {
        let remaining = self.buffer.capacity() - self.buffer.len();
        if remaining < stride {
            let grow_by = self.buffer.capacity().max(stride);
            self.buffer.reserve_exact(grow_by);
        }
    }

    /// Closes the pending segment, if it has any vertices.
    pub fn cut_segment(&mut self) {
        if self.vertex_count == 0 {
            return;
        }
        // The working buffer keeps its grown capacity; segments are sized to their data.
        let vertex_data = self.buffer.as_slice().to_vec();
        self.buffer.clear();
        self.segments.push(BatchedMesh {
            vertex_data,
            vertex_count: self.vertex_count,
            texture: self.texture.clone(),
            category: self.category,
        });
        self.vertex_count = 0;
    }

    /// Closes the pending segment and takes every segment cut so far.
    pub fn harvest(&mut self) -> Vec<BatchedMesh> {
        self.cut_segment();
        std::mem::take(&mut self.segments)
    }

    /// Whether anything is pending or cut.
    pub fn has_data(&self) -> bool {
        self.vertex_count > 0 || !self.segments.is_empty()
    }

    /// Vertices in the pending segment.
    pub fn pending_vertices(&self) -> u32 {
        self.vertex_count
    }

    /// Bytes the pending buffer can hold before it grows.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(i: u32) -> StandardVertex {
        StandardVertex::new([i as f32, 0.0, 0.0], [0.0, 0.0], i, [0.0, 1.0, 0.0])
    }

    #[test]
    fn texture_change_cuts_a_segment() {
        let mut batch = RenderBatch::new(RenderCategory::Entity, 16, 1024);
        batch.add_standard(vertex(0), Some("a"));
        batch.add_standard(vertex(1), Some("a"));
        batch.add_standard(vertex(2), Some("b"));
        batch.add_standard(vertex(3), None);

        let segments = batch.harvest();
        let summary: Vec<_> = segments
            .iter()
            .map(|s| (s.vertex_count, s.texture.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![(2, Some("a".to_string())), (1, Some("b".to_string())), (1, None)]
        );
        assert!(!batch.has_data());
    }

    #[test]
    fn segment_cap_splits_long_runs() {
        let mut batch = RenderBatch::new(RenderCategory::Particle, 4, 10);
        for i in 0..25 {
            batch.add_standard(vertex(i), Some("smoke"));
        }
        let counts: Vec<u32> = batch.harvest().iter().map(|s| s.vertex_count).collect();
        assert_eq!(counts, vec![10, 10, 5]);
    }

    #[test]
    fn buffer_doubles_and_keeps_bytes() {
        let mut batch = RenderBatch::new(RenderCategory::Item, 2, 1024);
        let mut capacities = vec![batch.buffer_capacity()];
        for i in 0..5 {
            batch.add_standard(vertex(i), None);
            capacities.push(batch.buffer_capacity());
        }
        assert_eq!(capacities, vec![64, 64, 64, 128, 128, 256]);

        let segment = batch.harvest().remove(0);
        let colors: Vec<u32> = segment
            .vertex_data
            .chunks_exact(32)
            .map(|bytes| bytemuck::pod_read_unaligned::<StandardVertex>(bytes).color)
            .collect();
        assert_eq!(colors, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn alternating_textures_size_segments_to_their_data() {
        let mut batch = RenderBatch::new(RenderCategory::Entity, 8192, 65536);
        for i in 0..2000 {
            let texture = if i % 2 == 0 { "a" } else { "b" };
            batch.add_standard(vertex(i), Some(texture));
        }
        let working_capacity = batch.buffer_capacity();

        let segments = batch.harvest();
        let used: usize = segments.iter().map(|s| s.vertex_data.len()).sum();
        let allocated: usize = segments.iter().map(|s| s.vertex_data.capacity()).sum();
        assert_eq!(segments.len(), 2000);
        assert_eq!(used, 2000 * 32);
        assert!(allocated <= used * 2, "{allocated} bytes held for {used} bytes of vertices");
        assert_eq!(batch.buffer_capacity(), working_capacity);
    }

    #[test]
    fn working_buffer_is_reused_after_a_cut() {
        let mut batch = RenderBatch::new(RenderCategory::Item, 2, 1024);
        for i in 0..5 {
            batch.add_standard(vertex(i), Some("a"));
        }
        let grown = batch.buffer_capacity();
        batch.add_standard(vertex(5), Some("b"));
        assert_eq!(batch.buffer_capacity(), grown);
        assert_eq!(batch.pending_vertices(), 1);
    }

    #[test]
    fn gui_batches_write_gui_vertices() {
        let mut batch = RenderBatch::new(RenderCategory::GuiText, 8, 1024);
        batch.add_standard(vertex(7), None);
        batch.add_gui(GuiVertex::new([1.0, 2.0, 0.0], [0.5, 0.5], 9), None);
        let segment = batch.harvest().remove(0);
        assert_eq!(segment.vertex_data.len(), 2 * 24);
        let vertices: Vec<GuiVertex> = segment
            .vertex_data
            .chunks_exact(24)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(vertices[0].color, 7);
        assert_eq!(vertices[1].position, [1.0, 2.0, 0.0]);
    }

    #[test]
    fn reset_discards_everything() {
        let mut batch = RenderBatch::new(RenderCategory::Terrain, 8, 1024);
        batch.add_standard(vertex(0), Some("a"));
        batch.add_standard(vertex(1), Some("b"));
        batch.reset();
        assert!(!batch.has_data());
        assert!(batch.harvest().is_empty());
    }
}
