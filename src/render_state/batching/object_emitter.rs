//! Attribute-stream vertex emission for one object at a time.

use super::{render_category::RenderCategory, vertex::pack_color, FrameCompositor};

#[derive(Clone, Copy, Debug)]
struct PendingVertex {
    position: [f32; 3],
    uv: [f32; 2],
    color: u32,
    normal: [f32; 3],
}

impl PendingVertex {
    fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            uv: [0.0, 0.0],
            color: u32::MAX,
            normal: [0.0, 1.0, 0.0],
        }
    }
}

/// Attribute-stream feed for one object's geometry.
///
/// [`vertex`](Self::vertex) starts a vertex; `color`, `uv` and `normal` set attributes of
/// the current one. A vertex is committed when the next one starts or when
/// [`finish`](Self::finish) is called. Attributes not given default to opaque white, no
/// texture coordinates and an up-facing normal. Dropping the emitter without `finish`
/// discards the uncommitted vertex.
///
/// ```
/// use voxel_pipeline::render_state::{
///     backend::Backend,
///     batching::{render_category::RenderCategory, FrameCompositor},
/// };
/// use voxel_pipeline::config::BatchConfig;
///
/// let mut compositor = FrameCompositor::new(&BatchConfig::default(), Backend::Disabled).unwrap();
/// let mut object = compositor.begin_object(RenderCategory::Entity, Some("zombie"));
/// object.vertex(0.0, 0.0, 0.0).uv(0.0, 0.0).normal(0.0, 0.0, 1.0);
/// object.vertex(1.0, 0.0, 0.0).uv(1.0, 0.0).color(255, 0, 0, 255);
/// assert_eq!(object.finish(), 2);
/// ```
pub struct ObjectEmitter<'a> {
    compositor: &'a mut FrameCompositor,
    category: RenderCategory,
    texture: Option<String>,
    current: Option<PendingVertex>,
    emitted: u32,
}

impl<'a> ObjectEmitter<'a> {
    pub(super) fn new(
        compositor: &'a mut FrameCompositor,
        category: RenderCategory,
        texture: Option<&str>,
    ) -> Self {
        Self {
            compositor,
            category,
            texture: texture.map(str::to_string),
            current: None,
            emitted: 0,
        }
    }

    fn commit(&mut self) {
        if let Some(v) = self.current.take() {
            self.compositor.add_vertex(
                self.category,
                v.position,
                v.uv,
                v.color,
                v.normal,
                self.texture.as_deref(),
            );
            self.emitted += 1;
        }
    }

    /// Starts a new vertex at `(x, y, z)` in model space.
    pub fn vertex(&mut self, x: f32, y: f32, z: f32) -> &mut Self {
        self.commit();
        self.current = Some(PendingVertex::at([x, y, z]));
        self
    }

    /// Sets the color of the current vertex from 8-bit channels.
    pub fn color(&mut self, r: u8, g: u8, b: u8, a: u8) -> &mut Self {
        self.color_packed(pack_color(r, g, b, a))
    }

    /// Sets the color of the current vertex from a packed RGBA word.
    pub fn color_packed(&mut self, color: u32) -> &mut Self {
        if let Some(v) = self.current.as_mut() {
            v.color = color;
        }
        self
    }

    /// Sets the texture coordinate of the current vertex.
    pub fn uv(&mut self, u: f32, v: f32) -> &mut Self {
        if let Some(vertex) = self.current.as_mut() {
            vertex.uv = [u, v];
        }
        self
    }

    /// Sets the model-space normal of the current vertex.
    pub fn normal(&mut self, x: f32, y: f32, z: f32) -> &mut Self {
        if let Some(v) = self.current.as_mut() {
            v.normal = [x, y, z];
        }
        self
    }

    /// Commits the last vertex and ends the object.
    ///
    /// # Returns
    /// Number of vertices the object emitted.
    pub fn finish(mut self) -> u32 {
        self.commit();
        self.emitted
    }
}
