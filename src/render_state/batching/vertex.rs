//! Vertex formats shared with the native backend.
//!
//! Stride and field order are a wire contract: the backend's shaders read these bytes
//! directly, so both sides must change together.

use bytemuck::{Pod, Zeroable};

/// Which record layout a category's batch is written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexFormat {
    /// [`StandardVertex`], 32 bytes.
    Standard,
    /// [`GuiVertex`], 24 bytes.
    Gui,
}

impl VertexFormat {
    /// Size of one vertex in bytes.
    pub const fn stride(self) -> usize {
        match self {
            VertexFormat::Standard => std::mem::size_of::<StandardVertex>(),
            VertexFormat::Gui => std::mem::size_of::<GuiVertex>(),
        }
    }
}

/// A lit, textured world-space vertex.
///
/// # Memory Layout
/// - Position: 3x f32 (12 bytes)
/// - Texture Coordinates: 2x f32 (8 bytes)
/// - Color: packed RGBA u32 (4 bytes)
/// - Normal: packed 10:10:10 u32 (4 bytes)
/// - Padding: u32 (4 bytes)
///
/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StandardVertex {
    /// Model-transformed position.
    pub position: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
    /// Little-endian RGBA.
    pub color: u32,
    /// Normal packed 10:10:10.
    pub normal: u32,
    _padding: u32,
}

impl StandardVertex {
    /// Creates a vertex, packing `normal` into 10:10:10.
    pub fn new(position: [f32; 3], uv: [f32; 2], color: u32, normal: [f32; 3]) -> Self {
        Self {
            position,
            uv,
            color,
            normal: pack_normal(normal),
            _padding: 0,
        }
    }
}

/// An unlit screen-space vertex.
///
/// # Memory Layout
/// - Position: 3x f32 (12 bytes)
/// - Texture Coordinates: 2x f32 (8 bytes)
/// - Color: packed RGBA u32 (4 bytes)
///
/// Total size: 24 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GuiVertex {
    /// Screen-space position.
    pub position: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
    /// Little-endian RGBA.
    pub color: u32,
}

impl GuiVertex {
    /// Creates a vertex.
    pub fn new(position: [f32; 3], uv: [f32; 2], color: u32) -> Self {
        Self {
            position,
            uv,
            color,
        }
    }
}

impl From<StandardVertex> for GuiVertex {
    fn from(vertex: StandardVertex) -> Self {
        Self::new(vertex.position, vertex.uv, vertex.color)
    }
}

impl From<GuiVertex> for StandardVertex {
    /// Screen-space geometry faces the viewer.
    fn from(vertex: GuiVertex) -> Self {
        Self::new(vertex.position, vertex.uv, vertex.color, [0.0, 0.0, 1.0])
    }
}

/// Packs a unit normal into 10 bits per axis: x in bits 0-9, y in 10-19, z in 20-29.
pub fn pack_normal(normal: [f32; 3]) -> u32 {
    let quantize = |n: f32| (((n * 0.5 + 0.5) * 1023.0) as i32 & 0x3FF) as u32;
    quantize(normal[0]) | (quantize(normal[1]) << 10) | (quantize(normal[2]) << 20)
}

/// Inverse of [`pack_normal`], up to quantization.
pub fn unpack_normal(packed: u32) -> [f32; 3] {
    let dequantize = |bits: u32| (bits & 0x3FF) as f32 / 1023.0 * 2.0 - 1.0;
    [
        dequantize(packed),
        dequantize(packed >> 10),
        dequantize(packed >> 20),
    ]
}

/// Packs 8-bit channels into a little-endian RGBA word.
pub fn pack_color(r: u8, g: u8, b: u8, a: u8) -> u32 {
    u32::from_le_bytes([r, g, b, a])
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn strides_match_the_wire_contract() {
        assert_eq!(VertexFormat::Standard.stride(), 32);
        assert_eq!(VertexFormat::Gui.stride(), 24);
    }

    #[rstest]
    #[case([0.0, 1.0, 0.0], 511 | (1023 << 10) | (511 << 20))]
    #[case([-1.0, 0.0, 1.0], (511 << 10) | (1023 << 20))]
    fn normal_packing(#[case] normal: [f32; 3], #[case] expected: u32) {
        assert_eq!(pack_normal(normal), expected);
    }

    #[test]
    fn unpacked_normal_is_close() {
        let normal = [0.6, -0.8, 0.0];
        let unpacked = unpack_normal(pack_normal(normal));
        for (a, b) in normal.iter().zip(unpacked) {
            assert!((a - b).abs() < 0.01);
        }
    }

    #[test]
    fn color_is_rgba_bytes() {
        let color = pack_color(0x11, 0x22, 0x33, 0x44);
        assert_eq!(color.to_le_bytes(), [0x11, 0x22, 0x33, 0x44]);
    }
}
