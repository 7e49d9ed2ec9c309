//! Section grid coordinates and their packed form.

use std::fmt;

use cgmath::Point3;

/// Identifies a fixed-size cube of world space by its grid coordinates.
///
/// A `SectionId` is measured in sections, not blocks: section `(1, 0, 0)` covers blocks
/// `16..32` on the x axis with the default section size.
///
/// # Packing
/// [`pack`](Self::pack) squeezes the three coordinates into a `u64` for hashing and bit-set
/// indexing:
/// - x: 22 bits (bits 42..64)
/// - z: 22 bits (bits 20..42)
/// - y: 20 bits (bits 0..20)
///
/// Coordinates inside those ranges round-trip exactly through [`unpack`](Self::unpack).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId {
    /// Grid x coordinate
    pub x: i32,
    /// Grid y coordinate (vertical)
    pub y: i32,
    /// Grid z coordinate
    pub z: i32,
}

impl SectionId {
    const XZ_BITS: u32 = 22;
    const Y_BITS: u32 = 20;
    const XZ_MASK: u64 = (1 << Self::XZ_BITS) - 1;
    const Y_MASK: u64 = (1 << Self::Y_BITS) - 1;
    const X_SHIFT: u32 = Self::Y_BITS + Self::XZ_BITS;
    const Z_SHIFT: u32 = Self::Y_BITS;

    /// Offsets to the six face-adjacent sections.
    pub const NEIGHBOR_OFFSETS: [(i32, i32, i32); 6] = [
        (1, 0, 0),
        (-1, 0, 0),
        (0, 1, 0),
        (0, -1, 0),
        (0, 0, 1),
        (0, 0, -1),
    ];

    /// A section from grid coordinates.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The section containing the world-space point `pos`.
    ///
    /// # Arguments
    /// * `pos` - A position in blocks
    /// * `section_size` - Edge length of a section in blocks
    pub fn containing(pos: Point3<f64>, section_size: u32) -> Self {
        let size = section_size.max(1) as f64;
        Self::new(
            (pos.x / size).floor() as i32,
            (pos.y / size).floor() as i32,
            (pos.z / size).floor() as i32,
        )
    }

    /// Packs the coordinates into a single integer.
    pub fn pack(self) -> u64 {
        ((self.x as u64 & Self::XZ_MASK) << Self::X_SHIFT)
            | ((self.z as u64 & Self::XZ_MASK) << Self::Z_SHIFT)
            | (self.y as u64 & Self::Y_MASK)
    }

    /// Inverse of [`pack`](Self::pack), sign-extending each field.
    pub fn unpack(packed: u64) -> Self {
        let x = (packed as i64) >> Self::X_SHIFT;
        let z = ((packed << (64 - Self::X_SHIFT)) as i64) >> (64 - Self::XZ_BITS);
        let y = ((packed << (64 - Self::Y_BITS)) as i64) >> (64 - Self::Y_BITS);
        Self::new(x as i32, y as i32, z as i32)
    }

    /// The six face-adjacent sections.
    pub fn neighbors(self) -> impl Iterator<Item = SectionId> {
        Self::NEIGHBOR_OFFSETS
            .into_iter()
            .map(move |(dx, dy, dz)| self.offset(dx, dy, dz))
    }

    /// The section `(dx, dy, dz)` steps away.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.x.wrapping_add(dx),
            self.y.wrapping_add(dy),
            self.z.wrapping_add(dz),
        )
    }

    /// Number of face-adjacent hops between two sections.
    pub fn hops_to(self, other: SectionId) -> u64 {
        (self.x as i64 - other.x as i64).unsigned_abs()
            + (self.y as i64 - other.y as i64).unsigned_abs()
            + (self.z as i64 - other.z as i64).unsigned_abs()
    }

    /// The minimum corner of the section, in blocks.
    pub fn origin_block(self, section_size: u32) -> Point3<f64> {
        let size = section_size as f64;
        Point3::new(self.x as f64 * size, self.y as f64 * size, self.z as f64 * size)
    }
}

impl From<(i32, i32, i32)> for SectionId {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(SectionId::new(0, 0, 0))]
    #[case(SectionId::new(-1, -4, -1))]
    #[case(SectionId::new(1_000, 20, -2_000_000))]
    #[case(SectionId::new(-2_097_152, -524_288, 2_097_151))]
    fn pack_unpack_within_range(#[case] id: SectionId) {
        assert_eq!(SectionId::unpack(id.pack()), id);
    }

    #[test]
    fn distinct_neighbors_pack_distinctly() {
        let center = SectionId::new(5, -3, 9);
        let mut packed: Vec<u64> = center.neighbors().map(SectionId::pack).collect();
        packed.push(center.pack());
        packed.sort_unstable();
        packed.dedup();
        assert_eq!(packed.len(), 7);
    }

    #[rstest]
    #[case(Point3::new(8.0, 64.0, 8.0), SectionId::new(0, 4, 0))]
    #[case(Point3::new(-0.5, 15.99, 16.0), SectionId::new(-1, 0, 1))]
    #[case(Point3::new(-16.0, -17.0, 31.0), SectionId::new(-1, -2, 1))]
    fn camera_section_floors(#[case] pos: Point3<f64>, #[case] expected: SectionId) {
        assert_eq!(SectionId::containing(pos, 16), expected);
    }

    #[test]
    fn hops_are_manhattan() {
        let a = SectionId::new(0, 0, 0);
        assert_eq!(a.hops_to(SectionId::new(1, -2, 3)), 6);
        assert!(a.neighbors().all(|n| a.hops_to(n) == 1));
    }
}
