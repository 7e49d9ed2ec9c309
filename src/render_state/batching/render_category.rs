//! # Render Categories
//!
//! The closed set of geometry kinds the compositor batches. Each category carries fixed
//! pipeline attributes from a static table; nothing about a category is per-instance state.
//!
//! ## Flush Order
//! Categories are submitted by ascending [`RenderCategory::priority`]:
//!
//! ```text
//! sky < terrain < block_entity < entity < entity_translucent < item < particle
//!     < weather < world_border < outline < gui < gui_text < debug
//! ```

use std::fmt;

use num_derive::{FromPrimitive, ToPrimitive};
use phf::phf_map;

use crate::error::{PipelineError, PipelineResult};

use super::vertex::VertexFormat;

/// Geometry kinds, each with fixed depth, blend and ordering attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum RenderCategory {
    /// World terrain.
    Terrain,
    /// Opaque entity models.
    Entity,
    /// Entity models with translucency.
    EntityTranslucent,
    /// Block entities such as chests and signs.
    BlockEntity,
    /// Held, dropped and framed items.
    Item,
    /// Screen-space interface elements.
    Gui,
    /// Screen-space text.
    GuiText,
    /// Particles.
    Particle,
    /// Debug overlays.
    Debug,
    /// Sky, sun, moon and stars.
    Sky,
    /// Rain and snow.
    Weather,
    /// The world border effect.
    WorldBorder,
    /// Entity glow and selection outlines.
    Outline,
}

/// Fixed pipeline attributes of a category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CategoryAttributes {
    pub uses_depth: bool,
    /// Writes to the depth buffer.
    pub writes_depth: bool,
    pub uses_blending: bool,
    /// Flush position; lower draws first.
    pub priority: u32,
    /// Vertex layout of the category's batches.
    pub format: VertexFormat,
}

const fn attributes(
    uses_depth: bool,
    writes_depth: bool,
    uses_blending: bool,
    priority: u32,
    format: VertexFormat,
) -> CategoryAttributes {
    CategoryAttributes {
        uses_depth,
        writes_depth,
        uses_blending,
        priority,
        format,
    }
}

/// Indexed by `RenderCategory as usize`.
const ATTRIBUTES: [CategoryAttributes; RenderCategory::COUNT] = [
    attributes(true, true, false, 10, VertexFormat::Standard),   // Terrain
    attributes(true, true, true, 30, VertexFormat::Standard),    // Entity
    attributes(true, false, true, 35, VertexFormat::Standard),   // EntityTranslucent
    attributes(true, true, true, 20, VertexFormat::Standard),    // BlockEntity
    attributes(true, true, true, 40, VertexFormat::Standard),    // Item
    attributes(false, false, true, 100, VertexFormat::Gui),      // Gui
    attributes(false, false, true, 110, VertexFormat::Gui),      // GuiText
    attributes(true, false, true, 50, VertexFormat::Standard),   // Particle
    attributes(false, false, true, 120, VertexFormat::Standard), // Debug
    attributes(true, false, true, 0, VertexFormat::Standard),    // Sky
    attributes(true, false, true, 60, VertexFormat::Standard),   // Weather
    attributes(true, false, true, 70, VertexFormat::Standard),   // WorldBorder
    attributes(false, false, true, 80, VertexFormat::Standard),  // Outline
];

static CATEGORY_NAMES: phf::Map<&'static str, RenderCategory> = phf_map! {
    "terrain" => RenderCategory::Terrain,
    "entity" => RenderCategory::Entity,
    "entity_translucent" => RenderCategory::EntityTranslucent,
    "block_entity" => RenderCategory::BlockEntity,
    "item" => RenderCategory::Item,
    "gui" => RenderCategory::Gui,
    "gui_text" => RenderCategory::GuiText,
    "particle" => RenderCategory::Particle,
    "debug" => RenderCategory::Debug,
    "sky" => RenderCategory::Sky,
    "weather" => RenderCategory::Weather,
    "world_border" => RenderCategory::WorldBorder,
    "outline" => RenderCategory::Outline,
};

impl RenderCategory {
    /// Number of categories.
    pub const COUNT: usize = 13;

    /// Every category, in declaration order.
    pub const ALL: [RenderCategory; Self::COUNT] = [
        RenderCategory::Terrain,
        RenderCategory::Entity,
        RenderCategory::EntityTranslucent,
        RenderCategory::BlockEntity,
        RenderCategory::Item,
        RenderCategory::Gui,
        RenderCategory::GuiText,
        RenderCategory::Particle,
        RenderCategory::Debug,
        RenderCategory::Sky,
        RenderCategory::Weather,
        RenderCategory::WorldBorder,
        RenderCategory::Outline,
    ];

    /// Every category, in flush order.
    pub fn flush_order() -> [RenderCategory; Self::COUNT] {
        let mut order = Self::ALL;
        order.sort_by_key(|category| category.priority());
        order
    }

    /// Looks a category up by name. Case-insensitive; `-` and `_` are interchangeable.
    pub fn from_name(name: &str) -> PipelineResult<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        CATEGORY_NAMES
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| PipelineError::UnknownCategory(name.to_string()))
    }

    /// Looks a category up by its integer tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(tag)
    }

    /// The integer tag of this category.
    pub fn tag(self) -> u8 {
        num_traits::ToPrimitive::to_u8(&self).unwrap_or_default()
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        CATEGORY_NAMES
            .entries()
            .find(|(_, category)| **category == self)
            .map_or("unknown", |(name, _)| *name)
    }

    /// Static drawing attributes.
    pub fn attributes(self) -> &'static CategoryAttributes {
        &ATTRIBUTES[self as usize]
    }

    /// Whether the category is depth tested.
    pub fn uses_depth(self) -> bool {
        self.attributes().uses_depth
    }

    /// Whether the category writes depth.
    pub fn writes_depth(self) -> bool {
        self.attributes().writes_depth
    }

    /// Whether the category is alpha blended.
    pub fn uses_blending(self) -> bool {
        self.attributes().uses_blending
    }

    /// Whether this category draws after terrain.
    pub fn is_post_terrain(self) -> bool {
        !matches!(self, RenderCategory::Terrain | RenderCategory::Sky)
    }

    /// Flush priority. Lower is earlier.
    pub fn priority(self) -> u32 {
        self.attributes().priority
    }

    /// Vertex layout of the category.
    pub fn vertex_format(self) -> VertexFormat {
        self.attributes().format
    }
}

impl fmt::Display for RenderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of categories, one bit each.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CategorySet(u16);

impl CategorySet {
    /// No categories.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every category.
    pub const fn all() -> Self {
        Self((1 << RenderCategory::COUNT) - 1)
    }

    /// Adds `category`.
    pub fn insert(&mut self, category: RenderCategory) {
        self.0 |= 1 << category as u16;
    }

    /// Removes `category`.
    pub fn remove(&mut self, category: RenderCategory) {
        self.0 &= !(1 << category as u16);
    }

    /// Whether `category` is in the set.
    pub fn contains(self, category: RenderCategory) -> bool {
        self.0 & (1 << category as u16) != 0
    }

    /// Members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = RenderCategory> {
        RenderCategory::ALL
            .into_iter()
            .filter(move |category| self.contains(*category))
    }
}

impl FromIterator<RenderCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = RenderCategory>>(iter: I) -> Self {
        let mut set = Self::empty();
        for category in iter {
            set.insert(category);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn flush_order_is_fixed() {
        use RenderCategory::*;
        assert_eq!(
            RenderCategory::flush_order(),
            [
                Sky,
                Terrain,
                BlockEntity,
                Entity,
                EntityTranslucent,
                Item,
                Particle,
                Weather,
                WorldBorder,
                Outline,
                Gui,
                GuiText,
                Debug
            ]
        );
    }

    #[rstest]
    #[case(RenderCategory::Terrain, true, true, false)]
    #[case(RenderCategory::EntityTranslucent, true, false, true)]
    #[case(RenderCategory::Gui, false, false, true)]
    #[case(RenderCategory::Outline, false, false, true)]
    #[case(RenderCategory::Sky, true, false, true)]
    #[case(RenderCategory::Item, true, true, true)]
    fn attribute_table(
        #[case] category: RenderCategory,
        #[case] depth: bool,
        #[case] writes: bool,
        #[case] blend: bool,
    ) {
        assert_eq!(category.uses_depth(), depth);
        assert_eq!(category.writes_depth(), writes);
        assert_eq!(category.uses_blending(), blend);
    }

    #[test]
    fn names_and_tags_round_trip() {
        for category in RenderCategory::ALL {
            assert_eq!(RenderCategory::from_name(category.name()).unwrap(), category);
            assert_eq!(RenderCategory::from_tag(category.tag()), Some(category));
        }
        assert_eq!(
            RenderCategory::from_name("World-Border").unwrap(),
            RenderCategory::WorldBorder
        );
        assert!(RenderCategory::from_tag(13).is_none());
    }

    #[test]
    fn only_terrain_and_sky_precede_terrain() {
        let pre: Vec<_> = RenderCategory::ALL
            .into_iter()
            .filter(|c| !c.is_post_terrain())
            .collect();
        assert_eq!(pre, vec![RenderCategory::Terrain, RenderCategory::Sky]);
    }

    #[test]
    fn category_set_membership() {
        let mut set = CategorySet::all();
        assert_eq!(set.iter().count(), RenderCategory::COUNT);
        set.remove(RenderCategory::Debug);
        assert!(!set.contains(RenderCategory::Debug));
        let gui: CategorySet = [RenderCategory::Gui, RenderCategory::GuiText].into_iter().collect();
        assert_eq!(gui.iter().count(), 2);
        assert!(CategorySet::empty().iter().next().is_none());
    }
}
