//! # Pipeline Configuration
//!
//! Plain read-only values that tune the pipeline. Every field has a default, and any
//! subset may be supplied as JSON:
//!
//! ```
//! use voxel_pipeline::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(r#"{ "tracker": { "max_depth": 12 } }"#).unwrap();
//! assert_eq!(config.tracker.max_depth, 12);
//! assert_eq!(config.tracker.sections_per_tick, 256);
//! ```
//!
//! Persisting settings is the embedding application's job; the pipeline only reads them.

use serde::Deserialize;

use crate::{
    error::PipelineResult,
    render_state::batching::render_category::{CategorySet, RenderCategory},
};

/// Top-level configuration for a [`RenderContext`](crate::render_state::RenderContext).
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Visibility traversal shape and priority weights.
    pub tracker: TrackerConfig,
    /// Mesh upload scheduler settings.
    pub upload: UploadConfig,
    /// Frame batch compositor settings.
    pub batching: BatchConfig,
}

impl PipelineConfig {
    /// Parses a configuration document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Settings for the visibility traversal and the upload priority blend.
///
/// The weights and the vertical band are empirical; they shape traversal quality, not
/// correctness.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Node budget multiplier; total nodes dequeued per traversal is this times `max_depth`.
    pub sections_per_tick: u32,
    /// Maximum number of hops from the camera section.
    pub max_depth: u32,
    /// Lowest section row the traversal may enter.
    pub min_section_y: i32,
    /// Highest section row the traversal may enter.
    pub max_section_y: i32,
    /// Camera updates between periodic traversals while idle.
    pub tick_interval: u32,
    /// Weight of camera distance in the priority blend.
    pub distance_weight: f64,
    /// Weight of traversal order in the priority blend.
    pub bfs_weight: f64,
    /// Multiplier applied when hardware occlusion feedback reported the section visible.
    pub gpu_boost: f64,
    /// Distance (in blocks) at which distance priority halves.
    pub distance_falloff: f64,
    /// Traversal rank at which order priority halves.
    pub bfs_order_falloff: f64,
    /// Order priority used for sections the latest traversal did not reach.
    pub unvisited_bfs_priority: f64,
    /// log2 of the visited bit-set size.
    pub visited_bits_log2: u32,
    /// Edge length of a section in blocks.
    pub section_size: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sections_per_tick: 256,
            max_depth: 32,
            min_section_y: -4,
            max_section_y: 20,
            tick_interval: 30,
            distance_weight: 0.5,
            bfs_weight: 0.5,
            gpu_boost: 1.5,
            distance_falloff: 256.0,
            bfs_order_falloff: 100.0,
            unvisited_bfs_priority: 0.5,
            visited_bits_log2: 22,
            section_size: 16,
        }
    }
}

impl TrackerConfig {
    /// Hard cap on nodes dequeued by one traversal.
    pub fn node_cap(&self) -> usize {
        self.sections_per_tick as usize * self.max_depth as usize
    }
}

/// Settings for the mesh upload scheduler.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Free-pool capacity. `None` derives it from the machine's parallelism.
    pub pool_capacity: Option<usize>,
    /// How long teardown waits for an in-flight job before freeing state anyway.
    pub teardown_wait_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            pool_capacity: None,
            teardown_wait_ms: 250,
        }
    }
}

impl UploadConfig {
    /// Resolved pool capacity: the configured value, or `max(8, 4 × hardware threads)`.
    pub fn resolved_pool_capacity(&self) -> usize {
        self.pool_capacity
            .unwrap_or_else(|| (4 * hardware_concurrency()).max(8))
    }
}

/// Settings for the frame batch compositor.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Vertices per flushed segment before a forced split.
    pub max_vertices_per_segment: u32,
    /// Initial per-category buffer capacity, in vertices.
    pub initial_vertex_capacity: usize,
    /// Number of resolved texture handles remembered between frames.
    pub texture_cache_capacity: usize,
    /// Category names that are discarded at flush instead of submitted.
    pub disabled_categories: Vec<String>,
    /// Frames between per-frame statistics log lines at `info` level.
    pub stats_log_interval: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_vertices_per_segment: 65536,
            initial_vertex_capacity: 8192,
            texture_cache_capacity: 1024,
            disabled_categories: Vec::new(),
            stats_log_interval: 300,
        }
    }
}

impl BatchConfig {
    /// Resolves `disabled_categories` into the set of categories that should be flushed.
    pub fn enabled_categories(&self) -> PipelineResult<CategorySet> {
        let mut enabled = CategorySet::all();
        for name in &self.disabled_categories {
            enabled.remove(RenderCategory::from_name(name)?);
        }
        Ok(enabled)
    }
}

fn hardware_concurrency() -> usize {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "wasm")] {
            1
        } else {
            std::thread::available_parallelism()
                .map(|threads| threads.get())
                .unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.tracker.node_cap(), 256 * 32);
    }

    #[test]
    fn pool_capacity_has_floor_of_eight() {
        let config = UploadConfig::default();
        assert!(config.resolved_pool_capacity() >= 8);

        let fixed = UploadConfig {
            pool_capacity: Some(2),
            ..Default::default()
        };
        assert_eq!(fixed.resolved_pool_capacity(), 2);
    }

    #[test]
    fn disabled_categories_are_resolved_by_name() {
        let config = PipelineConfig::from_json_str(
            r#"{ "batching": { "disabled_categories": ["weather", "debug"] } }"#,
        )
        .unwrap();
        let enabled = config.batching.enabled_categories().unwrap();
        assert!(!enabled.contains(RenderCategory::Weather));
        assert!(!enabled.contains(RenderCategory::Debug));
        assert!(enabled.contains(RenderCategory::Terrain));
    }

    #[test]
    fn unknown_category_is_rejected() {
        let config = BatchConfig {
            disabled_categories: vec!["lava".into()],
            ..Default::default()
        };
        assert!(config.enabled_categories().is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(PipelineConfig::from_json_str("{ tracker: ").is_err());
    }
}
