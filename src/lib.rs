#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Pipeline
//!
//! The CPU side of a streaming voxel renderer: it decides which world sections are worth
//! uploading and drawing, and turns immediate-mode per-object draw calls into compact
//! submissions for an opaque native graphics backend.
//!
//! ## Key Modules
//!
//! * `render_state` - The `RenderContext` and its subsystems (visibility, upload, batching)
//! * `core` - Concurrency primitives shared by the worker threads
//! * `config` - Tunables, deserialized from JSON
//! * `error` - Error types for startup and configuration
//!
//! ## Architecture
//!
//! Three subsystems hang off one `RenderContext`:
//! * A visibility tracker running a cancellable BFS over the section grid on its own thread
//! * A mesh upload scheduler with one worker and a bounded pool of reusable mesh handles
//! * A frame compositor batching vertices per render category on the render thread
//!
//! Nothing here rasterizes. All GPU work goes through the `NativeBackend` trait.
//!
//! ## Usage
//!
//! ```no_run
//! // Headless demo: walks a camera through a grid of sections
//! fn main() {
//!     voxel_pipeline::run();
//! }
//! ```
//!
//! ## Performance Considerations
//!
//! * Visibility work never runs on the render thread
//! * Superseded traversals are cancelled, never queued
//! * Mesh handles are recycled through a bounded pool instead of churned
//! * Vertices are batched by category and texture to keep draw counts low

use std::sync::Arc;

use cgmath::{Matrix4, Point3, SquareMatrix};
use log::{error, info};
use web_time::Instant;

pub mod config;
pub mod core;
pub mod error;
pub mod render_state;

use config::PipelineConfig;
use error::PipelineResult;
use render_state::{
    backend::{HeadlessBackend, IndexType, MeshData},
    batching::{render_category::RenderCategory, vertex::pack_color, StandardVertex},
    sections::SectionId,
    RenderContext,
};

/// Environment variable holding an optional JSON configuration for the demo.
pub const CONFIG_ENV_VAR: &str = "VOXEL_PIPELINE_CONFIG";

const DEMO_FRAMES: u32 = 600;
const DEMO_SEED: u64 = 0x5EC7_1015;
const UPLOADS_PER_FRAME: usize = 8;

/// Runs the headless demo against an in-process backend.
#[cfg(not(target_family = "wasm"))]
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    if let Err(err) = run_demo() {
        error!("Demo failed: {err}");
    }
}

fn run_demo() -> PipelineResult<()> {
    let config = match std::env::var(CONFIG_ENV_VAR) {
        Ok(json) => PipelineConfig::from_json_str(&json)?,
        Err(_) => PipelineConfig::default(),
    };

    let backend = Arc::new(
        HeadlessBackend::new()
            .with_texture("terrain_atlas", 1)
            .with_texture("zombie", 2),
    );
    let mut context = RenderContext::probe(config, Some(backend.clone()))?;

    for x in -6..=6 {
        for y in 2..=6 {
            for z in -6..=6 {
                context.register_section(SectionId::new(x, y, z));
            }
        }
    }

    let mut rng = fastrand::Rng::with_seed(DEMO_SEED);
    let mut camera = Point3::new(8.0, 64.0, 8.0);
    let started = Instant::now();

    for _ in 0..DEMO_FRAMES {
        camera.x += rng.f64() * 2.0 - 1.0;
        camera.z += rng.f64() * 2.0 - 1.0;
        context.update_camera(camera);

        let uploads = context.schedule_uploads(UPLOADS_PER_FRAME, |section| Some(section_quad(section)));
        for (section, _) in &uploads {
            // Stand-in for a hardware occlusion query result.
            context.mark_visible(*section, rng.u8(..) > 32);
        }

        let eye = Point3::new(camera.x as f32, camera.y as f32, camera.z as f32);
        context.begin_frame(Matrix4::identity(), eye);
        emit_demo_objects(&mut context, &mut rng);
        context.flush_frame();

        for (_, ticket) in uploads {
            let _ = ticket.wait();
        }
    }

    info!("{}", context.visibility_stats());
    info!(
        "Demo finished: {} frames in {:?}, {} live meshes, {} pooled",
        DEMO_FRAMES,
        started.elapsed(),
        context.scheduler().live_count(),
        context.scheduler().pooled_count()
    );

    context.shutdown();
    info!("Backend meshes left after shutdown: {}", backend.live_mesh_count());
    Ok(())
}

/// A single upward-facing quad covering the section's floor.
fn section_quad(section: SectionId) -> MeshData {
    let origin = section.origin_block(16);
    let (x, y, z) = (origin.x as f32, origin.y as f32, origin.z as f32);
    let color = pack_color(96, 160, 64, 255);
    let up = [0.0, 1.0, 0.0];
    let vertices = [
        StandardVertex::new([x, y, z], [0.0, 0.0], color, up),
        StandardVertex::new([x + 16.0, y, z], [1.0, 0.0], color, up),
        StandardVertex::new([x + 16.0, y, z + 16.0], [1.0, 1.0], color, up),
        StandardVertex::new([x, y, z + 16.0], [0.0, 1.0], color, up),
    ];
    let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];
    MeshData::from_vertices(&vertices).with_indices(
        bytemuck::cast_slice(&indices).to_vec(),
        indices.len() as u32,
        IndexType::U16,
    )
}

fn emit_demo_objects(context: &mut RenderContext, rng: &mut fastrand::Rng) {
    let compositor = context.compositor();

    for _ in 0..rng.usize(1..6) {
        let offset = cgmath::Vector3::new(rng.f32() * 32.0, 64.0, rng.f32() * 32.0);
        compositor.set_transform(Matrix4::from_translation(offset));
        let mut zombie = compositor.begin_object(RenderCategory::Entity, Some("zombie"));
        zombie.vertex(0.0, 0.0, 0.0).uv(0.0, 0.0).normal(0.0, 0.0, 1.0);
        zombie.vertex(1.0, 0.0, 0.0).uv(1.0, 0.0).normal(0.0, 0.0, 1.0);
        zombie.vertex(1.0, 2.0, 0.0).uv(1.0, 1.0).normal(0.0, 0.0, 1.0);
        zombie.finish();
    }

    compositor.reset_transform();
    let white = pack_color(255, 255, 255, 255);
    for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)] {
        compositor.add_gui_vertex(RenderCategory::Gui, [x, y, 0.0], [x, y], white, None);
    }
}
