//! # Voxel Pipeline Demo Entry Point
//!
//! Runs the headless demo from the library's `run()` function. The demo reads an optional
//! JSON configuration from `VOXEL_PIPELINE_CONFIG` and logs through `RUST_LOG`.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```

fn main() {
    #[cfg(not(target_family = "wasm"))]
    voxel_pipeline::run();
}
