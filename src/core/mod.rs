//! # Core Module
//!
//! Concurrency primitives shared by the pipeline's worker threads and the render thread.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking
//! - `CancellationToken`: Cooperative cancellation flag polled by background workers
//!
//! ## Usage
//! ```rust
//! use voxel_pipeline::core::{CancellationToken, MtResource};
//!
//! let counter = MtResource::new(0);
//! *counter.get_mut() += 1;
//! assert_eq!(*counter.get(), 1);
//!
//! let token = CancellationToken::new();
//! token.cancel();
//! assert!(token.is_cancelled());
//! ```

pub mod cancellation;
pub mod mt_resource;

pub use cancellation::CancellationToken;
pub use mt_resource::MtResource;
