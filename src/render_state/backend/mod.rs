//! # Backend Facade
//!
//! The pipeline never rasterizes anything itself. Everything it hands to the GPU goes through
//! [`NativeBackend`], an opaque handle-based interface: meshes are created, updated and
//! destroyed by 64-bit handle, and a frame is a sequence of `begin_pass`, `draw_mesh` and
//! `end_pass` calls.
//!
//! ## Handles
//! Handles are plain `u64`s on the wire ([`RawHandle`]) where `0` means "none". Inside the
//! pipeline a live mesh is a [`MeshHandle`], which cannot be zero.
//!
//! ## Selection
//! [`Backend`] is chosen once at startup. [`Backend::probe`] degrades to
//! [`Backend::Disabled`] when no native implementation is available; every subsystem then turns
//! its backend calls into no-ops instead of failing.

pub mod headless;

use std::{fmt, num::NonZeroU64, sync::Arc};

use log::warn;

use crate::error::{BackendError, BackendResult};

pub use headless::{BackendCall, HeadlessBackend};

/// A handle as exchanged with the native side. `0` means invalid or absent.
pub type RawHandle = u64;

/// A backend-resident mesh. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(NonZeroU64);

impl MeshHandle {
    /// Wraps a raw handle, returning `None` for the "no mesh" sentinel.
    pub fn new(raw: RawHandle) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// The raw value handed back to the backend.
    pub fn raw(self) -> RawHandle {
        self.0.get()
    }
}

impl fmt::Display for MeshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

/// Width of the entries in an index buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndexType {
    /// 16-bit indices.
    U16,
    /// 32-bit indices.
    #[default]
    U32,
}

impl IndexType {
    /// Size of one index in bytes.
    pub fn size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Raw geometry for one section, owned so it can travel to the upload worker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    /// Interleaved vertex bytes.
    pub vertices: Vec<u8>,
    /// Number of vertices in `vertices`.
    pub vertex_count: u32,
    /// Size of one vertex in bytes.
    pub stride: u32,
    /// Optional index bytes.
    pub indices: Option<Vec<u8>>,
    /// Number of indices in `indices`.
    pub index_count: u32,
    /// Width of one index.
    pub index_type: IndexType,
}

impl MeshData {
    /// Non-indexed geometry.
    pub fn new(vertices: Vec<u8>, vertex_count: u32, stride: u32) -> Self {
        Self {
            vertices,
            vertex_count,
            stride,
            ..Default::default()
        }
    }

    /// Attaches an index buffer.
    pub fn with_indices(mut self, indices: Vec<u8>, index_count: u32, index_type: IndexType) -> Self {
        self.indices = Some(indices);
        self.index_count = index_count;
        self.index_type = index_type;
        self
    }

    /// Builds mesh data from a typed vertex slice.
    pub fn from_vertices<V: bytemuck::Pod>(vertices: &[V]) -> Self {
        Self::new(
            bytemuck::cast_slice(vertices).to_vec(),
            vertices.len() as u32,
            std::mem::size_of::<V>() as u32,
        )
    }

    /// Whether the buffers are large enough for the counts they claim.
    ///
    /// Anything that fails this check is answered with "no mesh" before it reaches the
    /// backend.
    pub fn is_uploadable(&self) -> bool {
        if self.vertex_count == 0 || self.stride == 0 || self.vertices.is_empty() {
            return false;
        }
        let needed = self.vertex_count as u64 * self.stride as u64;
        if (self.vertices.len() as u64) < needed {
            return false;
        }
        match &self.indices {
            None => true,
            Some(indices) => {
                self.index_count > 0
                    && indices.len() as u64
                        >= self.index_count as u64 * self.index_type.size() as u64
            }
        }
    }
}

/// The native graphics backend as seen by the pipeline.
///
/// Implementations must be callable from the upload worker and the render thread at once.
pub trait NativeBackend: Send + Sync {
    /// Handle of the device context. Zero means device creation failed.
    fn device_handle(&self) -> RawHandle;

    /// Whether [`update_mesh`](Self::update_mesh) can refill an existing mesh in place.
    fn supports_mesh_update(&self) -> bool;

    /// Creates a mesh from raw buffers. `Ok(0)` is treated the same as an error.
    fn create_mesh(&self, mesh: &MeshData) -> BackendResult<RawHandle>;

    /// Refills an existing mesh, returning the handle that now holds the data.
    fn update_mesh(&self, handle: RawHandle, mesh: &MeshData) -> BackendResult<RawHandle>;

    /// Releases a mesh. Must tolerate handles it no longer knows.
    fn destroy_mesh(&self, handle: RawHandle);

    /// Looks up a texture by key. Zero means "not found".
    fn resolve_texture(&self, key: &str) -> RawHandle;

    /// Starts a render pass.
    fn begin_pass(&self, view_projection: &[f32; 16], camera: [f32; 4]) -> BackendResult<()>;

    /// Draws one batched segment. `mesh` is zero for transient geometry.
    fn draw_mesh(&self, mesh: RawHandle, vertex_data: &[u8], vertex_count: u32, texture: RawHandle);

    /// Ends the current render pass.
    fn end_pass(&self);

    /// Releases the device context. Called once, after every mesh is gone.
    fn release_device(&self);
}

/// The backend selected at startup.
#[derive(Clone, Default)]
pub enum Backend {
    /// A working native backend.
    Native(Arc<dyn NativeBackend>),
    /// No backend; every submission is dropped.
    #[default]
    Disabled,
}

impl Backend {
    /// Wraps a native backend, failing if its device could not be created.
    pub fn native(backend: Arc<dyn NativeBackend>) -> BackendResult<Self> {
        if backend.device_handle() == 0 {
            return Err(BackendError::DeviceCreationFailed(
                "native backend reported a null device".to_string(),
            ));
        }
        Ok(Backend::Native(backend))
    }

    /// Picks the native backend when one is present and usable, otherwise [`Backend::Disabled`].
    pub fn probe(candidate: Option<Arc<dyn NativeBackend>>) -> Self {
        match candidate.map(Self::native) {
            Some(Ok(backend)) => backend,
            Some(Err(err)) => {
                warn!("Native backend unusable, rendering disabled: {err}");
                Backend::Disabled
            }
            None => {
                warn!("No native backend available, rendering disabled");
                Backend::Disabled
            }
        }
    }

    /// The native backend, if enabled.
    pub fn as_native(&self) -> Option<&Arc<dyn NativeBackend>> {
        match self {
            Backend::Native(backend) => Some(backend),
            Backend::Disabled => None,
        }
    }

    /// Whether submissions reach a real backend.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Backend::Native(_))
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Native(backend) => f
                .debug_tuple("Native")
                .field(&backend.device_handle())
                .finish(),
            Backend::Disabled => f.write_str("Disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_a_mesh_handle() {
        assert!(MeshHandle::new(0).is_none());
        assert_eq!(MeshHandle::new(7).map(MeshHandle::raw), Some(7));
    }

    #[test]
    fn uploadable_checks_buffer_sizes() {
        assert!(MeshData::new(vec![0; 64], 2, 32).is_uploadable());
        assert!(!MeshData::new(vec![0; 63], 2, 32).is_uploadable());
        assert!(!MeshData::new(vec![0; 64], 0, 32).is_uploadable());
        assert!(!MeshData::new(Vec::new(), 1, 32).is_uploadable());

        let indexed = MeshData::new(vec![0; 96], 3, 32);
        assert!(indexed
            .clone()
            .with_indices(vec![0; 6], 3, IndexType::U16)
            .is_uploadable());
        assert!(!indexed.with_indices(vec![0; 6], 3, IndexType::U32).is_uploadable());
    }

    #[test]
    fn null_device_fails_construction() {
        let backend = Arc::new(HeadlessBackend::new().with_device_handle(0));
        assert!(matches!(
            Backend::native(backend),
            Err(BackendError::DeviceCreationFailed(_))
        ));
    }

    #[test]
    fn probe_falls_back_to_disabled() {
        assert!(!Backend::probe(None).is_enabled());

        let broken: Arc<dyn NativeBackend> = Arc::new(HeadlessBackend::new().with_device_handle(0));
        assert!(!Backend::probe(Some(broken)).is_enabled());

        let working: Arc<dyn NativeBackend> = Arc::new(HeadlessBackend::new());
        assert!(Backend::probe(Some(working)).is_enabled());
    }
}
