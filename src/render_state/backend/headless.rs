//! In-process backend that allocates handles and records every call.
//!
//! Used by the demo binary and the tests. It never touches a GPU; a "mesh" is just a number
//! in a set, which makes leaks and double-destroys easy to assert on.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use crate::{
    core::MtResource,
    error::{BackendError, BackendResult},
};

use super::{MeshData, NativeBackend, RawHandle};

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    /// A mesh was created.
    CreateMesh {
        /// Handle handed out.
        handle: RawHandle,
        /// Vertices uploaded.
        vertex_count: u32,
    },
    /// A mesh was refilled in place.
    UpdateMesh {
        /// Handle refilled.
        handle: RawHandle,
        /// Vertices uploaded.
        vertex_count: u32,
    },
    /// A mesh was released.
    DestroyMesh(RawHandle),
    /// A render pass started.
    BeginPass {
        /// Camera position, w = 1.
        camera: [f32; 4],
    },
    /// A segment was drawn.
    DrawMesh {
        /// Mesh handle; `0` for streamed segments.
        mesh: RawHandle,
        /// Vertices drawn.
        vertex_count: u32,
        /// Bytes of vertex data passed.
        byte_len: usize,
        /// Texture handle; `0` when untextured.
        texture: RawHandle,
    },
    /// A render pass ended.
    EndPass,
    /// The device context was released.
    ReleaseDevice,
}

/// A recording [`NativeBackend`].
#[derive(Debug)]
pub struct HeadlessBackend {
    device_handle: RawHandle,
    supports_update: bool,
    upload_delay: Duration,
    textures: HashMap<String, RawHandle>,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
    next_handle: AtomicU64,
    live_meshes: MtResource<HashSet<RawHandle>>,
    calls: MtResource<Vec<BackendCall>>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// A backend with a valid device that supports in-place mesh updates.
    pub fn new() -> Self {
        Self {
            device_handle: 1,
            supports_update: true,
            upload_delay: Duration::ZERO,
            textures: HashMap::new(),
            fail_creates: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            live_meshes: MtResource::default(),
            calls: MtResource::default(),
        }
    }

    /// Overrides the device handle. `0` simulates a failed device creation.
    pub fn with_device_handle(mut self, handle: RawHandle) -> Self {
        self.device_handle = handle;
        self
    }

    /// Toggles support for in-place mesh updates.
    pub fn with_mesh_update(mut self, supported: bool) -> Self {
        self.supports_update = supported;
        self
    }

    /// Registers a texture the backend will resolve by key.
    pub fn with_texture(mut self, key: impl Into<String>, handle: RawHandle) -> Self {
        self.textures.insert(key.into(), handle);
        self
    }

    /// Makes every mesh creation and update sleep first.
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    /// Makes subsequent `create_mesh` calls fail.
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `update_mesh` calls fail.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.get().clone()
    }

    /// Forgets the recorded calls. Live meshes are kept.
    pub fn clear_calls(&self) {
        self.calls.get_mut().clear();
    }

    /// Number of meshes created and not yet destroyed.
    pub fn live_mesh_count(&self) -> usize {
        self.live_meshes.get().len()
    }

    /// Whether `handle` is a mesh the backend still holds.
    pub fn is_live(&self, handle: RawHandle) -> bool {
        self.live_meshes.get().contains(&handle)
    }

    /// Number of `CreateMesh` calls recorded.
    pub fn create_count(&self) -> usize {
        self.count_calls(|call| matches!(call, BackendCall::CreateMesh { .. }))
    }

    /// Number of `UpdateMesh` calls recorded.
    pub fn update_count(&self) -> usize {
        self.count_calls(|call| matches!(call, BackendCall::UpdateMesh { .. }))
    }

    /// Number of `DestroyMesh` calls recorded.
    pub fn destroy_count(&self) -> usize {
        self.count_calls(|call| matches!(call, BackendCall::DestroyMesh(_)))
    }

    /// Whether `release_device` has been called.
    pub fn device_released(&self) -> bool {
        self.count_calls(|call| *call == BackendCall::ReleaseDevice) > 0
    }

    fn count_calls(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.get().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: BackendCall) {
        self.calls.get_mut().push(call);
    }

    fn simulate_work(&self) {
        if !self.upload_delay.is_zero() {
            std::thread::sleep(self.upload_delay);
        }
    }
}

impl NativeBackend for HeadlessBackend {
    fn device_handle(&self) -> RawHandle {
        self.device_handle
    }

    fn supports_mesh_update(&self) -> bool {
        self.supports_update
    }

    fn create_mesh(&self, mesh: &MeshData) -> BackendResult<RawHandle> {
        self.simulate_work();
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("mesh creation disabled".to_string()));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.live_meshes.get_mut().insert(handle);
        self.record(BackendCall::CreateMesh {
            handle,
            vertex_count: mesh.vertex_count,
        });
        Ok(handle)
    }

    fn update_mesh(&self, handle: RawHandle, mesh: &MeshData) -> BackendResult<RawHandle> {
        self.simulate_work();
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("mesh update disabled".to_string()));
        }
        if !self.is_live(handle) {
            return Err(BackendError::Rejected(format!("unknown mesh {handle}")));
        }
        self.record(BackendCall::UpdateMesh {
            handle,
            vertex_count: mesh.vertex_count,
        });
        Ok(handle)
    }

    fn destroy_mesh(&self, handle: RawHandle) {
        self.live_meshes.get_mut().remove(&handle);
        self.record(BackendCall::DestroyMesh(handle));
    }

    fn resolve_texture(&self, key: &str) -> RawHandle {
        self.textures.get(key).copied().unwrap_or(0)
    }

    fn begin_pass(&self, _view_projection: &[f32; 16], camera: [f32; 4]) -> BackendResult<()> {
        self.record(BackendCall::BeginPass { camera });
        Ok(())
    }

    fn draw_mesh(&self, mesh: RawHandle, vertex_data: &[u8], vertex_count: u32, texture: RawHandle) {
        self.record(BackendCall::DrawMesh {
            mesh,
            vertex_count,
            byte_len: vertex_data.len(),
            texture,
        });
    }

    fn end_pass(&self) {
        self.record(BackendCall::EndPass);
    }

    fn release_device(&self) {
        self.record(BackendCall::ReleaseDevice);
    }
}
