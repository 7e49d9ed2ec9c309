//! # Mesh Upload Scheduler
//!
//! Moves raw section geometry into backend-resident meshes off the calling thread.
//!
//! ## Architecture
//! - A single worker thread drains [`UploadJob`]s from an mpsc channel in submission order.
//!   Uploads and removals share the queue, so a removal never overtakes an upload that was
//!   submitted before it.
//! - Callers receive an [`UploadTicket`], a future resolving to the new [`MeshHandle`] or
//!   `None` for "no mesh".
//! - The live `SectionId -> MeshHandle` map and the [`HandlePool`] sit together in one
//!   [`MtResource`]. The worker only holds it for bookkeeping; backend calls run with it
//!   released, so render-thread queries never wait on an upload.
//! - A separate backend-access guard is held by the worker for each job and by teardown
//!   before it frees anything, so teardown never overlaps a backend call in flight.
//!
//! ## Upload Algorithm
//! 1. If the backend can update meshes in place, pop a pooled handle and refill it. If that
//!    fails the handle is destroyed, never leaked.
//! 2. Otherwise, or after a failed update, create a new mesh.
//! 3. Record the handle as the section's live mesh. A previous live handle is recycled.
//!
//! ## Handle Budget
//! Recycled handles go to the pool while it has room and are destroyed otherwise, so the
//! backend holds at most `live + pool_capacity` meshes.

pub mod handle_pool;
pub mod upload_task;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use futures_channel::oneshot;
use log::{debug, info, warn};
use web_time::Instant;

use crate::{
    config::UploadConfig,
    core::MtResource,
    error::PipelineResult,
    render_state::{
        backend::{Backend, MeshData, MeshHandle, NativeBackend},
        sections::SectionId,
    },
};

pub use handle_pool::HandlePool;
pub use upload_task::{UploadJob, UploadTicket};

/// The scheduler state shared with the worker.
#[derive(Debug)]
struct SchedulerState {
    live: HashMap<SectionId, MeshHandle>,
    pool: HandlePool,
    torn_down: bool,
}

impl SchedulerState {
    /// Pools `handle` if there is room. A handle the pool cannot take is returned for
    /// destruction.
    fn recycle(&mut self, handle: MeshHandle) -> Option<MeshHandle> {
        self.pool.push(handle).err()
    }

    /// Records `handle` as the live mesh of `section`, returning a displaced handle that
    /// has to be destroyed.
    fn install(&mut self, section: SectionId, handle: MeshHandle) -> Option<MeshHandle> {
        let previous = self.live.insert(section, handle)?;
        self.recycle(previous)
    }

    /// Releases the live mesh of `section`, returning it if it has to be destroyed.
    fn remove(&mut self, section: SectionId) -> Option<MeshHandle> {
        let handle = self.live.remove(&section)?;
        self.recycle(handle)
    }
}

/// Writes `mesh` into a backend mesh, refilling `pooled` when one is given.
///
/// Runs without the scheduler state lock. A pooled handle that is not reused is destroyed.
fn write_mesh(
    backend: &dyn NativeBackend,
    section: SectionId,
    mesh: &MeshData,
    pooled: Option<MeshHandle>,
) -> Option<MeshHandle> {
    if let Some(pooled) = pooled {
        match backend.update_mesh(pooled.raw(), mesh) {
            Ok(raw) => {
                let handle = MeshHandle::new(raw);
                if handle != Some(pooled) {
                    backend.destroy_mesh(pooled.raw());
                }
                if handle.is_some() {
                    return handle;
                }
            }
            Err(err) => {
                debug!("Updating pooled {pooled} for {section} failed: {err}");
                backend.destroy_mesh(pooled.raw());
            }
        }
    }

    match backend.create_mesh(mesh) {
        Ok(raw) => MeshHandle::new(raw),
        Err(err) => {
            debug!("Creating mesh for {section} failed: {err}");
            None
        }
    }
}

/// Single-writer asynchronous mesh uploader with handle pooling.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use voxel_pipeline::{
///     config::UploadConfig,
///     render_state::{backend::{Backend, HeadlessBackend, MeshData}, sections::SectionId, upload::MeshUploadScheduler},
/// };
///
/// let backend = Backend::native(Arc::new(HeadlessBackend::new())).unwrap();
/// let scheduler = MeshUploadScheduler::new(UploadConfig::default(), backend).unwrap();
///
/// let section = SectionId::new(0, 0, 0);
/// let handle = scheduler.upload(section, MeshData::new(vec![0; 96], 3, 32)).wait();
/// assert!(handle.is_some());
/// assert_eq!(scheduler.mesh_for(section), handle);
/// ```
pub struct MeshUploadScheduler {
    backend: Backend,
    state: MtResource<SchedulerState>,
    backend_access: MtResource<()>,
    job_sender: MtResource<Option<Sender<UploadJob>>>,
    worker: MtResource<Option<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
    disabled_warned: AtomicBool,
    teardown_wait: Duration,
    pool_capacity: usize,
}

impl MeshUploadScheduler {
    /// Creates the scheduler. A native backend gets a worker thread; a disabled one does not.
    ///
    /// # Errors
    /// Returns [`PipelineError::WorkerSpawn`](crate::error::PipelineError::WorkerSpawn) if
    /// the worker thread cannot be created.
    pub fn new(config: UploadConfig, backend: Backend) -> PipelineResult<Self> {
        let pool_capacity = config.resolved_pool_capacity();
        let state = MtResource::new(SchedulerState {
            live: HashMap::new(),
            pool: HandlePool::new(pool_capacity),
            torn_down: false,
        });
        let backend_access = MtResource::new(());
        let stopping = Arc::new(AtomicBool::new(false));

        let (job_sender, worker) = match backend.as_native() {
            Some(native) => {
                let (job_tx, job_rx) = channel::<UploadJob>();
                let native = native.clone();
                let worker_state = state.clone();
                let worker_access = backend_access.clone();
                let worker_stopping = stopping.clone();
                let worker = std::thread::Builder::new()
                    .name("mesh-upload".to_string())
                    .spawn(move || {
                        Self::worker_loop(native, worker_state, worker_access, worker_stopping, job_rx)
                    })?;
                (Some(job_tx), Some(worker))
            }
            None => (None, None),
        };

        info!(
            "Mesh upload scheduler started (pool capacity {pool_capacity}, backend {:?})",
            backend
        );

        Ok(Self {
            backend,
            state,
            backend_access,
            job_sender: MtResource::new(job_sender),
            worker: MtResource::new(worker),
            stopping,
            disabled_warned: AtomicBool::new(false),
            teardown_wait: Duration::from_millis(config.teardown_wait_ms),
            pool_capacity,
        })
    }

    fn worker_loop(
        backend: Arc<dyn NativeBackend>,
        state: MtResource<SchedulerState>,
        backend_access: MtResource<()>,
        stopping: Arc<AtomicBool>,
        job_rx: Receiver<UploadJob>,
    ) {
        let accepting = |state: &SchedulerState| !state.torn_down && !stopping.load(Ordering::Acquire);

        while let Ok(job) = job_rx.recv() {
            let _access = backend_access.get_mut();

            match job {
                UploadJob::Upload {
                    section,
                    mesh,
                    reply,
                } => {
                    let pooled = {
                        let mut state = state.get_mut();
                        if !accepting(&*state) {
                            let _ = reply.send(None);
                            continue;
                        }
                        if backend.supports_mesh_update() {
                            state.pool.pop()
                        } else {
                            None
                        }
                    };

                    let written = write_mesh(backend.as_ref(), section, &mesh, pooled);

                    let (handle, retired) = match written {
                        Some(handle) => {
                            let mut state = state.get_mut();
                            if !accepting(&*state) {
                                (None, Some(handle))
                            } else {
                                (Some(handle), state.install(section, handle))
                            }
                        }
                        None => (None, None),
                    };
                    if let Some(retired) = retired {
                        backend.destroy_mesh(retired.raw());
                    }
                    let _ = reply.send(handle);
                }
                UploadJob::Remove { section } => {
                    let retired = {
                        let mut state = state.get_mut();
                        if accepting(&*state) {
                            state.remove(section)
                        } else {
                            None
                        }
                    };
                    if let Some(retired) = retired {
                        backend.destroy_mesh(retired.raw());
                    }
                }
                UploadJob::Flush { reply } => {
                    let _ = reply.send(());
                }
            }
        }

        debug!("Mesh upload worker exiting");
    }

    fn submit(&self, job: UploadJob) -> bool {
        if self.stopping.load(Ordering::Acquire) {
            return false;
        }
        match self.job_sender.get().as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => {
                if !self.backend.is_enabled() && !self.disabled_warned.swap(true, Ordering::AcqRel) {
                    warn!("Mesh uploads disabled: no native backend");
                }
                false
            }
        }
    }

    /// Queues `mesh` for upload as the geometry of `section`.
    ///
    /// Geometry that is not uploadable (see [`MeshData::is_uploadable`]) is answered with
    /// "no mesh" right away, as is every request once teardown has started.
    pub fn upload(&self, section: SectionId, mesh: MeshData) -> UploadTicket {
        if !mesh.is_uploadable() {
            debug!("Rejected non-uploadable mesh for {section}");
            return UploadTicket::resolved(None);
        }

        let (reply, receiver) = oneshot::channel();
        if self.submit(UploadJob::Upload {
            section,
            mesh,
            reply,
        }) {
            UploadTicket::pending(receiver)
        } else {
            UploadTicket::resolved(None)
        }
    }

    /// Queues removal of `section`'s mesh. Runs after every upload submitted before it.
    pub fn remove(&self, section: SectionId) {
        if self.backend.is_enabled() {
            self.submit(UploadJob::Remove { section });
        }
    }

    /// Blocks until every job submitted so far has run.
    pub fn flush(&self) {
        let (reply, receiver) = oneshot::channel();
        if self.backend.is_enabled() && self.submit(UploadJob::Flush { reply }) {
            let _ = pollster::block_on(receiver);
        }
    }

    /// The live mesh of `section`.
    pub fn mesh_for(&self, section: SectionId) -> Option<MeshHandle> {
        self.state.get().live.get(&section).copied()
    }

    /// Whether `section` has a live mesh.
    pub fn is_meshed(&self, section: SectionId) -> bool {
        self.state.get().live.contains_key(&section)
    }

    /// Number of sections with a live mesh.
    pub fn live_count(&self) -> usize {
        self.state.get().live.len()
    }

    /// Number of handles waiting in the pool.
    pub fn pooled_count(&self) -> usize {
        self.state.get().pool.len()
    }

    /// Upper bound on pooled handles.
    pub fn pool_capacity(&self) -> usize {
        self.pool_capacity
    }

    /// Whether [`destroy`](Self::destroy) has completed.
    pub fn is_torn_down(&self) -> bool {
        self.state.get().torn_down
    }

    /// Tears the scheduler down. Idempotent.
    ///
    /// 1. Stops job intake; queued jobs resolve to "no mesh".
    /// 2. Waits up to `teardown_wait_ms` for the worker to exit.
    /// 3. Destroys every live and pooled handle, then releases the device.
    ///
    /// Step 3 waits for the backend-access guard, so it never overlaps a backend call the
    /// worker is still making.
    pub fn destroy(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }

        self.job_sender.get_mut().take();
        self.wait_for_worker();

        let _access = self.backend_access.get_mut();
        let mut state = self.state.get_mut();
        if let Some(native) = self.backend.as_native() {
            let live = state.live.len();
            let pooled = state.pool.len();
            for (_, handle) in state.live.drain() {
                native.destroy_mesh(handle.raw());
            }
            for handle in state.pool.drain() {
                native.destroy_mesh(handle.raw());
            }
            native.release_device();
            info!("Mesh upload scheduler destroyed ({live} live, {pooled} pooled handles freed)");
        }
        state.torn_down = true;
    }

    fn wait_for_worker(&self) {
        let Some(worker) = self.worker.get_mut().take() else {
            return;
        };

        let deadline = Instant::now() + self.teardown_wait;
        while !worker.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Mesh upload worker still busy after {:?}; tearing down anyway",
                    self.teardown_wait
                );
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        if worker.join().is_err() {
            warn!("Mesh upload worker panicked");
        }
    }
}

impl Drop for MeshUploadScheduler {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::render_state::backend::{BackendCall, HeadlessBackend};

    fn mesh() -> MeshData {
        MeshData::new(vec![0; 96], 3, 32)
    }

    fn scheduler_with(
        backend: HeadlessBackend,
        pool_capacity: Option<usize>,
    ) -> (Arc<HeadlessBackend>, MeshUploadScheduler) {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(backend);
        let config = UploadConfig {
            pool_capacity,
            ..Default::default()
        };
        let scheduler = MeshUploadScheduler::new(config, Backend::native(backend.clone()).unwrap())
            .unwrap();
        (backend, scheduler)
    }

    #[test]
    fn upload_then_remove_pools_the_handle() {
        let (backend, scheduler) = scheduler_with(HeadlessBackend::new(), None);
        let section = SectionId::new(0, 0, 0);

        let handle = scheduler.upload(section, mesh()).wait().unwrap();
        assert!(scheduler.is_meshed(section));

        scheduler.remove(section);
        scheduler.flush();
        assert_eq!(scheduler.live_count(), 0);
        assert_eq!(scheduler.pooled_count(), 1);
        assert!(backend.is_live(handle.raw()));
    }

    #[test]
    fn pooled_handle_is_refilled_in_place() {
        let (backend, scheduler) = scheduler_with(HeadlessBackend::new(), None);
        let first = scheduler.upload(SectionId::new(0, 0, 0), mesh()).wait().unwrap();
        scheduler.remove(SectionId::new(0, 0, 0));

        let second = scheduler.upload(SectionId::new(1, 0, 0), mesh()).wait().unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.create_count(), 1);
        assert_eq!(backend.update_count(), 1);
        assert_eq!(scheduler.pooled_count(), 0);
    }

    #[test]
    fn failed_update_destroys_and_falls_back() {
        let (backend, scheduler) = scheduler_with(HeadlessBackend::new(), None);
        let first = scheduler.upload(SectionId::new(0, 0, 0), mesh()).wait().unwrap();
        scheduler.remove(SectionId::new(0, 0, 0));
        backend.set_fail_updates(true);

        let second = scheduler.upload(SectionId::new(1, 0, 0), mesh()).wait().unwrap();
        assert_ne!(first, second);
        assert!(!backend.is_live(first.raw()));
        assert_eq!(backend.create_count(), 2);
        assert_eq!(backend.live_mesh_count(), 1);
    }

    #[test]
    fn pool_is_unused_without_update_support() {
        let (backend, scheduler) =
            scheduler_with(HeadlessBackend::new().with_mesh_update(false), None);
        scheduler.upload(SectionId::new(0, 0, 0), mesh()).wait().unwrap();
        scheduler.remove(SectionId::new(0, 0, 0));
        scheduler.upload(SectionId::new(1, 0, 0), mesh()).wait().unwrap();

        assert_eq!(backend.update_count(), 0);
        assert_eq!(backend.create_count(), 2);
        assert_eq!(scheduler.pooled_count(), 1);
    }

    #[rstest]
    #[case(1, 4)]
    #[case(2, 5)]
    #[case(8, 3)]
    fn pool_never_exceeds_capacity(#[case] capacity: usize, #[case] sections: i32) {
        let (backend, scheduler) = scheduler_with(HeadlessBackend::new(), Some(capacity));
        let tickets: Vec<_> = (0..sections)
            .map(|x| scheduler.upload(SectionId::new(x, 0, 0), mesh()))
            .collect();
        for ticket in tickets {
            assert!(ticket.wait().is_some());
        }
        for x in 0..sections {
            scheduler.remove(SectionId::new(x, 0, 0));
        }
        scheduler.flush();

        let expected_pooled = capacity.min(sections as usize);
        assert_eq!(scheduler.pooled_count(), expected_pooled);
        assert_eq!(backend.destroy_count(), sections as usize - expected_pooled);
        assert_eq!(backend.live_mesh_count(), expected_pooled);
    }

    #[test]
    fn reupload_recycles_previous_handle() {
        let (backend, scheduler) =
            scheduler_with(HeadlessBackend::new().with_mesh_update(false), None);
        let section = SectionId::new(3, 1, 4);
        let first = scheduler.upload(section, mesh()).wait().unwrap();
        let second = scheduler.upload(section, mesh()).wait().unwrap();

        assert_ne!(first, second);
        assert_eq!(scheduler.mesh_for(section), Some(second));
        assert_eq!(scheduler.live_count(), 1);
        assert_eq!(scheduler.pooled_count(), 1);
        assert_eq!(backend.live_mesh_count(), 2);
    }

    #[test]
    fn invalid_geometry_is_rejected_synchronously() {
        let (backend, scheduler) = scheduler_with(HeadlessBackend::new(), None);
        let mut ticket = scheduler.upload(SectionId::new(0, 0, 0), MeshData::new(Vec::new(), 0, 32));
        assert_eq!(ticket.try_result(), Some(None));
        scheduler.flush();
        assert_eq!(backend.create_count(), 0);
    }

    #[test]
    fn backend_failure_means_no_mesh() {
        let (backend, scheduler) = scheduler_with(HeadlessBackend::new(), None);
        backend.set_fail_creates(true);
        let section = SectionId::new(0, 0, 0);
        assert_eq!(scheduler.upload(section, mesh()).wait(), None);
        assert!(!scheduler.is_meshed(section));
    }

    #[test]
    fn destroy_frees_everything_once() {
        let (backend, scheduler) = scheduler_with(HeadlessBackend::new(), None);
        for x in 0..3 {
            scheduler.upload(SectionId::new(x, 0, 0), mesh()).wait().unwrap();
        }
        scheduler.remove(SectionId::new(0, 0, 0));
        scheduler.flush();

        scheduler.destroy();
        scheduler.destroy();

        assert!(scheduler.is_torn_down());
        assert_eq!(backend.live_mesh_count(), 0);
        let releases = backend
            .calls()
            .iter()
            .filter(|call| **call == BackendCall::ReleaseDevice)
            .count();
        assert_eq!(releases, 1);
        assert_eq!(scheduler.upload(SectionId::new(9, 0, 0), mesh()).wait(), None);
    }

    #[test]
    fn destroy_waits_for_in_flight_upload() {
        let (backend, scheduler) = scheduler_with(
            HeadlessBackend::new().with_upload_delay(Duration::from_millis(20)),
            None,
        );
        let tickets: Vec<_> = (0..4)
            .map(|x| scheduler.upload(SectionId::new(x, 0, 0), mesh()))
            .collect();
        scheduler.destroy();

        assert_eq!(backend.live_mesh_count(), 0);
        assert_eq!(backend.calls().last(), Some(&BackendCall::ReleaseDevice));
        for ticket in tickets {
            let _ = ticket.wait();
        }
        assert_eq!(backend.live_mesh_count(), 0);
    }

    #[test]
    fn queries_do_not_wait_on_an_upload_in_flight() {
        let (_, scheduler) = scheduler_with(
            HeadlessBackend::new().with_upload_delay(Duration::from_millis(300)),
            None,
        );
        let section = SectionId::new(0, 0, 0);
        let ticket = scheduler.upload(section, mesh());
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert_eq!(scheduler.mesh_for(SectionId::new(1, 0, 0)), None);
        assert!(!scheduler.is_meshed(section));
        assert_eq!(scheduler.live_count(), 0);
        assert_eq!(scheduler.pooled_count(), 0);
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(100), "queries took {elapsed:?}");

        let handle = ticket.wait();
        assert!(handle.is_some());
        assert_eq!(scheduler.mesh_for(section), handle);
    }

    #[test]
    fn destroy_during_upload_leaves_nothing_behind() {
        let (backend, scheduler) = scheduler_with(
            HeadlessBackend::new().with_upload_delay(Duration::from_millis(300)),
            None,
        );
        let ticket = scheduler.upload(SectionId::new(0, 0, 0), mesh());
        std::thread::sleep(Duration::from_millis(20));
        scheduler.destroy();

        assert_eq!(ticket.wait(), None);
        assert_eq!(backend.live_mesh_count(), 0);
        assert_eq!(backend.calls().last(), Some(&BackendCall::ReleaseDevice));
    }

    #[test]
    fn stopped_intake_is_not_reported_as_disabled_backend() {
        let (_, scheduler) = scheduler_with(HeadlessBackend::new(), None);
        scheduler.job_sender.get_mut().take();

        assert_eq!(scheduler.upload(SectionId::new(0, 0, 0), mesh()).wait(), None);
        assert!(!scheduler.disabled_warned.load(Ordering::Acquire));
    }

    #[test]
    fn disabled_backend_never_uploads() {
        let scheduler = MeshUploadScheduler::new(UploadConfig::default(), Backend::Disabled).unwrap();
        assert_eq!(scheduler.upload(SectionId::new(0, 0, 0), mesh()).wait(), None);
        assert!(scheduler.disabled_warned.load(Ordering::Acquire));
        scheduler.remove(SectionId::new(0, 0, 0));
        scheduler.flush();
        scheduler.destroy();
        assert!(scheduler.is_torn_down());
    }
}
