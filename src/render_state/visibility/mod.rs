//! # Visibility Tracker
//!
//! Approximates which sections the camera can see without doing per-frame visibility work
//! on the render thread.
//!
//! ## Architecture
//! - The render thread feeds camera positions through [`VisibilityTracker::update_camera`],
//!   which never blocks. Crossing into a new section, or every `tick_interval` updates while
//!   idle, schedules a traversal.
//! - Scheduling writes the request into a single "latest request" slot and wakes the worker
//!   thread. A traversal already running has its [`CancellationToken`] flipped; only the
//!   newest request survives.
//! - The worker runs a bounded BFS (see [`traversal`]), then swaps the upload-candidate
//!   queue in one write and sweeps stale visibility marks.
//!
//! ## Shared State
//! The section registry, the candidate queue and the request slot each sit in an
//! [`MtResource`]. The worker never holds two of them at once; readers that need both take
//! the candidate queue first.
//!
//! ## Shutdown
//! After [`VisibilityTracker::shutdown`] every query answers as if no section were known:
//! `is_likely_visible` is `true`, queues are empty and updates are ignored.

pub mod priority;
pub mod traversal;

use std::{
    collections::BinaryHeap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{channel, Receiver, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use cgmath::Point3;
use log::{debug, info, trace, warn};
use web_time::Instant;

use crate::{
    config::TrackerConfig,
    core::{CancellationToken, MtResource},
    error::PipelineResult,
    render_state::sections::{SectionId, SectionRegistry},
};

use priority::{PriorityWeights, UploadCandidate};
use traversal::{publish, Traversal, TraversalRequest};

/// Counters describing the tracker's current view of the world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisibilityStats {
    /// Registered sections.
    pub sections: usize,
    /// Sections reached by the latest traversal.
    pub bfs_visible: usize,
    /// Sections whose hardware occlusion verdict is "visible".
    pub gpu_visible: usize,
    /// Candidates waiting in the upload queue.
    pub queued: usize,
    /// Traversals that ran to completion and were published.
    pub completed_traversals: u64,
    /// Traversals replaced by a newer request, whether cancelled mid-run or dropped before
    /// they started.
    pub superseded_traversals: u64,
}

impl fmt::Display for VisibilityStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sections: {}, BFS visible: {}, GPU visible: {}, Queue: {}",
            self.sections, self.bfs_visible, self.gpu_visible, self.queued
        )
    }
}

#[derive(Clone, Copy, Debug)]
struct CameraSnapshot {
    position: Point3<f64>,
    section: Option<SectionId>,
}

impl Default for CameraSnapshot {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 0.0),
            section: None,
        }
    }
}

/// State shared between the tracker handle and its worker.
struct TrackerShared {
    config: TrackerConfig,
    weights: PriorityWeights,
    sections: MtResource<SectionRegistry>,
    candidates: MtResource<BinaryHeap<UploadCandidate>>,
    camera: MtResource<CameraSnapshot>,
    /// Latest request not yet picked up by the worker.
    pending: MtResource<Option<TraversalRequest>>,
    /// Token of the traversal the worker is running, if any.
    running_token: MtResource<Option<CancellationToken>>,
    running: AtomicBool,
    next_generation: AtomicU64,
    completed_generation: AtomicU64,
    completed_traversals: AtomicU64,
    superseded_traversals: AtomicU64,
    frame: AtomicU64,
    shut_down: AtomicBool,
}

impl TrackerShared {
    fn is_idle(&self) -> bool {
        let pending = self.pending.get();
        pending.is_none() && !self.running.load(Ordering::Acquire)
    }

    /// Picks up the pending request and flags the worker as running, atomically with
    /// respect to [`is_idle`](Self::is_idle).
    fn take_request(&self) -> Option<TraversalRequest> {
        let mut pending = self.pending.get_mut();
        let request = pending.take()?;
        self.running.store(true, Ordering::Release);
        *self.running_token.get_mut() = Some(request.token.clone());
        Some(request)
    }

    fn finish_request(&self) {
        let _pending = self.pending.get_mut();
        self.running_token.get_mut().take();
        self.running.store(false, Ordering::Release);
    }
}

/// Asynchronous, cancellable section visibility tracker.
///
/// Owns exactly one background worker thread.
///
/// # Examples
///
/// ```
/// use cgmath::Point3;
/// use std::time::Duration;
/// use voxel_pipeline::{config::TrackerConfig, render_state::{sections::SectionId, visibility::VisibilityTracker}};
///
/// let tracker = VisibilityTracker::new(TrackerConfig::default()).unwrap();
/// tracker.register_section(SectionId::new(0, 4, 0));
/// tracker.update_camera(Point3::new(8.0, 64.0, 8.0));
/// assert!(tracker.wait_for_idle(Duration::from_secs(5)));
/// assert_eq!(tracker.upload_priorities(8), vec![SectionId::new(0, 4, 0)]);
/// ```
pub struct VisibilityTracker {
    shared: Arc<TrackerShared>,
    wake_sender: MtResource<Option<Sender<()>>>,
    worker: MtResource<Option<JoinHandle<()>>>,
}

impl VisibilityTracker {
    /// Creates the tracker and starts its worker thread.
    ///
    /// # Errors
    /// Returns [`PipelineError::WorkerSpawn`](crate::error::PipelineError::WorkerSpawn) if
    /// the thread cannot be created.
    pub fn new(config: TrackerConfig) -> PipelineResult<Self> {
        let shared = Arc::new(TrackerShared {
            weights: PriorityWeights::from(&config),
            config,
            sections: MtResource::new(SectionRegistry::new()),
            candidates: MtResource::new(BinaryHeap::new()),
            camera: MtResource::default(),
            pending: MtResource::new(None),
            running_token: MtResource::new(None),
            running: AtomicBool::new(false),
            next_generation: AtomicU64::new(1),
            completed_generation: AtomicU64::new(0),
            completed_traversals: AtomicU64::new(0),
            superseded_traversals: AtomicU64::new(0),
            frame: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        });

        let (wake_tx, wake_rx) = channel::<()>();
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("visibility-tracker".to_string())
            .spawn(move || Self::worker_loop(worker_shared, wake_rx))?;

        info!(
            "Visibility tracker started (node cap {}, depth cap {})",
            shared.config.node_cap(),
            shared.config.max_depth
        );

        Ok(Self {
            shared,
            wake_sender: MtResource::new(Some(wake_tx)),
            worker: MtResource::new(Some(worker)),
        })
    }

    fn worker_loop(shared: Arc<TrackerShared>, wake_rx: Receiver<()>) {
        let mut traversal = Traversal::new(&shared.config);

        while wake_rx.recv().is_ok() {
            if shared.shut_down.load(Ordering::Acquire) {
                break;
            }
            let Some(request) = shared.take_request() else {
                continue;
            };

            let started = Instant::now();
            match traversal.run(&request, &shared.sections) {
                Some(outcome) => {
                    let generation = outcome.generation;
                    let found = outcome.candidates.len();
                    let dequeued = outcome.dequeued;
                    publish(outcome, &shared.candidates, &shared.sections);
                    shared
                        .completed_generation
                        .store(generation, Ordering::Release);
                    shared.completed_traversals.fetch_add(1, Ordering::AcqRel);
                    trace!(
                        "Traversal {generation} from {} dequeued {dequeued} nodes, {found} candidates in {:?}",
                        request.start,
                        started.elapsed()
                    );
                }
                None => {
                    shared.superseded_traversals.fetch_add(1, Ordering::AcqRel);
                    debug!("Traversal {} cancelled", request.generation);
                }
            }

            shared.finish_request();
        }

        debug!("Visibility worker exiting");
    }

    /// Feeds a camera position. Never blocks.
    ///
    /// Schedules a traversal on the first update, whenever the camera enters a different
    /// section, and every `tick_interval` updates while no traversal is in flight.
    pub fn update_camera(&self, position: Point3<f64>) {
        if self.shared.shut_down.load(Ordering::Acquire) {
            return;
        }
        let frame = self.shared.frame.fetch_add(1, Ordering::AcqRel) + 1;
        let section = SectionId::containing(position, self.shared.config.section_size);

        let moved = {
            let mut camera = self.shared.camera.get_mut();
            let moved = camera.section != Some(section);
            camera.position = position;
            camera.section = Some(section);
            moved
        };

        let interval = self.shared.config.tick_interval.max(1) as u64;
        let periodic = frame % interval == 0 && self.shared.is_idle();

        if moved || periodic {
            self.schedule(section, position);
        }
    }

    /// Forces a traversal from the last camera position.
    ///
    /// # Returns
    /// `false` if no camera position has been seen yet or the tracker is shut down.
    pub fn request_traversal(&self) -> bool {
        if self.shared.shut_down.load(Ordering::Acquire) {
            return false;
        }
        let camera = *self.shared.camera.get();
        match camera.section {
            Some(section) => {
                self.schedule(section, camera.position);
                true
            }
            None => false,
        }
    }

    fn schedule(&self, start: SectionId, camera: Point3<f64>) {
        let request = TraversalRequest {
            start,
            camera,
            generation: self.shared.next_generation.fetch_add(1, Ordering::AcqRel),
            token: CancellationToken::new(),
        };

        {
            let mut pending = self.shared.pending.get_mut();
            if let Some(running) = self.shared.running_token.get().as_ref() {
                running.cancel();
            }
            if let Some(superseded) = pending.replace(request) {
                self.shared
                    .superseded_traversals
                    .fetch_add(1, Ordering::AcqRel);
                trace!("Dropping unstarted traversal {}", superseded.generation);
            }
        }

        if let Some(sender) = self.wake_sender.get().as_ref() {
            if sender.send(()).is_err() {
                warn!("Visibility worker is gone; traversal not scheduled");
            }
        }
    }

    /// Starts tracking `origin`. Idempotent.
    pub fn register_section(&self, origin: SectionId) {
        if self.shared.shut_down.load(Ordering::Acquire) {
            return;
        }
        self.shared.sections.get_mut().register(origin);
    }

    /// Stops tracking `origin`. Idempotent.
    ///
    /// Queued candidates for `origin` are not removed; they are skipped when drained.
    pub fn unregister_section(&self, origin: SectionId) {
        self.shared.sections.get_mut().unregister(origin);
    }

    /// Whether `origin` is registered.
    pub fn is_registered(&self, origin: SectionId) -> bool {
        self.shared.sections.get().contains(origin)
    }

    /// `true` for unknown sections, otherwise traversal or hardware visibility.
    pub fn is_likely_visible(&self, origin: SectionId) -> bool {
        self.shared
            .sections
            .get()
            .get(origin)
            .map_or(true, |state| state.is_likely_visible())
    }

    /// Whether the latest traversal reached `origin`. `false` for unknown sections.
    pub fn is_bfs_visible(&self, origin: SectionId) -> bool {
        self.shared
            .sections
            .get()
            .get(origin)
            .is_some_and(|state| state.bfs_visible)
    }

    /// Records a hardware occlusion verdict for `origin`. Last write wins; unknown sections
    /// are ignored.
    pub fn mark_visible(&self, origin: SectionId, visible: bool) {
        let frame = self.shared.frame.load(Ordering::Acquire);
        if let Some(state) = self.shared.sections.get_mut().get_mut(origin) {
            state.mark_gpu(visible, frame);
        }
    }

    /// Upload priority of `origin` against the last camera position. `0.0` if unknown.
    pub fn upload_priority(&self, origin: SectionId) -> f64 {
        let camera = self.shared.camera.get().position;
        let generation = self.shared.completed_generation.load(Ordering::Acquire);
        self.shared
            .sections
            .get()
            .get(origin)
            .map_or(0.0, |state| {
                self.shared.weights.priority(state, camera, generation)
            })
    }

    /// Pops up to `max_count` of the highest-priority candidates that are still registered.
    ///
    /// Popped candidates are gone; a second call returns the next ones.
    pub fn upload_priorities(&self, max_count: usize) -> Vec<SectionId> {
        let mut candidates = self.shared.candidates.get_mut();
        let sections = self.shared.sections.get();
        let mut drained = Vec::with_capacity(max_count.min(candidates.len()));

        while drained.len() < max_count {
            let Some(candidate) = candidates.pop() else {
                break;
            };
            if sections.contains(candidate.origin) {
                drained.push(candidate.origin);
            }
        }

        drained
    }

    /// Snapshot counters.
    pub fn stats(&self) -> VisibilityStats {
        let queued = self.shared.candidates.get().len();
        let sections = self.shared.sections.get();
        VisibilityStats {
            sections: sections.len(),
            bfs_visible: sections.iter().filter(|s| s.bfs_visible).count(),
            gpu_visible: sections.iter().filter(|s| s.gpu_visible).count(),
            queued,
            completed_traversals: self.shared.completed_traversals.load(Ordering::Acquire),
            superseded_traversals: self.shared.superseded_traversals.load(Ordering::Acquire),
        }
    }

    /// Whether no traversal is pending or running.
    pub fn is_idle(&self) -> bool {
        self.shared.is_idle()
    }

    /// Blocks until no traversal is pending or running, or `timeout` elapses.
    ///
    /// # Returns
    /// `true` if the tracker went idle in time.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Cancels in-flight work, stops the worker and drops all state. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        {
            let mut pending = self.shared.pending.get_mut();
            pending.take();
            if let Some(token) = self.shared.running_token.get().as_ref() {
                token.cancel();
            }
        }

        // Dropping the sender ends the worker's receive loop.
        self.wake_sender.get_mut().take();
        if let Some(worker) = self.worker.get_mut().take() {
            if worker.join().is_err() {
                warn!("Visibility worker panicked before shutdown");
            }
        }

        self.shared.candidates.get_mut().clear();
        self.shared.sections.get_mut().clear();
        info!("Visibility tracker shut down");
    }
}

impl Drop for VisibilityTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
