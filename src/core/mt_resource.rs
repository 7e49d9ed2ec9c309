//! Shared, lock-guarded state for the pipeline's threads.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` is the only way state crosses threads in the pipeline: the section
/// registry, the upload-candidate queue and the scheduler's live map and handle pool
/// all live behind one. Cloning an `MtResource` shares the same underlying value.
///
/// Unlike a bare `RwLock`, a poisoned lock is recovered instead of propagated. A
/// worker that panics mid-update must not take the render thread down with it; the
/// data behind the lock is plain bookkeeping that stays structurally valid.
///
/// # Examples
///
/// ```
/// use voxel_pipeline::core::MtResource;
///
/// let counter = MtResource::new(0);
/// let shared = counter.clone();
///
/// std::thread::spawn(move || *shared.get_mut() += 1)
///     .join()
///     .unwrap();
///
/// assert_eq!(*counter.get(), 1);
/// ```
///
/// # Performance Considerations
/// - Read operations (`get()`) can occur concurrently
/// - Write operations (`get_mut()`) are exclusive and will block other operations
/// - Keep guards short-lived; never hold one across a backend call on the render thread
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard for the contained value.
    ///
    /// A poisoned lock is recovered rather than reported.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a mutable guard for the contained value.
    ///
    /// A poisoned lock is recovered rather than reported.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swaps the contained value for `value` under a single write lock and returns the
    /// previous one. Readers observe either the old or the new value, never a mix.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.get_mut(), value)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

impl<T: Send + Sync + fmt::Debug> fmt::Debug for MtResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resource.try_read() {
            Ok(guard) => f.debug_tuple("MtResource").field(&*guard).finish(),
            Err(_) => f.write_str("MtResource(<locked>)"),
        }
    }
}

impl<T: Send + Sync + Default> Default for MtResource<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_returns_previous_value() {
        let queue = MtResource::new(vec![1, 2, 3]);
        let old = queue.replace(vec![4]);
        assert_eq!(old, vec![1, 2, 3]);
        assert_eq!(*queue.get(), vec![4]);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let value = MtResource::new(5);
        let shared = value.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.get_mut();
            panic!("worker died while holding the lock");
        })
        .join();

        assert_eq!(*value.get(), 5);
        *value.get_mut() = 6;
        assert_eq!(*value.get(), 6);
    }
}
