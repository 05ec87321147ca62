//! Locking strategies a [`GuardedMap`](crate::GuardedMap) can be bound to.

use crate::futex::{Mutex, RwLock};

/// The synchronization capability consumed by a guarded map.
///
/// # Safety
/// Between `lock_exclusive` and the matching `unlock_exclusive` no other exclusive
/// or shared holder may exist. Shared holders may only coexist with each other.
/// The map relies on this to hand out access to its unsynchronized storage.
pub unsafe trait LockStrategy: Send + Sync {
    fn lock_exclusive(&self);

    /// # Safety
    /// The caller must hold the exclusive lock acquired by `lock_exclusive`.
    unsafe fn unlock_exclusive(&self);

    /// Defaults to exclusive access, so readers serialize with everyone.
    fn lock_shared(&self) {
        self.lock_exclusive()
    }

    /// # Safety
    /// The caller must hold a shared lock acquired by `lock_shared`.
    unsafe fn unlock_shared(&self) {
        self.unlock_exclusive()
    }
}

/// Mutual exclusion only: shared access is the same as exclusive access.
pub struct ExclusiveLock {
    mutex: Mutex,
}

impl ExclusiveLock {
    pub const fn new() -> Self {
        Self {
            mutex: Mutex::new(),
        }
    }
}

impl Default for ExclusiveLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl LockStrategy for ExclusiveLock {
    #[inline]
    fn lock_exclusive(&self) {
        self.mutex.lock();
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        self.mutex.unlock();
    }
}

/// A reader-writer lock: any number of readers, or one writer.
pub struct SharedReadLock {
    rwlock: RwLock,
}

impl SharedReadLock {
    pub const fn new() -> Self {
        Self {
            rwlock: RwLock::new(),
        }
    }
}

impl Default for SharedReadLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl LockStrategy for SharedReadLock {
    #[inline]
    fn lock_exclusive(&self) {
        self.rwlock.write();
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        self.rwlock.write_unlock();
    }

    #[inline]
    fn lock_shared(&self) {
        self.rwlock.read();
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        self.rwlock.read_unlock();
    }
}

/// A lock that locks nothing.
///
/// This breaks the [`LockStrategy`] contract on purpose: with two or more
/// concurrent writers the bound map is raced, which may corrupt it or abort the
/// process. It exists only as the reference point that shows the hazard.
#[cfg(feature = "hazardous")]
pub struct Unsynchronized {
    _private: (),
}

#[cfg(feature = "hazardous")]
impl Unsynchronized {
    /// # Safety
    /// A map bound to this lock must never be accessed by a writer concurrently
    /// with any other task. Simulations with more than one task violate this.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(feature = "hazardous")]
unsafe impl LockStrategy for Unsynchronized {
    #[inline]
    fn lock_exclusive(&self) {}

    #[inline]
    unsafe fn unlock_exclusive(&self) {}

    #[inline]
    fn lock_shared(&self) {}

    #[inline]
    unsafe fn unlock_shared(&self) {}
}

/// Holds exclusive access until dropped.
pub(crate) struct ExclusiveGuard<'a, L: LockStrategy + ?Sized> {
    lock: &'a L,
}

impl<'a, L: LockStrategy + ?Sized> ExclusiveGuard<'a, L> {
    pub(crate) fn acquire(lock: &'a L) -> Self {
        lock.lock_exclusive();
        Self { lock }
    }
}

impl<L: LockStrategy + ?Sized> Drop for ExclusiveGuard<'_, L> {
    fn drop(&mut self) {
        unsafe { self.lock.unlock_exclusive() }
    }
}

/// Holds shared access until dropped.
pub(crate) struct SharedGuard<'a, L: LockStrategy + ?Sized> {
    lock: &'a L,
}

impl<'a, L: LockStrategy + ?Sized> SharedGuard<'a, L> {
    pub(crate) fn acquire(lock: &'a L) -> Self {
        lock.lock_shared();
        Self { lock }
    }
}

impl<L: LockStrategy + ?Sized> Drop for SharedGuard<'_, L> {
    fn drop(&mut self) {
        unsafe { self.lock.unlock_shared() }
    }
}
