use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

/// A simple test-and-set spinlock.
///
/// Used where contention is effectively impossible on this single-core
/// target (e.g. guarding the UART's mutable register state against being
/// entered twice), but where a lock is still the clearest way to express
/// "exclusive access while held".
pub struct SpinLock<T: ?Sized> {
    /// Whether or not the spinlock is taken
    is_locked: AtomicBool,
    /// The protected data
    data: UnsafeCell<T>,
}

// SAFETY: the spinlock serializes all access to `data`.
unsafe impl<T> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a spinlock around the given data
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            data: UnsafeCell::new(data),
            is_locked: AtomicBool::new(false),
        }
    }

    /// Locks the mutex. The mutex is automatically unlocked when the returned `SpinLockGuard` is
    /// dropped.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<T> {
        while self.is_locked.swap(true, Ordering::Acquire) {
            while self.is_locked.load(Ordering::Relaxed) {
                #[cfg(target_arch = "aarch64")]
                aarch64_cpu::asm::wfe();
                #[cfg(not(target_arch = "aarch64"))]
                core::hint::spin_loop();
            }
        }

        SpinLockGuard(self)
    }

    /// Unlocks the mutex.
    ///
    /// # Safety
    /// Must only be called by the destructor of the `SpinLockGuard` that locked this mutex.
    #[inline]
    unsafe fn unlock(&self) {
        self.is_locked.store(false, Ordering::Release);
        #[cfg(target_arch = "aarch64")]
        aarch64_cpu::asm::sev();
    }
}

/// RAII guard returned by [`SpinLock::lock`].
pub struct SpinLockGuard<'locked, T>(&'locked SpinLock<T>);

impl<'locked, T> SpinLockGuard<'locked, T> {
    /// Returns a pointer to the spinlock's data
    const fn get_pointer(&self) -> NonNull<T> {
        // SAFETY: pointers to `data` are nonnull
        unsafe { NonNull::new_unchecked(self.0.data.get()) }
    }
}

impl<'locked, T> Deref for SpinLockGuard<'locked, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: holding the guard implies exclusive access to the interior
        unsafe { self.get_pointer().as_ref() }
    }
}

impl<'locked, T> DerefMut for SpinLockGuard<'locked, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: holding the guard implies exclusive access to the interior
        unsafe { self.get_pointer().as_mut() }
    }
}

impl<'locked, T> Drop for SpinLockGuard<'locked, T> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: this guard is the one that locked the mutex
        unsafe {
            self.0.unlock();
        }
    }
}
