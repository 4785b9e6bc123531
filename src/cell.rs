use core::{cell::OnceCell, ops::Deref};

/// A cell that must be written exactly once (during the prescribed boot phase)
/// before any reader accesses it.
///
/// This is the write-once-before-read-publishes pattern used throughout the
/// kernel for process-wide state: the FDT-discovered device info, the GIC
/// state, the boot/config snapshot. Because registration precedes the first
/// read by construction (phase ordering in `kernel::init`), no lock is
/// required once the value is set.
#[allow(clippy::module_name_repetitions)]
pub struct SetOnce<T> {
    /// The underlying `OnceCell`
    inner: OnceCell<T>,
}

impl<T> SetOnce<T> {
    /// Creates an unset cell
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: OnceCell::new(),
        }
    }

    /// Sets the contents of the cell to `value`.
    ///
    /// # Panics
    /// Panics if the cell has already been set.
    pub fn set(&self, value: T) {
        assert!(self.inner.set(value).is_ok(), "SetOnce written more than once");
    }

    /// Returns the value if it has been set.
    pub fn try_get(&self) -> Option<&T> {
        self.inner.get()
    }
}

impl<T> Deref for SetOnce<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.inner
            .get()
            .expect("SetOnce accessed before being set")
    }
}

// SAFETY: `SetOnce` only ever provides shared access once set, and by
// construction it is only mutated (once) before any reader exists.
unsafe impl<T> Send for SetOnce<T> {}
// SAFETY: see above.
unsafe impl<T> Sync for SetOnce<T> {}
