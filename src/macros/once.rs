/// Ensures that the given function is only called once.
/// Panics if run more than once.
#[allow(clippy::module_name_repetitions)]
#[macro_export]
macro_rules! call_once {
    () => {{
        use core::sync::atomic::{AtomicBool, Ordering};
        static IS_FIRST_INVOCATION: AtomicBool = AtomicBool::new(false);
        assert!(!IS_FIRST_INVOCATION.swap(true, Ordering::AcqRel))
    }};
}
