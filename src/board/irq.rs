//! IRQ dispatch table: maps SPI numbers to registered handlers and keeps
//! dispatch statistics. Registration happens during boot, before
//! interrupts are unmasked, so the table is effectively read-only by the
//! time `dispatch` can run from IRQ context — no locking is required.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::{board::gic, log};

/// Number of SPI slots covered by the table (IDs 0..1020; 1020..1023 are
/// reserved/spurious and never dispatched here).
pub const NUM_SLOTS: usize = 1020;

type Handler = fn(u32);

static mut HANDLERS: [Option<Handler>; NUM_SLOTS] = [None; NUM_SLOTS];

static TOTAL: AtomicU32 = AtomicU32::new(0);
static SPURIOUS: AtomicU32 = AtomicU32::new(0);
static UNHANDLED: AtomicU32 = AtomicU32::new(0);

/// Registers `handler` for `irq`. Replacing an existing registration is
/// permitted, with a warning.
///
/// # Panics
/// Panics if `irq >= NUM_SLOTS`.
///
/// # Safety
/// Must only be called before the corresponding IRQ is enabled at the GIC,
/// i.e. from non-IRQ context with interrupts masked or not yet unmasked.
pub unsafe fn register(irq: u32, handler: Handler) {
    let index = usize::try_from(irq).expect("IRQ number out of range");
    assert!(index < NUM_SLOTS, "IRQ {irq} out of range");
    // SAFETY: caller contract guarantees no concurrent IRQ-context access.
    let handlers = unsafe { &mut *core::ptr::addr_of_mut!(HANDLERS) };
    if handlers[index].is_some() {
        log!("irq: replacing handler for irq {}", irq);
    }
    handlers[index] = Some(handler);
}

/// Dispatches `irq`, consulting the handler table and updating statistics.
/// Must not re-enable interrupts; the caller (the current-EL IRQ vector) is
/// responsible for EOI after this returns.
pub fn dispatch(irq: u32) {
    TOTAL.fetch_add(1, Ordering::Relaxed);
    if irq == gic::SPURIOUS_IRQ {
        SPURIOUS.fetch_add(1, Ordering::Relaxed);
        return;
    }
    let Ok(index) = usize::try_from(irq) else {
        UNHANDLED.fetch_add(1, Ordering::Relaxed);
        return;
    };
    if index >= NUM_SLOTS {
        UNHANDLED.fetch_add(1, Ordering::Relaxed);
        log!("irq: {} out of dispatch range", irq);
        return;
    }
    // SAFETY: dispatch only ever observes entries written by `register`
    // before interrupts were enabled; no writer runs concurrently with us.
    let handler = unsafe { (*core::ptr::addr_of!(HANDLERS))[index] };
    match handler {
        Some(handler) => handler(irq),
        None => {
            UNHANDLED.fetch_add(1, Ordering::Relaxed);
            log!("irq: no handler registered for irq {}", irq);
        }
    }
}

/// A snapshot of the dispatcher's counters, for the shell's `stats` command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: u32,
    pub spurious: u32,
    pub unhandled: u32,
}

/// Returns the current dispatch counters.
#[must_use]
pub fn stats() -> Stats {
    Stats {
        total: TOTAL.load(Ordering::Relaxed),
        spurious: SPURIOUS.load(Ordering::Relaxed),
        unhandled: UNHANDLED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These counters are process-wide statics shared with every other test
    // in this module, which `cargo test` may run concurrently. Each test
    // below asserts on the *delta* it caused rather than an absolute value,
    // so interleaving with other tests cannot make it flaky.

    #[test]
    fn spurious_irq_short_circuits() {
        let before = stats();
        dispatch(gic::SPURIOUS_IRQ);
        let after = stats();
        assert_eq!(after.total, before.total + 1);
        assert_eq!(after.spurious, before.spurious + 1);
        assert_eq!(after.unhandled, before.unhandled);
    }

    #[test]
    fn unregistered_irq_counts_unhandled() {
        let before = stats();
        dispatch(999);
        let after = stats();
        assert_eq!(after.total, before.total + 1);
        assert_eq!(after.unhandled, before.unhandled + 1);
    }

    #[test]
    fn out_of_range_irq_counts_unhandled_without_panicking() {
        let before = stats();
        dispatch(5000);
        let after = stats();
        assert_eq!(after.unhandled, before.unhandled + 1);
    }
}
