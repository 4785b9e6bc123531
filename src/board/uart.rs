//! PL011 UART driver: polled TX, IRQ-driven RX into an SPSC ring buffer.
//!
//! Documentation for the PL011: <https://developer.arm.com/documentation/ddi0183/latest>

use crate::{
    board::{gic, mmio},
    kernel, log,
    sync::SpinLock,
};
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicUsize, Ordering};

const DR: usize = 0x00;
const FR: usize = 0x18;
const IBRD: usize = 0x24;
const FBRD: usize = 0x28;
const LCRH: usize = 0x2C;
const CR: usize = 0x30;
const IMSC: usize = 0x38;
const ICR: usize = 0x44;

const FR_TXFF: u32 = 1 << 5;
const FR_RXFE: u32 = 1 << 4;
const FR_BUSY: u32 = 1 << 3;

const LCRH_FEN: u32 = 1 << 4;
const LCRH_WLEN_8BIT: u32 = 0b11 << 5;

const CR_UARTEN: u32 = 1 << 0;
const CR_TXE: u32 = 1 << 8;
const CR_RXE: u32 = 1 << 9;

const IMSC_RXIM: u32 = 1 << 4;

const ICR_CLEAR_ALL: u32 = 0x7FF;

const MAX_PUTS_LEN: usize = 4096;

/// Capacity of the RX ring. Must be a power of two.
const RING_CAPACITY: usize = 256;

/// Single-producer (IRQ context), single-consumer (foreground) lock-free
/// byte ring. `head` is advanced only by the producer, `tail` only by the
/// consumer; both sides publish their writes with `Release` and observe the
/// other side with `Acquire`.
struct Ring {
    buffer: [core::cell::UnsafeCell<u8>; RING_CAPACITY],
    head: AtomicUsize,
    tail: AtomicUsize,
}

// SAFETY: `head`/`tail` give the producer and consumer disjoint, ordered
// access to `buffer`: the producer only ever writes `buffer[head]` before
// publishing the new `head`, and the consumer only reads `buffer[tail]`
// after observing that `head != tail`.
unsafe impl Sync for Ring {}

impl Ring {
    const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: core::cell::UnsafeCell<u8> = core::cell::UnsafeCell::new(0);
        Self {
            buffer: [ZERO; RING_CAPACITY],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Producer side: posts one byte, dropping it silently if full.
    fn push(&self, byte: u8) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next = (head + 1) % RING_CAPACITY;
        if next == tail {
            return;
        }
        // SAFETY: only the producer writes `buffer[head]`, and it has not
        // yet published `head`, so the consumer cannot be reading this slot.
        unsafe { *self.buffer[head].get() = byte };
        self.head.store(next, Ordering::Release);
    }

    /// Consumer side: pops one byte, or `None` if empty.
    fn pop(&self) -> Option<u8> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        if head == tail {
            return None;
        }
        // SAFETY: `head != tail` was just observed with acquire ordering on
        // `head`, so the producer's write to `buffer[tail]` happened-before
        // this read.
        let byte = unsafe { *self.buffer[tail].get() };
        self.tail.store((tail + 1) % RING_CAPACITY, Ordering::Release);
        Some(byte)
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }
}

struct UartInner {
    base: usize,
    rx_irq: Option<u32>,
}

impl UartInner {
    const fn new(base: usize) -> Self {
        Self { base, rx_irq: None }
    }

    /// Runs the PL011 bring-up sequence at `self.base`.
    fn init(&self) {
        // SAFETY: every access below goes through the whitelisted primitives.
        unsafe {
            mmio::write32(self.base + CR, 0);
            while mmio::read32(self.base + FR) & FR_BUSY != 0 {}
            mmio::write32(self.base + LCRH, 0);
            mmio::write32(self.base + ICR, ICR_CLEAR_ALL);
            // 24MHz / (16 * 115200) = 13.02 -> IBRD 13, FBRD round(0.02*64)=1.
            mmio::write32(self.base + IBRD, 13);
            mmio::write32(self.base + FBRD, 1);
            mmio::write32(self.base + LCRH, LCRH_WLEN_8BIT | LCRH_FEN);
            mmio::write32(self.base + IMSC, 0);
            mmio::write32(self.base + CR, CR_UARTEN | CR_TXE | CR_RXE);
        }
    }

    fn putc(&self, c: u8) {
        // SAFETY: whitelisted MMIO access.
        unsafe {
            while mmio::read32(self.base + FR) & FR_TXFF != 0 {}
            mmio::write32(self.base + DR, u32::from(c));
        }
    }

    /// Drains the RX FIFO into `ring`, then clears the RX interrupt status.
    fn drain_into(&self, ring: &Ring) {
        // SAFETY: whitelisted MMIO access.
        unsafe {
            while mmio::read32(self.base + FR) & FR_RXFE == 0 {
                let byte = (mmio::read32(self.base + DR) & 0xFF) as u8;
                ring.push(byte);
            }
            mmio::write32(self.base + ICR, IMSC_RXIM);
        }
    }

    fn enable_rx_interrupt(&mut self, irq: u32) {
        self.rx_irq = Some(irq);
        // SAFETY: whitelisted MMIO access.
        unsafe { mmio::write32(self.base + IMSC, IMSC_RXIM) };
        gic::enable_interrupt(irq);
    }
}

impl fmt::Write for UartInner {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.putc(byte);
        }
        Ok(())
    }
}

/// Representation of the UART, including its RX ring.
pub struct Uart {
    inner: SpinLock<UartInner>,
    ring: Ring,
}

impl Uart {
    const fn new(base: usize) -> Self {
        Self {
            inner: SpinLock::new(UartInner::new(base)),
            ring: Ring::new(),
        }
    }

    /// Runs (or re-runs, at a new base) the PL011 bring-up sequence. Safe to
    /// call a second time after FDT discovery replaces the fallback base:
    /// the observable configuration is the same as a first-time init at
    /// that address.
    pub fn init_at(&self, base: usize) {
        let mut inner = self.inner.lock();
        inner.base = base;
        inner.init();
    }

    /// Writes `s` followed by nothing else. Caps at 4096 characters and
    /// rejects input that does not terminate within that bound.
    pub fn puts(&self, s: &str) -> Result<(), ()> {
        if s.len() > MAX_PUTS_LEN {
            return Err(());
        }
        let inner = self.inner.lock();
        for byte in s.bytes() {
            inner.putc(byte);
        }
        Ok(())
    }

    /// Registers the ring-feeder with the IRQ dispatcher and unmasks RX.
    pub fn enable_rx_interrupt(&self, irq: u32) {
        self.inner.lock().enable_rx_interrupt(irq);
        // SAFETY: `irq` is the UART's own discovered SPI, registered once
        // during the boot phase sequence before it is enabled at the GIC.
        unsafe { crate::board::irq::register(irq, handle_rx_irq) };
    }

    /// Blocking read: suspends the core with `WFE` while the ring is empty.
    pub fn read_byte_blocking(&self) -> u8 {
        loop {
            if let Some(byte) = self.ring.pop() {
                return byte;
            }
            aarch64_cpu::asm::wfe();
        }
    }
}

impl kernel::Serial for Uart {
    fn write_fmt(&self, args: core::fmt::Arguments) {
        let mut inner = self.inner.lock();
        fmt::Write::write_fmt(&mut *inner, args).expect("Writing to the UART should not fail");
    }

    fn read_byte(&self) -> Option<u8> {
        Some(self.read_byte_blocking())
    }
}

/// The compiled-in fallback UART base for QEMU `virt` before FDT discovery
/// has run (or if it fails).
pub const FALLBACK_BASE: usize = 0x0900_0000;

/// The system-wide UART.
static UART: Uart = Uart::new(FALLBACK_BASE);

/// Gets the system-wide serial connection.
pub fn serial() -> &'static Uart {
    &UART
}

/// The dispatcher-registered handler for the UART's RX IRQ.
fn handle_rx_irq(_irq: u32) {
    log!("uart: servicing rx irq");
    UART.inner.lock().drain_into(&UART.ring);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_round_trips_fifo_order() {
        let ring = Ring::new();
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn ring_drops_on_overflow() {
        let ring = Ring::new();
        for i in 0..(RING_CAPACITY - 1) {
            ring.push(i as u8);
        }
        // One more slot available (255 queued, capacity reserves one slot).
        ring.push(0xAA);
        // The ring is now full; the next push must be dropped.
        ring.push(0xBB);

        let mut drained = 0;
        while ring.pop().is_some() {
            drained += 1;
        }
        assert_eq!(drained, RING_CAPACITY - 1);
    }

    #[test]
    fn empty_ring_reports_empty() {
        let ring = Ring::new();
        assert!(ring.is_empty());
        ring.push(1);
        assert!(!ring.is_empty());
        ring.pop();
        assert!(ring.is_empty());
    }
}
