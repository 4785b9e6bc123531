//! ARM GICv2 distributor + CPU-interface driver.
//!
//! Register offsets and the init protocol follow the reference kernel's own
//! register-offset documentation style (see `board::uart`), grounded on the
//! ARM GICv2 architecture specification. All access goes through
//! `board::mmio`, so every distributor/CPU-interface touch is whitelist- and
//! barrier-disciplined.

use crate::{board::mmio, cell::SetOnce, log};

// Distributor register offsets (§4.5 / §6).
const GICD_CTLR: usize = 0x000;
const GICD_TYPER: usize = 0x004;
const GICD_ISENABLER: usize = 0x100;
const GICD_ICENABLER: usize = 0x180;
const GICD_ICPENDR: usize = 0x280;
const GICD_IPRIORITYR: usize = 0x400;
const GICD_ITARGETSR: usize = 0x800;
const GICD_ICFGR: usize = 0xC00;

// CPU-interface register offsets.
const GICC_CTLR: usize = 0x00;
const GICC_PMR: usize = 0x04;
const GICC_BPR: usize = 0x08;
const GICC_IAR: usize = 0x0C;
const GICC_EOIR: usize = 0x10;

/// Sentinel IRQ ID returned by `GICC_IAR` when nothing is pending.
pub const SPURIOUS_IRQ: u32 = 1023;

/// Number of `GICD_ITARGETSR`/`GICD_IPRIORITYR`/`GICD_ICFGR` slots covered by
/// one 32-bit MMIO word, for the respective register width.
const IRQS_PER_ENABLE_WORD: u32 = 32;
const IRQS_PER_PRIORITY_WORD: u32 = 4;

/// Process-wide GIC state, written once by [`init`].
pub struct Gic {
    distributor_base: usize,
    cpu_interface_base: usize,
    num_interrupts: u32,
}

/// The singleton GIC state. Unset until [`init`] runs.
static GIC: SetOnce<Gic> = SetOnce::new();

/// Derives the total number of supported interrupt lines from a raw
/// `GICD_TYPER` value. Pure function of the register value, so it is
/// host-testable without touching hardware.
#[must_use]
pub const fn num_interrupts_from_typer(typer: u32) -> u32 {
    let it_lines_number = typer & 0b1_1111;
    32 * (it_lines_number + 1)
}

/// Number of 32-bit words needed to cover `n` one-bit-per-IRQ slots.
#[must_use]
const fn enable_words(n: u32) -> u32 {
    (n + IRQS_PER_ENABLE_WORD - 1) / IRQS_PER_ENABLE_WORD
}

/// Number of 32-bit words needed to cover `n` one-byte-per-IRQ priority slots.
#[must_use]
const fn priority_words(n: u32) -> u32 {
    (n + IRQS_PER_PRIORITY_WORD - 1) / IRQS_PER_PRIORITY_WORD
}

/// Initializes the distributor and this core's CPU interface.
///
/// # Safety
/// `distributor_base` and `cpu_interface_base` must be live, MMU-mapped,
/// whitelisted GICv2 register windows, and this must run exactly once.
pub unsafe fn init(distributor_base: usize, cpu_interface_base: usize) {
    crate::call_once!();

    // 1. Disable the distributor while we reprogram it.
    // SAFETY: caller contract.
    unsafe { mmio::write32(distributor_base + GICD_CTLR, 0) };

    // 2. Derive the interrupt count.
    // SAFETY: caller contract.
    let typer = unsafe { mmio::read32(distributor_base + GICD_TYPER) };
    let num_interrupts = num_interrupts_from_typer(typer);

    // 3. Disable all interrupts.
    for i in 0..enable_words(num_interrupts) {
        // SAFETY: caller contract.
        unsafe {
            mmio::write32(
                distributor_base + GICD_ICENABLER + 4 * i as usize,
                0xFFFF_FFFF,
            );
        }
    }

    // 4. Clear all pending interrupts.
    for i in 0..enable_words(num_interrupts) {
        // SAFETY: caller contract.
        unsafe {
            mmio::write32(
                distributor_base + GICD_ICPENDR + 4 * i as usize,
                0xFFFF_FFFF,
            );
        }
    }

    // 5. Default all priorities to the lowest (0xFF per IRQ).
    for i in 0..priority_words(num_interrupts) {
        // SAFETY: caller contract.
        unsafe {
            mmio::write32(
                distributor_base + GICD_IPRIORITYR + 4 * i as usize,
                0xFFFF_FFFF,
            );
        }
    }

    // 6. Route every SPI to CPU0.
    for i in 8..enable_words(num_interrupts).max(8) * (IRQS_PER_ENABLE_WORD / IRQS_PER_PRIORITY_WORD)
    {
        // SAFETY: caller contract. SGIs/PPIs (words 0..8 of ITARGETSR) are
        // banked per-core and read-only; only SPI words are touched.
        unsafe {
            mmio::write32(distributor_base + GICD_ITARGETSR + 4 * i as usize, 0x0101_0101);
        }
    }

    // 7. Configure everything as level-sensitive.
    for i in 0..enable_words(num_interrupts) {
        // SAFETY: caller contract.
        unsafe { mmio::write32(distributor_base + GICD_ICFGR + 4 * i as usize, 0) };
    }

    // 8. Re-enable the distributor.
    // SAFETY: caller contract.
    unsafe { mmio::write32(distributor_base + GICD_CTLR, 1) };

    // 9. Bring up the CPU interface.
    // SAFETY: caller contract.
    unsafe {
        mmio::write32(cpu_interface_base + GICC_PMR, 0xFF);
        mmio::write32(cpu_interface_base + GICC_BPR, 0);
        mmio::write32(cpu_interface_base + GICC_CTLR, 1);
    }

    log!(
        "gic: initialized, distributor {:#x}, cpu-interface {:#x}, {} lines",
        distributor_base,
        cpu_interface_base,
        num_interrupts
    );

    GIC.set(Gic {
        distributor_base,
        cpu_interface_base,
        num_interrupts,
    });
}

/// Returns the GIC state, if [`init`] has run.
pub fn get() -> Option<&'static Gic> {
    GIC.try_get()
}

/// Enables forwarding of `irq` to the CPU interface.
pub fn enable_interrupt(irq: u32) {
    let Some(gic) = get() else { return };
    let word = irq / IRQS_PER_ENABLE_WORD;
    let bit = irq % IRQS_PER_ENABLE_WORD;
    // SAFETY: distributor_base was whitelisted and mapped during `init`.
    unsafe {
        mmio::write32(
            gic.distributor_base + GICD_ISENABLER + 4 * word as usize,
            1 << bit,
        );
    }
}

/// Disables forwarding of `irq` to the CPU interface.
pub fn disable_interrupt(irq: u32) {
    let Some(gic) = get() else { return };
    let word = irq / IRQS_PER_ENABLE_WORD;
    let bit = irq % IRQS_PER_ENABLE_WORD;
    // SAFETY: distributor_base was whitelisted and mapped during `init`.
    unsafe {
        mmio::write32(
            gic.distributor_base + GICD_ICENABLER + 4 * word as usize,
            1 << bit,
        );
    }
}

/// Sets the priority byte (lower is more urgent) for `irq`.
pub fn set_priority(irq: u32, priority: u8) {
    let Some(gic) = get() else { return };
    let word = irq / IRQS_PER_PRIORITY_WORD;
    let byte_index = irq % IRQS_PER_PRIORITY_WORD;
    let addr = gic.distributor_base + GICD_IPRIORITYR + 4 * word as usize;
    // SAFETY: distributor_base was whitelisted and mapped during `init`.
    let current = unsafe { mmio::read32(addr) };
    let shift = byte_index * 8;
    let updated = (current & !(0xFF << shift)) | (u32::from(priority) << shift);
    // SAFETY: see above.
    unsafe { mmio::write32(addr, updated) };
}

/// Reads `GICC_IAR`, acknowledging the highest-priority pending interrupt.
/// Returns [`SPURIOUS_IRQ`] if nothing is pending.
pub fn acknowledge() -> u32 {
    let Some(gic) = get() else {
        return SPURIOUS_IRQ;
    };
    // SAFETY: cpu_interface_base was whitelisted and mapped during `init`.
    unsafe { mmio::read32(gic.cpu_interface_base + GICC_IAR) & 0x3FF }
}

/// Writes `irq` to `GICC_EOIR`, signaling completion of its handling.
pub fn end_of_interrupt(irq: u32) {
    let Some(gic) = get() else { return };
    // SAFETY: cpu_interface_base was whitelisted and mapped during `init`.
    unsafe { mmio::write32(gic.cpu_interface_base + GICC_EOIR, irq) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typer_decodes_line_count() {
        assert_eq!(num_interrupts_from_typer(0), 32);
        assert_eq!(num_interrupts_from_typer(0b0_0001), 64);
        assert_eq!(num_interrupts_from_typer(0b1_1111), 1024);
    }

    #[test]
    fn enable_word_count_rounds_up() {
        assert_eq!(enable_words(32), 1);
        assert_eq!(enable_words(33), 2);
        assert_eq!(enable_words(1020), 32);
    }

    #[test]
    fn priority_word_count_rounds_up() {
        assert_eq!(priority_words(32), 8);
        assert_eq!(priority_words(33), 9);
    }
}
