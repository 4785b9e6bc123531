//! A write-once boot/config snapshot: CPU identification plus a summary of
//! what boot discovered, captured once during phase sequencing and printed
//! by the banner and the shell's `uname` command.

use crate::{board, cell::SetOnce, println};

/// Decoded `MIDR_EL1` fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuId {
    pub implementer: u32,
    pub variant: u32,
    pub architecture: u32,
    pub part_num: u32,
    pub revision: u32,
}

/// Decodes a raw `MIDR_EL1` value. Pure function, host-testable.
#[must_use]
pub const fn decode_midr(midr: u64) -> CpuId {
    CpuId {
        implementer: ((midr >> 24) & 0xFF) as u32,
        variant: ((midr >> 20) & 0xF) as u32,
        architecture: ((midr >> 16) & 0xF) as u32,
        part_num: ((midr >> 4) & 0xFFF) as u32,
        revision: (midr & 0xF) as u32,
    }
}

/// Decodes the uniprocessor bit and affinity-0 field from `MPIDR_EL1`.
/// Pure function, host-testable.
#[must_use]
pub const fn decode_mpidr(mpidr: u64) -> (bool, u32) {
    let uniprocessor = (mpidr >> 30) & 1 == 1;
    let affinity0 = (mpidr & 0xFF) as u32;
    (uniprocessor, affinity0)
}

/// A process-wide, write-once diagnostic snapshot.
pub struct BootConfig {
    pub cpu: CpuId,
    pub uniprocessor: bool,
    pub affinity0: u32,
    pub uart_base: usize,
    pub uart_irq: Option<u32>,
    pub gic_present: bool,
}

static CONFIG: SetOnce<BootConfig> = SetOnce::new();

/// Captures `MIDR_EL1`/`MPIDR_EL1` plus the given discovery summary.
///
/// # Panics
/// Panics if called more than once.
pub fn capture(uart_base: usize, uart_irq: Option<u32>, gic_present: bool) {
    use aarch64_cpu::registers::{MIDR_EL1, MPIDR_EL1};
    use tock_registers::interfaces::Readable;

    let (uniprocessor, affinity0) = decode_mpidr(MPIDR_EL1.get());
    CONFIG.set(BootConfig {
        cpu: decode_midr(MIDR_EL1.get()),
        uniprocessor,
        affinity0,
        uart_base,
        uart_irq,
        gic_present,
    });
}

/// Prints the captured snapshot. Used both for the one-shot boot banner and
/// the shell's `uname` command.
pub fn print() {
    let Some(config) = CONFIG.try_get() else {
        println!("boot config not yet captured");
        return;
    };
    println!(
        "OdinOS: implementer {:#x} arch {} part {:#x} rev {} (uniprocessor: {}, affinity0 {})",
        config.cpu.implementer,
        config.cpu.architecture,
        config.cpu.part_num,
        config.cpu.revision,
        config.uniprocessor,
        config.affinity0,
    );
    println!("uart: base {:#x}, irq {:?}", config.uart_base, config.uart_irq);
    if config.gic_present {
        println!("gic: present");
    } else {
        println!("gic: not found -- uart interrupts unavailable");
    }
}

/// Returns the ring-dispatcher statistics banner line for the shell's
/// `stats` command.
pub fn print_irq_stats() {
    let stats = board::irq::stats();
    println!(
        "irq: total {} spurious {} unhandled {}",
        stats.total, stats.spurious, stats.unhandled
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_midr_fields() {
        // ARM Cortex-A72-ish synthetic value: implementer 'A' (0x41),
        // variant 0, architecture 0xF, part 0xD08, revision 3.
        let midr = (0x41u64 << 24) | (0xF << 16) | (0xD08 << 4) | 3;
        let cpu = decode_midr(midr);
        assert_eq!(cpu.implementer, 0x41);
        assert_eq!(cpu.architecture, 0xF);
        assert_eq!(cpu.part_num, 0xD08);
        assert_eq!(cpu.revision, 3);
    }

    #[test]
    fn decodes_mpidr_uniprocessor_bit() {
        let mpidr = 1u64 << 30 | 0x02;
        let (uniprocessor, affinity0) = decode_mpidr(mpidr);
        assert!(uniprocessor);
        assert_eq!(affinity0, 2);
    }
}
