//! Board support for the QEMU `virt` machine: MMIO primitives, FDT
//! discovery, the GICv2 driver, the IRQ dispatcher, and the PL011 UART.

pub mod fdt;
pub mod gic;
pub mod irq;
pub mod mmio;
mod uart;

pub use uart::{serial, FALLBACK_BASE};
