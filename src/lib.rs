//! A minimal operating system kernel for the QEMU `virt` aarch64 machine.
#![cfg_attr(not(test), no_std)]

/// Architecture-specific (ARM) code
pub mod architecture;
/// Board support for the QEMU `virt` machine
pub mod board;
/// Additional cells
pub mod cell;
/// Generic implementations
pub mod kernel;
/// Useful macros
pub mod macros;
/// Synchronization primitives
pub mod sync;
