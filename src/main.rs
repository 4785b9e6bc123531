//! A minimal operating system kernel for the QEMU `virt` aarch64 machine.
//!
//! This binary re-declares the library's module tree against the same
//! source files so that the boot trampoline, exception vectors, and panic
//! handler are compiled directly into this crate rather than pulled in
//! through an rlib dependency.
#![no_main]
#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::correctness)]
#![warn(clippy::pedantic)]
#![warn(clippy::suspicious)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![allow(clippy::missing_trait_methods)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::new_without_default)]

/// Architecture-specific implementations
mod architecture;
/// Board-specific implementations
mod board;
/// Additional cells
mod cell;
/// Generic implementations
mod kernel;
/// Useful macros
mod macros;
/// Synchronization primitives
mod sync;
