use crate::kernel::exception::PrivilegeLevel;
use aarch64_cpu::{
    asm::barrier,
    registers::{CurrentEL, DAIF, SCTLR_EL1, VBAR_EL1},
};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

// The exception vector table and its trampolines.
core::arch::global_asm!(include_str!("exception.s"));

/// Exception level the core is currently running at.
pub fn el() -> PrivilegeLevel {
    match CurrentEL.read_as_enum(CurrentEL::EL) {
        Some(CurrentEL::EL::Value::EL2) => PrivilegeLevel::Hypervisor,
        Some(CurrentEL::EL::Value::EL1) => PrivilegeLevel::Kernel,
        Some(CurrentEL::EL::Value::EL0) => PrivilegeLevel::User,
        _ => PrivilegeLevel::Unknown,
    }
}

/// Installs the exception vector table and enables alignment checking.
///
/// # Safety
/// Must run exactly once, at EL1, before interrupts are unmasked.
pub unsafe fn init() {
    crate::call_once!();

    extern "Rust" {
        static _exception_vector: core::cell::UnsafeCell<()>;
    }

    // SAFETY: `_exception_vector` is defined by exception.s and is a valid,
    // 2KiB-aligned 16-entry vector table for the lifetime of the kernel.
    let vector_base = unsafe { _exception_vector.get() } as u64;
    VBAR_EL1.set(vector_base);

    // Force VBAR update to complete before the next instruction.
    barrier::isb(barrier::SY);

    // Turn on alignment checks.
    SCTLR_EL1.modify(SCTLR_EL1::A::Enable + SCTLR_EL1::SA::Enable);
}

/// Checks if exceptions are fully disabled
fn are_disabled() -> bool {
    DAIF.matches_all(DAIF::D::Masked + DAIF::A::Masked + DAIF::I::Masked + DAIF::F::Masked)
}

/// Turns on exceptions
/// # Safety
/// This function should only be used to enable exceptions when it is certain that exceptions were disable but enabling them is OK
pub unsafe fn enable() {
    assert!(are_disabled(), "Interrupts must be disabled to enable them");
    DAIF.write(DAIF::D::Unmasked + DAIF::A::Unmasked + DAIF::I::Unmasked + DAIF::F::Unmasked);
}

/// Disables exceptions
/// # Safety
/// Exceptions must be re-enabled by the caller
pub unsafe fn disable() {
    assert!(
        !are_disabled(),
        "Interrupts must be enabled to disable them"
    );
    DAIF.write(DAIF::D::Masked + DAIF::A::Masked + DAIF::I::Masked + DAIF::F::Masked);
    // Ensure that the changes are fully committed before continuing
    barrier::isb(barrier::SY);
}

/// An exception `Guard` masks `DAIF` while alive, and restores the prior
/// mask state upon being dropped. Used for short non-IRQ critical sections,
/// e.g. registering a handler right before enabling its IRQ.
pub struct Guard {
    /// The mask state to restore on drop
    daif: u64,
}

impl Guard {
    /// Creates a new exception guard, masking exceptions
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let daif = DAIF.get();
        if !are_disabled() {
            // SAFETY: We have just checked that interrupts are enabled,
            // and we are intending to protect interupts for the duration
            // of this guard
            unsafe {
                disable();
            }
        }
        Self { daif }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        DAIF.set(self.daif);
    }
}
