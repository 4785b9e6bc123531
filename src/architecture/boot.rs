// The boot sequence
core::arch::global_asm!(include_str!("boot.s"));

/// The FDT physical address, preserved by the boot trampoline across the
/// BSS zero and stack setup that happen before any other Rust code runs.
#[no_mangle]
static mut BOOT_FDT_PTR: usize = 0;

/// Returns the FDT pointer captured at boot.
///
/// Valid only after the boot trampoline has run, which is true for all of
/// `kernel::init` and anything it calls.
pub fn fdt_pointer() -> usize {
    // SAFETY: written exactly once, by `_start`, before any Rust code
    // (including this function) can execute.
    unsafe { BOOT_FDT_PTR }
}

/// Switches the core from EL2 to EL1\
/// Switches to the given stack pointer\
/// Jumps to the main init sequence\
#[no_mangle]
fn el2_init() {
    use crate::{architecture, kernel::exception::PrivilegeLevel};
    use aarch64_cpu::{
        asm::eret,
        registers::{CNTHCTL_EL2, CNTVOFF_EL2, ELR_EL2, HCR_EL2, SP, SPSR_EL2, SP_EL1},
    };
    use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

    // Make sure this is running in EL2
    assert_eq!(
        architecture::exception::el(),
        PrivilegeLevel::Hypervisor,
        "The boot sequence must be running in EL2"
    );
    // Enable 64 bit mode for EL1
    // Prevent exceptions from going to EL2
    HCR_EL2.modify(
        HCR_EL2::RW::EL1IsAarch64
            + HCR_EL2::TGE::DisableTrapGeneralExceptionsToEl2
            + HCR_EL2::E2H::DisableOsAtEl2,
    );

    // Disable interrupts in EL1 mode, and switch the stack pointer on a per-exception level basis
    CNTHCTL_EL2.write(CNTHCTL_EL2::EL1PCEN::SET + CNTHCTL_EL2::EL1PCTEN::SET);
    CNTVOFF_EL2.set(0);
    SPSR_EL2.modify(
        SPSR_EL2::D::Masked
            + SPSR_EL2::A::Masked
            + SPSR_EL2::I::Masked
            + SPSR_EL2::F::Masked
            + SPSR_EL2::M::EL1h,
    );
    // Begin execution with the main init sequence
    ELR_EL2.set(crate::kernel::init as *const () as u64);
    // Set the stack pointer when execution resumes
    SP_EL1.set(SP.get());
    eret();
}
