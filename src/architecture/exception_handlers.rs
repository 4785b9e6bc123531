use aarch64_cpu::registers::{ESR_EL1, FAR_EL1};
use tock_registers::{interfaces::Readable, register_bitfields};

use crate::{architecture, board, log};

#[no_mangle]
extern "C" fn handle_curr_el0_sync() {
    halt_with_diagnostic("Synchronous exception taken with SP_EL0");
}

#[no_mangle]
extern "C" fn handle_curr_el0_irq() {
    halt_with_diagnostic("IRQ taken with SP_EL0");
}

#[no_mangle]
extern "C" fn handle_curr_el0_fiq() {
    halt_with_diagnostic("FIQ taken with SP_EL0");
}

#[no_mangle]
extern "C" fn handle_curr_el0_other() {
    halt_with_diagnostic("Miscellaneous exception taken with SP_EL0");
}

#[no_mangle]
extern "C" fn handle_curr_elx_sync() {
    match ESR_EL1.read_as_enum(ESR_EL1::EC) {
        Some(ESR_EL1::EC::Value::InstrAbortCurrentEL) => handle_instruction_abort(),
        Some(ESR_EL1::EC::Value::DataAbortCurrentEL) => handle_data_abort(),
        _ => halt_with_diagnostic("Unhandled synchronous exception taken with SP_ELx"),
    }
}

register_bitfields![u64, DataAbortISS [
    VALID OFFSET(24) NUMBITS(1) [
        INVALID = 0b0,
        VALID = 0b1,
    ],
    SAS OFFSET(22) NUMBITS(2) [
        BYTE = 0b00,
        HALFWORD = 0b01,
        WORD = 0b10,
        DOUBLEWORD = 0b11,
    ],
    DFSC OFFSET(0) NUMBITS(6) [
        ALIGNMENT_FAULT = 0b10_0001,
        SYNC_EXTERNAL_ABORT = 0b01_0000,
    ]
]];

/// Handler for an Instruction Abort
fn handle_instruction_abort() {
    log!(
        "instruction abort, taken from the current EL: {:b}",
        ESR_EL1.read(ESR_EL1::ISS)
    );
    log!("faulting address: {:#018x}", FAR_EL1.get());
    halt_with_diagnostic("unable to handle exception");
}

/// Handler for a Data Abort
fn handle_data_abort() {
    log!(
        "data abort, taken from the current EL: {:b}",
        ESR_EL1.read(ESR_EL1::ISS)
    );
    log!("faulting address: {:#018x}", FAR_EL1.get());
    match ESR_EL1.read_as_enum::<DataAbortISS::DFSC::Value>(ESR_EL1::ISS) {
        Some(DataAbortISS::DFSC::Value::ALIGNMENT_FAULT) => log!("reason: alignment fault"),
        Some(DataAbortISS::DFSC::Value::SYNC_EXTERNAL_ABORT) => {
            log!("reason: synchronous external abort");
        }
        _ => log!("reason: unhandled status code"),
    }
    halt_with_diagnostic("unable to handle exception");
}

/// The only vector that does useful per-interrupt work: acknowledge,
/// dispatch, and EOI, in that order, with no re-enable of interrupts in
/// between.
#[no_mangle]
extern "C" fn handle_curr_elx_irq() {
    let irq = board::gic::acknowledge();
    board::irq::dispatch(irq);
    if irq != board::gic::SPURIOUS_IRQ {
        board::gic::end_of_interrupt(irq);
    }
}

#[no_mangle]
extern "C" fn handle_curr_elx_fiq() {
    halt_with_diagnostic("FIQ taken with SP_ELx");
}

#[no_mangle]
extern "C" fn handle_curr_elx_other() {
    halt_with_diagnostic("Miscellaneous exception taken with SP_ELx");
}

#[no_mangle]
extern "C" fn handle_lower_el_sync_64() {
    halt_with_diagnostic("Synchronous exception taken from lower EL, in 64-bit");
}

#[no_mangle]
extern "C" fn handle_lower_el_irq_64() {
    halt_with_diagnostic("IRQ taken from lower EL, in 64-bit");
}

#[no_mangle]
extern "C" fn handle_lower_el_fiq_64() {
    halt_with_diagnostic("FIQ taken from lower EL, in 64-bit");
}

#[no_mangle]
extern "C" fn handle_lower_el_other_64() {
    halt_with_diagnostic("Miscellaneous exception taken from lower EL, in 64-bit");
}

#[no_mangle]
extern "C" fn handle_lower_el_sync_32() {
    halt_with_diagnostic("Synchronous exception taken from lower EL, in 32-bit");
}

#[no_mangle]
extern "C" fn handle_lower_el_irq_32() {
    halt_with_diagnostic("IRQ taken from lower EL, in 32-bit");
}

#[no_mangle]
extern "C" fn handle_lower_el_fiq_32() {
    halt_with_diagnostic("FIQ taken from lower EL, in 32-bit");
}

#[no_mangle]
extern "C" fn handle_lower_el_other_32() {
    halt_with_diagnostic("Miscellaneous exception taken from lower EL, in 32-bit");
}

/// Logs a one-line diagnostic and parks the core. Every fatal-exception
/// vector funnels through here instead of unwinding, matching the kernel
/// panic policy: there is nowhere further to propagate to.
fn halt_with_diagnostic(message: &str) -> ! {
    log!("fatal exception: {}", message);
    architecture::shutdown::halt()
}
