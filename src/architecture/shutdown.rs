/// Parks the core in a low-power wait loop.
///
/// Used by both the panic handler and every fatal-exception vector: there is
/// no PSCI/watchdog path in scope, so "halt" is the system's only terminal
/// state.
pub fn halt() -> ! {
    use aarch64_cpu::asm::wfe;
    loop {
        wfe();
    }
}
