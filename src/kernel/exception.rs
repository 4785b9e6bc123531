#[derive(PartialEq, Debug)]

/// The exception level a piece of code is observed running at, decoded from
/// `CurrentEL`. This kernel only ever runs at two of these: briefly at
/// `Hypervisor` during the EL2-to-EL1 boot switch, then permanently at
/// `Kernel` for everything after. `User` is unreachable in this system: there
/// is no EL0 program to drop to.
pub enum PrivilegeLevel {
    /// EL0. Never entered; there is no userspace in this system.
    User,
    /// EL1, where the kernel runs for the entirety of boot and the shell loop.
    Kernel,
    /// EL2, where the firmware hands off control before the boot trampoline
    /// switches down to `Kernel`.
    Hypervisor,
    /// `CurrentEL` decoded to a reserved encoding.
    Unknown,
}
