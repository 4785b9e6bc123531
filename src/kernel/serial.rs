/// The console device, abstracted away from the PL011 register bank
/// underneath it. `print!`/`println!`/`log!` and the shell only ever go
/// through this trait, never touching `board::uart` directly.
pub trait Serial {
    /// Writes a format string, blocking on the TX FIFO as needed.
    fn write_fmt(&self, args: core::fmt::Arguments);

    /// Reads one byte, blocking until the RX ring has one to hand back.
    /// Returns `None` only for an implementation with no input path at all;
    /// the UART's own implementation never does, since it parks on `WFE`
    /// until a byte arrives.
    fn read_byte(&self) -> Option<u8>;
}
