/// Routes a format string to the console UART. The sole path `print!`,
/// `println!`, and `log!` funnel through; nothing else in the kernel should
/// call `board::serial()` directly for output.
pub fn _print(args: core::fmt::Arguments) {
    use crate::{board, kernel::Serial};
    board::serial().write_fmt(args);
}
/// The counterpart to [`_print`] used by the non-verbose `log!` arm: it still
/// forces the format arguments to be type-checked, but throws the result
/// away instead of touching the UART.
pub fn _unused(_args: core::fmt::Arguments) {}

/// Formats and writes to the console UART, like `std::print!`.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kernel::print::_print(format_args!($($arg)*)));
}

/// Like [`print!`], with a trailing newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($string:expr) => ({
        $crate::kernel::print::_print(format_args!(concat!($string, "\n")));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        $crate::kernel::print::_print(format_args!(concat!($format_string, "\n"), $($arg)*));
    })
}

/// Prints a diagnostic line, prefixed to mark it as kernel-internal chatter.
/// Compiled out entirely (to a format-check-only no-op) unless the `verbose`
/// feature is enabled, so normal boots stay quiet on the console.
#[cfg(feature = "verbose")]
#[macro_export]
macro_rules! log {
    ($string:expr) => ({
        $crate::kernel::print::_print(format_args!(
            concat!("[kernel] ", $string, "\n"),
        ));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        $crate::kernel::print::_print(format_args!(
            concat!("[kernel] ", $format_string, "\n"),
            $($arg)*
        ));
    })
}

/// A no-op logging mechanism, used when the `verbose` feature is disabled.
#[cfg(not(feature = "verbose"))]
#[macro_export]
macro_rules! log {
    ($string:expr) => ({
        $crate::kernel::print::_unused(format_args!(
             $string,
        ));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        $crate::kernel::print::_unused(format_args!(
            $format_string,
            $($arg)*
        ));
    })
}
