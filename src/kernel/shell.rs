//! A line-oriented interactive shell consuming the UART's blocking byte
//! reader. It never touches MMIO itself; all device access goes through
//! `board::serial()`'s `Serial` trait.

use crate::{board, kernel, kernel::config, println, print};

const LINE_CAPACITY: usize = 128;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;
const BS: u8 = 0x08;
const DEL: u8 = 0x7F;

struct Command {
    name: &'static str,
    help: &'static str,
    run: fn(&str),
}

static COMMANDS: &[Command] = &[
    Command { name: "help", help: "list available commands", run: cmd_help },
    Command { name: "echo", help: "echo back the given text", run: cmd_echo },
    Command { name: "clear", help: "clear the terminal screen", run: cmd_clear },
    Command { name: "uname", help: "print the boot/config banner", run: cmd_uname },
    Command { name: "stats", help: "print irq dispatcher counters", run: cmd_stats },
    Command { name: "reboot", help: "halt the core (no PSCI path)", run: cmd_reboot },
];

fn cmd_help(_rest: &str) {
    for command in COMMANDS {
        println!("  {:<8} {}", command.name, command.help);
    }
}

fn cmd_echo(rest: &str) {
    println!("{}", rest);
}

fn cmd_clear(_rest: &str) {
    print!("\x1b[2J\x1b[H");
}

fn cmd_uname(_rest: &str) {
    config::print();
}

fn cmd_stats(_rest: &str) {
    config::print_irq_stats();
}

fn cmd_reboot(_rest: &str) {
    println!("no PSCI/watchdog path in scope; halting");
    crate::architecture::shutdown::halt();
}

/// Splits a dispatched line into a command word and the remainder,
/// trimming surrounding whitespace from both.
fn split_command(line: &str) -> (&str, &str) {
    let trimmed = line.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (trimmed, ""),
    }
}

fn dispatch(line: &str) {
    let (cmd, rest) = split_command(line);
    if cmd.is_empty() {
        return;
    }
    match COMMANDS.iter().find(|c| c.name == cmd) {
        Some(command) => (command.run)(rest),
        None => println!("unknown command: {}", cmd),
    }
}

/// Runs the shell forever: prompts, accumulates a line from the blocking
/// UART reader, and dispatches it on CR/LF.
pub fn run() -> ! {
    let serial = board::serial();
    let mut line = [0u8; LINE_CAPACITY];
    let mut len = 0usize;

    print!("OdinOS> ");
    loop {
        let byte = kernel::Serial::read_byte(serial)
            .expect("the UART's read_byte blocks until a byte is available");
        match byte {
            CR | LF => {
                println!();
                // SAFETY net: the buffer only ever holds bytes echoed as
                // printable ASCII, so this is always valid UTF-8.
                let text = core::str::from_utf8(&line[..len]).unwrap_or("");
                dispatch(text);
                len = 0;
                print!("OdinOS> ");
            }
            BS | DEL => {
                if len > 0 {
                    len -= 1;
                    print!("\u{8} \u{8}");
                }
            }
            0x20..=0x7E => {
                if len < LINE_CAPACITY {
                    line[len] = byte;
                    len += 1;
                    print!("{}", byte as char);
                }
            }
            other => {
                print!("{}", other as char);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_and_remainder() {
        assert_eq!(split_command("echo hello world"), ("echo", "hello world"));
        assert_eq!(split_command("  help  "), ("help", ""));
        assert_eq!(split_command(""), ("", ""));
    }

    #[test]
    fn unknown_command_name_not_in_table() {
        assert!(COMMANDS.iter().all(|c| c.name != "frobnicate"));
    }

    #[test]
    fn every_command_name_is_unique() {
        for (i, a) in COMMANDS.iter().enumerate() {
            for b in &COMMANDS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
