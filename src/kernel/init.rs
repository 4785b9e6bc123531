use crate::{architecture, board, kernel, log};

/// Kernel image physical range, mapped Normal/executable before MMU enable.
const KERNEL_IMAGE_BASE: usize = 0x4000_0000;
const KERNEL_IMAGE_SIZE: usize = 128 * 1024 * 1024;

const UART_WINDOW_SIZE: usize = 4 * 1024;
const GIC_WINDOW_SIZE: usize = 64 * 1024;

/// Global initialization of the system: the phased boot sequence of §4.8.
/// Failure of any discovery step falls back to compiled-in defaults but
/// never skips a later phase.
///
/// # Safety
/// Must run exactly once, at EL1, immediately after the boot trampoline.
#[no_mangle]
pub extern "C" fn init() -> ! {
    crate::call_once!();

    assert_eq!(
        architecture::exception::el(),
        kernel::exception::PrivilegeLevel::Kernel,
        "The kernel must be running with kernel privileges"
    );

    // 1. Temporary UART init at the compiled-in fallback, for diagnostics.
    board::mmio::register_region(board::mmio::Region::new(
        "uart",
        board::FALLBACK_BASE,
        UART_WINDOW_SIZE,
    ));
    board::serial().init_at(board::FALLBACK_BASE);

    // 2. Parse the FDT, if one was handed to us.
    let fdt_ptr = architecture::fdt_pointer();
    let mut uart_info = board::fdt::UartInfo::default();
    let mut gic_info = board::fdt::GicInfo::default();
    if fdt_ptr != 0 {
        // SAFETY: the firmware's FDT pointer, if nonzero, designates a blob
        // no larger than `MAX_DT_SIZE`; the parser itself re-validates the
        // embedded header and every offset it reads against that slice.
        let bytes = unsafe {
            core::slice::from_raw_parts(fdt_ptr as *const u8, board::fdt::MAX_DT_SIZE as usize)
        };
        if let Some((uart, gic)) = board::fdt::discover(bytes) {
            uart_info = uart;
            gic_info = gic;
        } else {
            log!("fdt: parse failed, staying on fallback configuration");
        }
    } else {
        log!("fdt: no pointer supplied by firmware");
    }

    let uart_base = if uart_info.found {
        usize::try_from(uart_info.base_address).unwrap_or(board::FALLBACK_BASE)
    } else {
        board::FALLBACK_BASE
    };
    if uart_info.found {
        board::mmio::register_region(board::mmio::Region::new("uart", uart_base, UART_WINDOW_SIZE));
        board::serial().init_at(uart_base);
    }

    // 4. Install exception vectors.
    // SAFETY: runs exactly once, at EL1, before interrupts are unmasked.
    unsafe { architecture::exception::init() };

    // 5. Map kernel image, UART window, and any discovered GIC windows, then
    // enable the MMU.
    // SAFETY: these are the only mappings the rest of boot depends on, and
    // the MMU is not yet enabled.
    unsafe {
        architecture::mmu::map_range(
            KERNEL_IMAGE_BASE,
            KERNEL_IMAGE_BASE,
            KERNEL_IMAGE_SIZE,
            false,
            true,
        );
        architecture::mmu::map_range(uart_base, uart_base, UART_WINDOW_SIZE, true, false);
        if gic_info.found {
            let gicd = usize::try_from(gic_info.distributor_base).unwrap_or(0);
            let gicc = usize::try_from(gic_info.cpu_interface_base).unwrap_or(0);
            architecture::mmu::map_range(gicd, gicd, GIC_WINDOW_SIZE, true, false);
            architecture::mmu::map_range(gicc, gicc, GIC_WINDOW_SIZE, true, false);
        }
        architecture::mmu::enable();
    }

    // 6. Bring up the GIC, if one was found.
    if gic_info.found {
        let gicd = usize::try_from(gic_info.distributor_base).unwrap_or(0);
        let gicc = usize::try_from(gic_info.cpu_interface_base).unwrap_or(0);
        board::mmio::register_region(board::mmio::Region::new("gicd", gicd, GIC_WINDOW_SIZE));
        board::mmio::register_region(board::mmio::Region::new("gicc", gicc, GIC_WINDOW_SIZE));
        // SAFETY: both windows were just whitelisted and mapped above.
        unsafe { board::gic::init(gicd, gicc) };
    } else {
        log!("no GIC -- UART interrupts unavailable");
    }

    // 7. Enable UART RX interrupts if both the GIC and the UART's IRQ are known.
    if gic_info.found && uart_info.found && uart_info.irq_number != 0 {
        let guard = architecture::exception::Guard::new();
        board::serial().enable_rx_interrupt(uart_info.irq_number);
        drop(guard);
    }

    // 8. Capture and print the boot/config banner.
    kernel::config::capture(
        uart_base,
        uart_info.found.then_some(uart_info.irq_number),
        gic_info.found,
    );
    kernel::config::print();

    log!("enabling interrupts");
    // SAFETY: this is the first time interrupts are unmasked.
    unsafe { architecture::exception::enable() };

    // 9. Enter the shell loop.
    kernel::shell::run();
}
