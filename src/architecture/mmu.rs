//! 4-level, 4KiB-granule page tables with 2MiB block mappings at L2.
//!
//! Only L0 → L1 → L2 are ever populated; there is no L3, so every leaf
//! mapping is a 2MiB block. Index extraction and descriptor encoding are
//! pure functions over plain `u64` arrays, so table population is
//! host-testable without an MMU.

use aarch64_cpu::{
    asm::barrier,
    registers::{MAIR_EL1, SCTLR_EL1, TCR_EL1, TTBR0_EL1},
};
use tock_registers::interfaces::{ReadWriteable, Writeable};

/// Entries per table at any level.
const ENTRIES: usize = 512;
/// Size mapped by a single L2 block descriptor.
pub const BLOCK_SIZE: usize = 0x20_0000;

const DESC_VALID: u64 = 1 << 0;
const DESC_TABLE: u64 = 1 << 1;
const AF: u64 = 1 << 10;
const SH_INNER: u64 = 0b11 << 8;
const AP_RW_EL1: u64 = 0b00 << 6;
const PXN: u64 = 1 << 53;
const UXN: u64 = 1 << 54;

/// MAIR_EL1 attribute index for Normal, write-back cacheable memory.
pub const ATTR_NORMAL: u64 = 0;
/// MAIR_EL1 attribute index for Device-nGnRnE memory.
pub const ATTR_DEVICE: u64 = 1;

#[repr(C, align(4096))]
struct Table([u64; ENTRIES]);

static mut L0_TABLE: Table = Table([0; ENTRIES]);
static mut L1_TABLE: Table = Table([0; ENTRIES]);
static mut L2_TABLE: Table = Table([0; ENTRIES]);

/// Splits a virtual address into its L0/L1/L2 table indices and page offset.
#[must_use]
pub const fn indices(va: usize) -> (usize, usize, usize, usize) {
    let l0 = (va >> 39) & 0x1FF;
    let l1 = (va >> 30) & 0x1FF;
    let l2 = (va >> 21) & 0x1FF;
    let offset = va & 0x1F_FFFF;
    (l0, l1, l2, offset)
}

/// Encodes a table descriptor pointing at `next_level_base` (must be
/// 4KiB-aligned).
#[must_use]
pub const fn table_descriptor(next_level_base: usize) -> u64 {
    (next_level_base as u64 & 0x0000_FFFF_FFFF_F000) | DESC_TABLE | DESC_VALID
}

/// Encodes an L2 block descriptor for `output_addr` (must be 2MiB-aligned).
#[must_use]
pub const fn block_descriptor(output_addr: usize, attr_index: u64, is_device: bool, executable: bool) -> u64 {
    let mut desc = (output_addr as u64 & 0x0000_FFFF_FFE0_0000)
        | (attr_index << 2)
        | AP_RW_EL1
        | AF
        | SH_INNER
        | DESC_VALID;
    if is_device || !executable {
        desc |= PXN | UXN;
    }
    desc
}

/// Rounds `size` up so `addr + size` lands on a 2MiB boundary relative to
/// `addr`'s own 2MiB-aligned floor.
#[must_use]
const fn block_aligned_end(addr: usize, size: usize) -> usize {
    let start = addr & !(BLOCK_SIZE - 1);
    let raw_end = addr + size;
    let end = (raw_end + BLOCK_SIZE - 1) & !(BLOCK_SIZE - 1);
    if end <= start {
        start + BLOCK_SIZE
    } else {
        end
    }
}

/// Maps `[phys, phys + size)` at `virt` (identity mapping uses `virt ==
/// phys`), 2MiB-block-aligning both ends. Lazily allocates the L0→L1 and
/// L1→L2 links the first time a given index pair is touched. Idempotent:
/// mapping the same range twice leaves the tables unchanged.
///
/// # Safety
/// Must only be called before `SCTLR_EL1.M` is set, from single-threaded
/// boot code with no concurrent table access.
pub unsafe fn map_range(virt: usize, phys: usize, size: usize, is_device: bool, executable: bool) {
    let start = virt & !(BLOCK_SIZE - 1);
    let end = block_aligned_end(virt, size);
    let attr = if is_device { ATTR_DEVICE } else { ATTR_NORMAL };

    let mut offset = 0;
    while start + offset < end {
        let va = start + offset;
        let pa = (phys & !(BLOCK_SIZE - 1)) + offset;
        let (l0, l1, l2, _) = indices(va);

        // SAFETY: boot-time single-threaded access per caller contract.
        let l0_table = unsafe { &mut L0_TABLE };
        if l0_table.0[l0] == 0 {
            // SAFETY: see above; `L1_TABLE` outlives the mapping.
            l0_table.0[l0] = table_descriptor(unsafe { core::ptr::addr_of!(L1_TABLE) } as usize);
        }

        // SAFETY: see above.
        let l1_table = unsafe { &mut L1_TABLE };
        if l1_table.0[l1] == 0 {
            // SAFETY: see above; `L2_TABLE` outlives the mapping.
            l1_table.0[l1] = table_descriptor(unsafe { core::ptr::addr_of!(L2_TABLE) } as usize);
        }

        // SAFETY: see above.
        let l2_table = unsafe { &mut L2_TABLE };
        l2_table.0[l2] = block_descriptor(pa, attr, is_device, executable);

        offset += BLOCK_SIZE;
    }
}

/// Programs `MAIR_EL1`/`TCR_EL1`/`TTBR0_EL1` and turns the MMU, cache, and
/// instruction cache on. Must run after every required `map_range` call.
///
/// # Safety
/// All ranges the running code, stack, and soon-to-be-accessed MMIO windows
/// depend on must already be mapped.
pub unsafe fn enable() {
    crate::call_once!();

    MAIR_EL1.write(
        MAIR_EL1::Attr0_Normal_Outer::WriteBack_NonTransient_ReadWriteAlloc
            + MAIR_EL1::Attr0_Normal_Inner::WriteBack_NonTransient_ReadWriteAlloc
            + MAIR_EL1::Attr1_Device::nonGathering_nonReordering_noEarlyWriteAck,
    );

    TCR_EL1.write(
        TCR_EL1::TG0::KiB_4
            + TCR_EL1::SH0::Inner
            + TCR_EL1::ORGN0::WriteBack_ReadAlloc_WriteAlloc_Cacheable
            + TCR_EL1::IRGN0::WriteBack_ReadAlloc_WriteAlloc_Cacheable
            + TCR_EL1::EPD0::EnableTTBR0Walks
            + TCR_EL1::T0SZ.val(16),
    );

    // SAFETY: `L0_TABLE` is fully populated by `map_range` calls preceding
    // this, per caller contract.
    let l0_base = unsafe { core::ptr::addr_of!(L0_TABLE) } as u64;
    TTBR0_EL1.set_baddr(l0_base);

    barrier::isb(barrier::SY);

    // SAFETY: invalidating the I-cache and stale TLB entries before the MMU
    // (and thus the new tables) take effect.
    unsafe {
        core::arch::asm!("ic iallu", options(nostack, preserves_flags));
        core::arch::asm!("tlbi vmalle1", options(nostack, preserves_flags));
    }
    barrier::dsb(barrier::SY);
    barrier::isb(barrier::SY);

    SCTLR_EL1.modify(SCTLR_EL1::M::Enable + SCTLR_EL1::C::Cacheable + SCTLR_EL1::I::Cacheable);

    barrier::dsb(barrier::SY);
    barrier::isb(barrier::SY);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_split_canonical_address() {
        let (l0, l1, l2, offset) = indices(0x0000_4080_0020_1234);
        assert_eq!(l0, 0);
        assert_eq!(l1, 1);
        assert_eq!(l2, 1);
        assert_eq!(offset, 0x1234);
    }

    #[test]
    fn block_descriptor_sets_expected_bits() {
        let desc = block_descriptor(0x4000_0000, ATTR_NORMAL, false, true);
        assert_eq!(desc & 0b11, 0b01, "valid block, not a table");
        assert_ne!(desc & AF, 0, "access flag must be set");
        assert_eq!(desc & (PXN | UXN), 0, "executable region omits PXN/UXN");
    }

    #[test]
    fn device_block_is_never_executable() {
        let desc = block_descriptor(0x0900_0000, ATTR_DEVICE, true, false);
        assert_eq!(desc & PXN, PXN);
        assert_eq!(desc & UXN, UXN);
        assert_eq!((desc >> 2) & 0b111, ATTR_DEVICE);
    }

    #[test]
    fn table_descriptor_marks_type_bit() {
        let desc = table_descriptor(0x1000);
        assert_eq!(desc & 0b11, 0b11);
    }

    #[test]
    fn block_aligned_end_rounds_up_partial_block() {
        assert_eq!(block_aligned_end(0x4000_0000, 1), 0x4000_0000 + BLOCK_SIZE);
        assert_eq!(block_aligned_end(0x4000_0000, BLOCK_SIZE), 0x4000_0000 + BLOCK_SIZE);
        assert_eq!(
            block_aligned_end(0x4000_0000, BLOCK_SIZE + 1),
            0x4000_0000 + 2 * BLOCK_SIZE
        );
    }
}
