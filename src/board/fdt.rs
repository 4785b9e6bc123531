//! Flattened Device Tree parser: header validation plus a bounds-safe,
//! single-pass traversal of the structure block to discover the UART and
//! GIC nodes. Never panics, never writes; any malformed input aborts the
//! current traversal and reports "not found" so boot can fall back to
//! compiled-in defaults.

const MAGIC: u32 = 0xd00d_feed;
/// Upper bound on a blob's `totalsize`, also used by boot to size the probe
/// slice read from the firmware-supplied pointer before the header itself
/// has been validated.
pub const MAX_DT_SIZE: u32 = 16 * 1024 * 1024;
const MAX_PROPERTY_SIZE: u32 = 1024 * 1024;
const MAX_NODE_NAME_LEN: usize = 4096;
const MAX_SCAN_LEN: usize = 4096;
const MAX_TOKENS: u32 = 10_000;
const HEADER_SIZE: u32 = 40;

const FDT_BEGIN_NODE: u32 = 1;
const FDT_END_NODE: u32 = 2;
const FDT_PROP: u32 = 3;
const FDT_NOP: u32 = 4;
const FDT_END: u32 = 9;

/// Parsed and validated FDT header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FdtHeader {
    pub totalsize: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub size_dt_struct: u32,
    pub size_dt_strings: u32,
    pub version: u32,
}

/// UART discovery result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UartInfo {
    pub base_address: u64,
    pub irq_number: u32,
    pub found: bool,
}

/// GIC discovery result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GicInfo {
    pub distributor_base: u64,
    pub cpu_interface_base: u64,
    pub found: bool,
}

/// Read-only, bounds-checked view over an FDT blob's raw bytes.
pub struct Fdt<'a> {
    bytes: &'a [u8],
    header: FdtHeader,
}

fn read_be32(bytes: &[u8], offset: u32) -> Option<u32> {
    let start = usize::try_from(offset).ok()?;
    let slice = bytes.get(start..start.checked_add(4)?)?;
    Some(u32::from_be_bytes(slice.try_into().ok()?))
}

fn read_be64(bytes: &[u8], offset: u32) -> Option<u64> {
    let start = usize::try_from(offset).ok()?;
    let slice = bytes.get(start..start.checked_add(8)?)?;
    Some(u64::from_be_bytes(slice.try_into().ok()?))
}

/// Validates the 40-byte FDT header embedded at the start of `bytes`.
/// Pure function of the byte slice.
#[must_use]
pub fn parse_header(bytes: &[u8]) -> Option<FdtHeader> {
    if (bytes.len() as u64) < u64::from(HEADER_SIZE) {
        return None;
    }
    let magic = read_be32(bytes, 0)?;
    if magic != MAGIC {
        return None;
    }
    let totalsize = read_be32(bytes, 4)?;
    if totalsize > MAX_DT_SIZE || totalsize < HEADER_SIZE {
        return None;
    }
    if (bytes.len() as u64) < u64::from(totalsize) {
        return None;
    }

    let off_dt_struct = read_be32(bytes, 8)?;
    let off_dt_strings = read_be32(bytes, 12)?;
    let size_dt_struct = read_be32(bytes, 20)?;
    let size_dt_strings = read_be32(bytes, 24)?;
    let version = read_be32(bytes, 16)?;

    let struct_end = off_dt_struct.checked_add(size_dt_struct)?;
    let strings_end = off_dt_strings.checked_add(size_dt_strings)?;
    if struct_end > totalsize || strings_end > totalsize {
        return None;
    }

    Some(FdtHeader {
        totalsize,
        off_dt_struct,
        off_dt_strings,
        size_dt_struct,
        size_dt_strings,
        version,
    })
}

/// A property encountered during traversal: its name (resolved from the
/// strings block) and the bounds-checked slice of its raw value.
struct Property<'a> {
    name: &'a [u8],
    value: &'a [u8],
}

impl<'a> Fdt<'a> {
    /// Validates the header and wraps `bytes` for traversal.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        let header = parse_header(bytes)?;
        Some(Self { bytes, header })
    }

    fn string_at(&self, name_offset: u32) -> Option<&'a [u8]> {
        let base = self.header.off_dt_strings.checked_add(name_offset)?;
        if base > self.header.off_dt_strings + self.header.size_dt_strings {
            return None;
        }
        let start = usize::try_from(base).ok()?;
        let slice = self.bytes.get(start..)?;
        let len = slice.iter().take(MAX_SCAN_LEN).position(|&b| b == 0)?;
        Some(&slice[..len])
    }

    /// Visits every node-begin and property in struct-block order, calling
    /// `visit(depth, node_name, property)` for each property encountered
    /// (node_name is the name of the innermost open node). Returns `None`
    /// if the traversal aborts for any reason (bounds, overflow, iteration
    /// ceiling, oversize property, unknown token).
    fn traverse<F: FnMut(u32, &'a [u8], Property<'a>)>(&self, mut visit: F) -> Option<()> {
        let struct_start = self.header.off_dt_struct;
        let struct_size = self.header.size_dt_struct;
        let mut o: u32 = 0;
        let mut depth: u32 = 0;
        let mut tokens: u32 = 0;
        let mut current_name: &[u8] = b"";

        loop {
            tokens = tokens.checked_add(1)?;
            if tokens > MAX_TOKENS {
                return None;
            }
            if o.checked_add(4)? > struct_size {
                return None;
            }
            let token = read_be32(self.bytes, struct_start.checked_add(o)?)?;
            o = o.checked_add(4)?;

            match token {
                FDT_BEGIN_NODE => {
                    depth = depth.checked_add(1)?;
                    let name_off = struct_start.checked_add(o)?;
                    let start = usize::try_from(name_off).ok()?;
                    let slice = self.bytes.get(start..)?;
                    let len = slice
                        .iter()
                        .take(MAX_NODE_NAME_LEN + 1)
                        .position(|&b| b == 0)?;
                    if len >= MAX_NODE_NAME_LEN {
                        return None;
                    }
                    current_name = &slice[..len];
                    let advance = u32::try_from(len + 1).ok()?;
                    o = o.checked_add(advance)?;
                    o = (o.checked_add(3)?) & !3;
                }
                FDT_END_NODE => {
                    depth = depth.checked_sub(1)?;
                }
                FDT_PROP => {
                    if o.checked_add(8)? > struct_size {
                        return None;
                    }
                    let prop_len = read_be32(self.bytes, struct_start.checked_add(o)?)?;
                    if prop_len > MAX_PROPERTY_SIZE {
                        return None;
                    }
                    let name_offset = read_be32(self.bytes, struct_start.checked_add(o)?.checked_add(4)?)?;
                    o = o.checked_add(8)?;
                    let value_off = struct_start.checked_add(o)?;
                    if o.checked_add(prop_len)? > struct_size {
                        return None;
                    }
                    let start = usize::try_from(value_off).ok()?;
                    let end = start.checked_add(usize::try_from(prop_len).ok()?)?;
                    let value = self.bytes.get(start..end)?;
                    let name = self.string_at(name_offset).unwrap_or(b"");
                    visit(depth, current_name, Property { name, value });

                    let padded = (prop_len.checked_add(3)?) & !3;
                    o = o.checked_add(padded)?;
                }
                FDT_NOP => {}
                FDT_END => return Some(()),
                _ => return None,
            }
        }
    }

    /// Searches for a UART/serial node and extracts its `reg` base address
    /// and `interrupts` IRQ number (applying the SPI `+32` convention). Both
    /// properties must be captured from the same node before it is reported
    /// as found: `reg` alone is not enough, since `interrupts` conventionally
    /// follows it and a premature `found` would short-circuit the rest of
    /// the node's properties.
    #[must_use]
    pub fn find_uart(&self) -> UartInfo {
        let mut info = UartInfo::default();
        let mut active_name: &[u8] = b"";
        let mut done = false;
        let _ = self.traverse(|_depth, name, prop| {
            if done {
                return;
            }
            if !name_matches(name, &[b"uart", b"serial", b"pl011"]) {
                return;
            }
            if name != active_name {
                active_name = name;
                info = UartInfo::default();
            }
            if prop.name == b"reg" {
                if let Some(base) = parse_reg_base(prop.value) {
                    info.base_address = base;
                }
            } else if prop.name == b"interrupts" {
                if let Some(irq) = parse_spi_irq(prop.value) {
                    info.irq_number = irq;
                }
            }
            if info.base_address != 0 && info.irq_number != 0 {
                info.found = true;
                done = true;
            }
        });
        info
    }

    /// Searches for a GICv2 node and extracts its distributor and
    /// CPU-interface base addresses from `reg`.
    #[must_use]
    pub fn find_gic(&self) -> GicInfo {
        let mut info = GicInfo::default();
        let _ = self.traverse(|_depth, name, prop| {
            if info.found {
                return;
            }
            if !name_matches(name, &[b"interrupt-controller", b"gic@", b"intc@"]) {
                return;
            }
            if prop.name == b"reg" {
                if let Some((gicd, gicc)) = parse_gic_reg(prop.value) {
                    info.distributor_base = gicd;
                    info.cpu_interface_base = gicc;
                    info.found = true;
                }
            }
        });
        info
    }
}

/// Substring match against a fixed set of needles, each bounded by the
/// shared scan ceiling.
fn name_matches(name: &[u8], needles: &[&[u8]]) -> bool {
    if name.len() > MAX_SCAN_LEN {
        return false;
    }
    needles.iter().any(|needle| contains(name, needle))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return needle.is_empty();
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Parses a `reg` property's first address cell: 32-bit if `prop_len < 8`,
/// else the first 64-bit `hi:lo` pair.
#[must_use]
pub fn parse_reg_base(value: &[u8]) -> Option<u64> {
    if value.len() >= 8 {
        Some(u64::from_be_bytes(value[0..8].try_into().ok()?))
    } else if value.len() >= 4 {
        Some(u64::from(u32::from_be_bytes(value[0..4].try_into().ok()?)))
    } else {
        None
    }
}

/// Parses an `interrupts` property under the `<type irq flags>` SPI
/// convention: the raw second cell is offset by 32 when `type == 0`.
#[must_use]
pub fn parse_spi_irq(value: &[u8]) -> Option<u32> {
    if value.len() < 12 {
        return None;
    }
    let irq_type = u32::from_be_bytes(value[0..4].try_into().ok()?);
    let raw_irq = u32::from_be_bytes(value[4..8].try_into().ok()?);
    if irq_type == 0 {
        raw_irq.checked_add(32)
    } else {
        Some(raw_irq)
    }
}

/// Parses a GIC `reg` property as either four 32-bit cells
/// `<gicd_base gicd_size gicc_base gicc_size>` or eight 32-bit cells when
/// addresses/sizes are 64-bit, returning `(distributor_base,
/// cpu_interface_base)`.
#[must_use]
pub fn parse_gic_reg(value: &[u8]) -> Option<(u64, u64)> {
    if value.len() >= 32 {
        let gicd = u64::from_be_bytes(value[0..8].try_into().ok()?);
        let gicc = u64::from_be_bytes(value[16..24].try_into().ok()?);
        Some((gicd, gicc))
    } else if value.len() >= 16 {
        let gicd = u64::from(u32::from_be_bytes(value[0..4].try_into().ok()?));
        let gicc = u64::from(u32::from_be_bytes(value[8..12].try_into().ok()?));
        Some((gicd, gicc))
    } else {
        None
    }
}

/// Parses an FDT blob and returns the UART and GIC discovery results,
/// falling back to "not found" for either on any malformed input.
#[must_use]
pub fn discover(bytes: &[u8]) -> Option<(UartInfo, GicInfo)> {
    let fdt = Fdt::new(bytes)?;
    Some((fdt.find_uart(), fdt.find_gic()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn be32(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    fn prop_token(name_offset: u32, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&be32(FDT_PROP));
        out.extend_from_slice(&be32(u32::try_from(value.len()).unwrap()));
        out.extend_from_slice(&be32(name_offset));
        out.extend_from_slice(value);
        let pad = (4 - (value.len() % 4)) % 4;
        out.extend(core::iter::repeat(0u8).take(pad));
        out
    }

    /// Builds a minimal valid FDT blob wrapping `struct_block`.
    fn build_blob(struct_block: &[u8]) -> Vec<u8> {
        let struct_size = u32::try_from(struct_block.len()).unwrap();
        let strings: &[u8] = b"reg\0interrupts\0compatible\0";
        let strings_size = u32::try_from(strings.len()).unwrap();

        let off_dt_struct = HEADER_SIZE;
        let off_dt_strings = off_dt_struct + struct_size;
        let totalsize = off_dt_strings + strings_size;

        let mut out = Vec::new();
        out.extend_from_slice(&be32(MAGIC));
        out.extend_from_slice(&be32(totalsize));
        out.extend_from_slice(&be32(off_dt_struct));
        out.extend_from_slice(&be32(off_dt_strings));
        out.extend_from_slice(&be32(17)); // version
        out.extend_from_slice(&be32(16)); // last_comp_version
        out.extend_from_slice(&be32(0)); // boot_cpuid_phys
        out.extend_from_slice(&be32(strings_size));
        out.extend_from_slice(&be32(struct_size));
        out.extend_from_slice(struct_block);
        out.extend_from_slice(strings);
        out
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut blob = [0u8; 40];
        blob[0..4].copy_from_slice(&be32(0xdead_beef));
        assert!(parse_header(&blob).is_none());
    }

    #[test]
    fn header_max_totalsize_accepted_one_more_rejected() {
        let blob = build_blob(&[]);
        assert!(parse_header(&blob).is_some());

        let mut oversize = [0u8; 40];
        oversize[0..4].copy_from_slice(&be32(MAGIC));
        oversize[4..8].copy_from_slice(&be32(MAX_DT_SIZE + 1));
        assert!(parse_header(&oversize).is_none());
    }

    #[test]
    fn spi_irq_offset_applied_for_type_zero() {
        let value = [be32(0), be32(1), be32(4)].concat();
        assert_eq!(parse_spi_irq(&value), Some(33));
    }

    #[test]
    fn spi_irq_not_offset_for_nonzero_type() {
        let value = [be32(1), be32(5), be32(4)].concat();
        assert_eq!(parse_spi_irq(&value), Some(5));
    }

    #[test]
    fn reg_base_prefers_64_bit_pair() {
        let value = [be32(0), be32(0x0900_0000)].concat();
        assert_eq!(parse_reg_base(&value), Some(0x0900_0000));
    }

    #[test]
    fn reg_base_falls_back_to_32_bit() {
        let value = be32(0x0900_0000);
        assert_eq!(parse_reg_base(&value), Some(0x0900_0000));
    }

    #[test]
    fn gic_reg_parses_four_cell_form() {
        let value = [be32(0x0800_0000), be32(0x1000), be32(0x0801_0000), be32(0x1000)].concat();
        assert_eq!(parse_gic_reg(&value), Some((0x0800_0000, 0x0801_0000)));
    }

    #[test]
    fn full_traversal_discovers_qemu_virt_uart() {
        let mut struct_block = Vec::new();
        struct_block.extend_from_slice(&be32(FDT_BEGIN_NODE));
        struct_block.extend_from_slice(b"pl011@9000000\0\0\0");
        assert_eq!(struct_block.len() % 4, 0);

        let reg_value = [be32(0), be32(0x0900_0000)].concat();
        struct_block.extend_from_slice(&prop_token(0, &reg_value));

        let irq_value = [be32(0), be32(1), be32(4)].concat();
        struct_block.extend_from_slice(&prop_token(4, &irq_value));

        struct_block.extend_from_slice(&be32(FDT_END_NODE));
        struct_block.extend_from_slice(&be32(FDT_END));

        let blob = build_blob(&struct_block);
        let (uart, _gic) = discover(&blob).expect("valid blob");
        assert!(uart.found);
        assert_eq!(uart.base_address, 0x0900_0000);
        assert_eq!(uart.irq_number, 33);
    }

    #[test]
    fn malformed_blob_is_rejected_not_panicked() {
        let blob = [0u8; 4];
        assert!(Fdt::new(&blob).is_none());
    }

    fn begin_node_block(name_len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&be32(FDT_BEGIN_NODE));
        out.extend(core::iter::repeat(b'a').take(name_len));
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out.extend_from_slice(&be32(FDT_END_NODE));
        out.extend_from_slice(&be32(FDT_END));
        out
    }

    #[test]
    fn node_name_exactly_4095_bytes_is_accepted() {
        let blob = build_blob(&begin_node_block(4095));
        let fdt = Fdt::new(&blob).expect("valid header");
        assert!(fdt.traverse(|_depth, _name, _prop| {}).is_some());
    }

    #[test]
    fn node_name_4096_bytes_is_rejected() {
        let blob = build_blob(&begin_node_block(4096));
        let fdt = Fdt::new(&blob).expect("valid header");
        assert!(fdt.traverse(|_depth, _name, _prop| {}).is_none());
    }
}
