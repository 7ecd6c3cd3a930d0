//! RTT Control-Block Model: pure address arithmetic over the on-target
//! control block and its ring descriptors. No I/O of its own.
//!
//! Offsets are expressed as byte-range constants in a private `field`
//! module, e.g. `pub const WR_OFF: Field = 12..16;`, rather than bare
//! numeric literals scattered through the arithmetic below.

use crate::tmg::TargetMemoryGateway;
use std::ops::Range;

type Field = Range<u32>;

/// Byte layout of the Remote Control Block header.
mod rcb_field {
    use super::Field;
    pub const ACID: Field = 0x00..0x10;
    pub const MAX_NUM_UP: Field = 0x10..0x14;
    pub const MAX_NUM_DOWN: Field = 0x14..0x18;
    pub const DESCRIPTORS_START: u32 = 0x18;
    pub const DESCRIPTOR_LEN: u32 = 24;
}

/// Byte layout of one 24-byte ring descriptor.
mod rd_field {
    use super::Field;
    pub const SNAME: Field = 0..4;
    pub const PBUFFER: Field = 4..8;
    pub const SIZE_OF_BUFFER: Field = 8..12;
    pub const WR_OFF: Field = 12..16;
    pub const RD_OFF: Field = 16..20;
    pub const FLAGS: Field = 20..24;
}

pub fn addr_acid(base: u32) -> u32 {
    base + rcb_field::ACID.start
}

pub fn addr_max_up(base: u32) -> u32 {
    base + rcb_field::MAX_NUM_UP.start
}

pub fn addr_max_down(base: u32) -> u32 {
    base + rcb_field::MAX_NUM_DOWN.start
}

pub fn addr_aup(base: u32, i: u32) -> u32 {
    base + rcb_field::DESCRIPTORS_START + rcb_field::DESCRIPTOR_LEN * i
}

pub fn addr_adown(base: u32, max_num_up: u32, i: u32) -> u32 {
    addr_aup(base, max_num_up) + rcb_field::DESCRIPTOR_LEN * i
}

/// Per-descriptor field addresses, relative to the descriptor's own base
/// address `d` (as returned by `addr_aup`/`addr_adown`).
pub fn addr_sname(d: u32) -> u32 {
    d + rd_field::SNAME.start
}

pub fn addr_pbuffer(d: u32) -> u32 {
    d + rd_field::PBUFFER.start
}

pub fn addr_size_of_buffer(d: u32) -> u32 {
    d + rd_field::SIZE_OF_BUFFER.start
}

pub fn addr_wr_off(d: u32) -> u32 {
    d + rd_field::WR_OFF.start
}

pub fn addr_rd_off(d: u32) -> u32 {
    d + rd_field::RD_OFF.start
}

pub fn addr_flags(d: u32) -> u32 {
    d + rd_field::FLAGS.start
}

/// Write-full policy selected by `Flags & 0x3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Skip,
    Trim,
    Block,
    Unknown(u32),
}

impl WriteMode {
    pub fn from_flags(flags: u32) -> WriteMode {
        match flags & 0x3 {
            0 => WriteMode::Skip,
            1 => WriteMode::Trim,
            2 => WriteMode::Block,
            other => WriteMode::Unknown(other),
        }
    }
}

/// A fetched snapshot of one ring descriptor's read-only-after-init fields
/// plus its current offsets, used by the Ring Transfer Engine.
#[derive(Debug, Clone, Copy)]
pub struct RingDescriptor {
    pub base: u32,
    pub pbuffer: u32,
    pub size_of_buffer: u32,
    pub wr_off: u32,
    pub rd_off: u32,
    pub flags: u32,
}

impl RingDescriptor {
    pub fn write_mode(&self) -> WriteMode {
        WriteMode::from_flags(self.flags)
    }
}

/// Fetches every field of the descriptor at `d` via `tmg`, in one round of
/// reads.
pub fn fetch_descriptor(
    tmg: &TargetMemoryGateway,
    d: u32,
) -> Result<RingDescriptor, crate::error::TransportError> {
    Ok(RingDescriptor {
        base: d,
        pbuffer: tmg.read_u32(addr_pbuffer(d))?,
        size_of_buffer: tmg.read_u32(addr_size_of_buffer(d))?,
        wr_off: tmg.read_u32(addr_wr_off(d))?,
        rd_off: tmg.read_u32(addr_rd_off(d))?,
        flags: tmg.read_u32(addr_flags(d))?,
    })
}

/// Formats `bytes` as whitespace-delimited hex octets.
pub fn hexdump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Diagnostic-only snapshot of the whole control block: acID, buffer
/// counts, and every descriptor's fields. Never used by the mirror loop
/// itself.
pub fn dump(tmg: &TargetMemoryGateway, base: u32) -> Result<String, crate::error::TransportError> {
    let acid = tmg.read_cstring(addr_acid(base), 16)?;
    let max_up = tmg.read_u32(addr_max_up(base))?;
    let max_down = tmg.read_u32(addr_max_down(base))?;

    let mut out = format!(
        "RTT control block @ {base:#010x}: acID={:?} MaxNumUpBuffers={max_up} MaxNumDownBuffers={max_down}\n",
        String::from_utf8_lossy(&acid)
    );

    for i in 0..max_up {
        let d = addr_aup(base, i);
        let desc = fetch_descriptor(tmg, d)?;
        out += &format!(
            "  up[{i}] @ {d:#010x}: pBuffer={:#010x} SizeOfBuffer={} WrOff={} RdOff={} Flags={:#x}\n",
            desc.pbuffer, desc.size_of_buffer, desc.wr_off, desc.rd_off, desc.flags
        );
    }
    for i in 0..max_down {
        let d = addr_adown(base, max_up, i);
        let desc = fetch_descriptor(tmg, d)?;
        out += &format!(
            "  down[{i}] @ {d:#010x}: pBuffer={:#010x} SizeOfBuffer={} WrOff={} RdOff={} Flags={:#x}\n",
            desc.pbuffer, desc.size_of_buffer, desc.wr_off, desc.rd_off, desc.flags
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_spec_table() {
        let base = 0x2000_0000;
        assert_eq!(addr_acid(base), base);
        assert_eq!(addr_max_up(base), base + 0x10);
        assert_eq!(addr_max_down(base), base + 0x14);
        assert_eq!(addr_aup(base, 0), base + 0x18);
        assert_eq!(addr_aup(base, 1), base + 0x18 + 24);
        assert_eq!(addr_adown(base, 3, 0), base + 0x18 + 24 * 3);
    }

    #[test]
    fn descriptor_field_offsets() {
        let d = 0x1000;
        assert_eq!(addr_sname(d), d);
        assert_eq!(addr_pbuffer(d), d + 4);
        assert_eq!(addr_size_of_buffer(d), d + 8);
        assert_eq!(addr_wr_off(d), d + 12);
        assert_eq!(addr_rd_off(d), d + 16);
        assert_eq!(addr_flags(d), d + 20);
    }

    #[test]
    fn write_mode_masks_low_two_bits() {
        assert_eq!(WriteMode::from_flags(0b1000), WriteMode::Skip);
        assert_eq!(WriteMode::from_flags(0b1001), WriteMode::Trim);
        assert_eq!(WriteMode::from_flags(0b1010), WriteMode::Block);
        assert_eq!(WriteMode::from_flags(0b1011), WriteMode::Unknown(3));
    }

    #[test]
    fn hexdump_formats_bytes() {
        assert_eq!(hexdump(&[0x00, 0xff, 0x0a]), "00 ff 0a");
    }
}
