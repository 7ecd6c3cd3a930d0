//! Ring Transfer Engine: the read-up and write-down algorithms that
//! manipulate the ring buffers on the target through the Target Memory
//! Gateway, honoring the wrap-around invariants and the per-ring
//! write-mode (skip / trim / block).
//!
//! Fixed assumption for this whole module: operates on channel index 0
//! (the reserved "Terminal" channel). The engine never creates or resizes
//! rings.

use crate::error::TransportError;
use crate::rcbm::{self, RingDescriptor, WriteMode};
use crate::tmg::TargetMemoryGateway;
use std::thread::sleep;
use std::time::Duration;

/// Sleep between no-progress iterations of the Block-mode write loop, so
/// it does not busy-spin the probe link while waiting on the target to
/// drain.
const BLOCK_SPIN_DELAY: Duration = Duration::from_millis(1);

/// Available-space query: free space in a ring of length `s` given current
/// `RdOff` `r` and `WrOff` `w`.
pub fn free_space(r: u32, w: u32, s: u32) -> u32 {
    if s == 0 {
        return 0;
    }
    if r <= w {
        s - 1 - w + r
    } else {
        r - w - 1
    }
}

/// Bytes-in-buffer query.
pub fn bytes_used(r: u32, w: u32, s: u32) -> u32 {
    if s == 0 {
        return 0;
    }
    if r <= w {
        w - r
    } else {
        s - (r - w)
    }
}

/// Reads up to `capacity` bytes from the up-ring descriptor at `d` into a
/// freshly allocated buffer, advancing and writing back `RdOff` if
/// anything was copied. Returns `0 <= n <= capacity` bytes. This is the
/// only function in the crate permitted to write an up ring's `RdOff`;
/// every other field of an up ring is treated as read-only.
pub fn read_up(
    tmg: &TargetMemoryGateway,
    d: u32,
    capacity: usize,
) -> Result<Vec<u8>, TransportError> {
    let desc = rcbm::fetch_descriptor(tmg, d)?;
    if desc.size_of_buffer == 0 || capacity == 0 {
        return Ok(Vec::new());
    }

    let mut r = desc.rd_off;
    let w = desc.wr_off;
    let s = desc.size_of_buffer;
    let p = desc.pbuffer;
    let mut remaining = capacity as u32;
    let mut out = Vec::with_capacity(capacity);

    if r > w {
        let n = (s - r).min(remaining);
        if n > 0 {
            out.extend_from_slice(&tmg.read_bytes(p + r, n as usize)?);
            r += n;
            remaining -= n;
            if r == s {
                r = 0;
            }
        }
    }

    // r may still be > w here if capacity ran out before step 1 finished
    // draining the tail (r stays unreset in that case); nothing left to
    // read from this second span when that happens.
    let n = w.saturating_sub(r).min(remaining);
    if n > 0 {
        out.extend_from_slice(&tmg.read_bytes(p + r, n as usize)?);
        r += n;
    }

    if !out.is_empty() {
        tmg.write_u32(rcbm::addr_rd_off(d), r)?;
    }
    Ok(out)
}

/// Writes `src` into the down-ring descriptor at `d` according to its
/// write-mode flags, returning the number of bytes actually written. This
/// is the only function in the crate permitted to write a down ring's
/// `WrOff` (or its data area); every other field is treated as read-only.
pub fn write_down(
    tmg: &TargetMemoryGateway,
    d: u32,
    src: &[u8],
) -> Result<usize, TransportError> {
    if src.is_empty() {
        return Ok(0);
    }

    let desc = rcbm::fetch_descriptor(tmg, d)?;
    if desc.size_of_buffer == 0 {
        return Ok(0);
    }

    match desc.write_mode() {
        WriteMode::Skip => write_skip(tmg, d, &desc, src),
        WriteMode::Trim => write_trim(tmg, d, &desc, src),
        WriteMode::Block => write_block(tmg, d, &desc, src),
        WriteMode::Unknown(_) => Ok(0),
    }
}

fn write_skip(
    tmg: &TargetMemoryGateway,
    d: u32,
    desc: &RingDescriptor,
    src: &[u8],
) -> Result<usize, TransportError> {
    let r = tmg.read_u32(rcbm::addr_rd_off(d))?;
    let free = free_space(r, desc.wr_off, desc.size_of_buffer);
    if (free as usize) < src.len() {
        return Ok(0);
    }
    unchecked_write(tmg, d, desc.pbuffer, desc.size_of_buffer, desc.wr_off, src)
}

fn write_trim(
    tmg: &TargetMemoryGateway,
    d: u32,
    desc: &RingDescriptor,
    src: &[u8],
) -> Result<usize, TransportError> {
    let r = tmg.read_u32(rcbm::addr_rd_off(d))?;
    let free = free_space(r, desc.wr_off, desc.size_of_buffer);
    let n = (free as usize).min(src.len());
    if n == 0 {
        return Ok(0);
    }
    unchecked_write(tmg, d, desc.pbuffer, desc.size_of_buffer, desc.wr_off, &src[..n])
}

/// The unchecked inner write shared by Skip and Trim after their
/// availability check has already bounded `src` to what fits: one
/// contiguous copy if it does not cross the wrap point, otherwise a split
/// copy.
fn unchecked_write(
    tmg: &TargetMemoryGateway,
    d: u32,
    p: u32,
    s: u32,
    w: u32,
    src: &[u8],
) -> Result<usize, TransportError> {
    let l = src.len() as u32;
    let new_w = if l <= s - w {
        tmg.write_bytes(p + w, src)?;
        w + l
    } else {
        let first = (s - w) as usize;
        tmg.write_bytes(p + w, &src[..first])?;
        tmg.write_bytes(p, &src[first..])?;
        l - (s - w)
    };
    tmg.write_u32(rcbm::addr_wr_off(d), new_w % s)?;
    Ok(src.len())
}

/// Block-mode write: loops until all of `src` is written, re-reading
/// `RdOff` fresh each pass since the consumer may advance it at any time.
/// Partial writes are possible if the caller stops calling this between
/// iterations (no rollback) — here that can only happen via a transport
/// error, since the loop itself does not yield control back to the
/// caller.
fn write_block(
    tmg: &TargetMemoryGateway,
    d: u32,
    desc: &RingDescriptor,
    src: &[u8],
) -> Result<usize, TransportError> {
    let p = desc.pbuffer;
    let s = desc.size_of_buffer;
    let mut written = 0usize;
    let mut w = desc.wr_off;

    while written < src.len() {
        let r = tmg.read_u32(rcbm::addr_rd_off(d))?;
        let remaining = (src.len() - written) as u32;
        let can = free_space(r, w, s).min(s - w).min(remaining);

        if can == 0 {
            sleep(BLOCK_SPIN_DELAY);
            continue;
        }

        tmg.write_bytes(p + w, &src[written..written + can as usize])?;
        w = (w + can) % s;
        tmg.write_u32(rcbm::addr_wr_off(d), w)?;
        written += can as usize;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::fake::FakeLink;
    use crate::tmg::TargetMemoryGateway;
    use std::cell::RefCell;
    use std::rc::Rc;

    const DESC: u32 = 0x3000_0000;
    const BUF: u32 = 0x3000_1000;

    fn gateway() -> TargetMemoryGateway {
        let link = Rc::new(RefCell::new(FakeLink::new()));
        TargetMemoryGateway::new(link)
    }

    fn install_descriptor(tmg: &TargetMemoryGateway, s: u32, wr: u32, rd: u32, flags: u32) {
        tmg.write_u32(rcbm::addr_pbuffer(DESC), BUF).unwrap();
        tmg.write_u32(rcbm::addr_size_of_buffer(DESC), s).unwrap();
        tmg.write_u32(rcbm::addr_wr_off(DESC), wr).unwrap();
        tmg.write_u32(rcbm::addr_rd_off(DESC), rd).unwrap();
        tmg.write_u32(rcbm::addr_flags(DESC), flags).unwrap();
    }

    #[test]
    fn free_space_formula_both_branches() {
        assert_eq!(free_space(0, 0, 8), 7);
        assert_eq!(free_space(6, 3, 8), 2);
    }

    #[test]
    fn bytes_used_formula_both_branches() {
        assert_eq!(bytes_used(0, 6, 16), 6);
        assert_eq!(bytes_used(6, 3, 8), 5);
    }

    #[test]
    fn read_up_empty_ring_is_idempotent() {
        let tmg = gateway();
        install_descriptor(&tmg, 16, 0, 0, 0);
        let out = read_up(&tmg, DESC, 64).unwrap();
        assert!(out.is_empty());
        assert_eq!(tmg.read_u32(rcbm::addr_rd_off(DESC)).unwrap(), 0);
    }

    #[test]
    fn burst_up_no_wrap() {
        let tmg = gateway();
        install_descriptor(&tmg, 16, 6, 0, 0);
        tmg.write_bytes(BUF, b"HELLO\n").unwrap();
        let out = read_up(&tmg, DESC, 2048).unwrap();
        assert_eq!(out, b"HELLO\n");
        assert_eq!(tmg.read_u32(rcbm::addr_rd_off(DESC)).unwrap(), 6);
    }

    #[test]
    fn wrap_read_bounded_by_capacity_does_not_underflow_second_span() {
        // S=5000, RdOff=2500, WrOff=100, capacity=2048 (the mirror loop's
        // fixed scratch size): capacity exhausts inside the tail span, so
        // the second span must see nothing left to read rather than
        // underflow computing `w - r`.
        let tmg = gateway();
        install_descriptor(&tmg, 5000, 100, 2500, 0);
        let out = read_up(&tmg, DESC, 2048).unwrap();
        assert_eq!(out.len(), 2048);
        assert_eq!(tmg.read_u32(rcbm::addr_rd_off(DESC)).unwrap(), 2500 + 2048);
    }

    #[test]
    fn wrap_up_reads_in_order() {
        let tmg = gateway();
        // S=8, RdOff=6, WrOff=3: bytes present at indices 6,7,0,1,2.
        install_descriptor(&tmg, 8, 3, 6, 0);
        tmg.write_u8(BUF + 6, b'A').unwrap();
        tmg.write_u8(BUF + 7, b'B').unwrap();
        tmg.write_u8(BUF + 0, b'C').unwrap();
        tmg.write_u8(BUF + 1, b'D').unwrap();
        tmg.write_u8(BUF + 2, b'E').unwrap();
        let out = read_up(&tmg, DESC, 2048).unwrap();
        assert_eq!(out, b"ABCDE");
        assert_eq!(tmg.read_u32(rcbm::addr_rd_off(DESC)).unwrap(), 3);
    }

    #[test]
    fn wrap_exactly_at_end_of_buffer() {
        let tmg = gateway();
        install_descriptor(&tmg, 8, 7, 7, 0); // WrOff = S-1, empty ring: write one byte -> WrOff=0
        let n = write_down(&tmg, DESC, b"x").unwrap();
        assert_eq!(n, 1);
        assert_eq!(tmg.read_u32(rcbm::addr_wr_off(DESC)).unwrap(), 0);
    }

    #[test]
    fn skip_mode_rejects_when_insufficient_free() {
        let tmg = gateway();
        install_descriptor(&tmg, 8, 7, 0, 0); // free = 0
        let n = write_down(&tmg, DESC, b"A").unwrap();
        assert_eq!(n, 0);
        assert_eq!(tmg.read_u32(rcbm::addr_wr_off(DESC)).unwrap(), 7);
        assert_eq!(tmg.read_u32(rcbm::addr_rd_off(DESC)).unwrap(), 0);
    }

    #[test]
    fn trim_mode_copies_exactly_free_minus_l_case() {
        let tmg = gateway();
        // Choose R,W,S so free == 3: free = S-1-W+R if R<=W.
        // S=8, W=4, R=0 => free = 8-1-4+0 = 3.
        install_descriptor(&tmg, 8, 4, 0, 1);
        let n = write_down(&tmg, DESC, b"ABCDE").unwrap();
        assert_eq!(n, 3);
        // WrOff advances by 3 bytes from 4 -> 7 (no wrap, since 3 <= 8-4).
        assert_eq!(tmg.read_u32(rcbm::addr_wr_off(DESC)).unwrap(), 7);
        let copied = tmg.read_bytes(BUF + 4, 3).unwrap();
        assert_eq!(copied, b"ABC");
    }

    #[test]
    fn block_mode_wraps_with_split_copy() {
        let tmg = gateway();
        // S=8, WrOff=6, RdOff=6 => free=7.
        install_descriptor(&tmg, 8, 6, 6, 2);
        let n = write_down(&tmg, DESC, b"1234567").unwrap();
        assert_eq!(n, 7);
        assert_eq!(tmg.read_u32(rcbm::addr_wr_off(DESC)).unwrap(), 5);
        // First chunk (2 bytes) at the tail of the buffer, rest wraps to the front.
        assert_eq!(tmg.read_bytes(BUF + 6, 2).unwrap(), b"12");
        assert_eq!(tmg.read_bytes(BUF, 5).unwrap(), b"34567");
    }

    #[test]
    fn block_mode_makes_bounded_progress_per_consumer_advance() {
        let tmg = gateway();
        // free = 0 initially: S=8, W=0, R=1 (free = S-1-W+R = 8-1-0+1 = 8?? need R<=W false branch)
        // Use R>W: S=8, W=0, R=0 -> R<=W so free=7, not 0. Pick W=1,R=2: free = R-W-1 = 0.
        install_descriptor(&tmg, 8, 1, 2, 2);
        // Simulate the consumer draining one byte (RdOff advances by 1) after the
        // writer observes free=0 once; write_down loops internally, so instead we
        // directly exercise the "can" formula driving bounded progress by checking
        // that advancing RdOff by m frees exactly m bytes for the next call.
        assert_eq!(free_space(2, 1, 8), 0);
        tmg.write_u32(rcbm::addr_rd_off(DESC), 2 + 3).unwrap(); // consumer advances by 3
        assert_eq!(free_space(5, 1, 8), 3);
    }

    #[test]
    fn l_zero_is_noop_in_every_mode() {
        for flags in [0u32, 1, 2] {
            let tmg = gateway();
            install_descriptor(&tmg, 8, 3, 0, flags);
            let n = write_down(&tmg, DESC, b"").unwrap();
            assert_eq!(n, 0);
            assert_eq!(tmg.read_u32(rcbm::addr_wr_off(DESC)).unwrap(), 3);
        }
    }

    #[test]
    fn zero_size_ring_fails_gracefully() {
        let tmg = gateway();
        install_descriptor(&tmg, 0, 0, 0, 0);
        assert_eq!(write_down(&tmg, DESC, b"x").unwrap(), 0);
        assert!(read_up(&tmg, DESC, 64).unwrap().is_empty());
    }

    #[test]
    fn unknown_flag_value_writes_nothing() {
        let tmg = gateway();
        install_descriptor(&tmg, 8, 0, 0, 3);
        assert_eq!(write_down(&tmg, DESC, b"x").unwrap(), 0);
    }

    #[test]
    fn ownership_invariant_read_up_never_touches_down_fields() {
        let tmg = gateway();
        install_descriptor(&tmg, 16, 6, 0, 0);
        tmg.write_bytes(BUF, b"HELLO\n").unwrap();
        let pbuffer_before = tmg.read_u32(rcbm::addr_pbuffer(DESC)).unwrap();
        let size_before = tmg.read_u32(rcbm::addr_size_of_buffer(DESC)).unwrap();
        let flags_before = tmg.read_u32(rcbm::addr_flags(DESC)).unwrap();
        let wr_before = tmg.read_u32(rcbm::addr_wr_off(DESC)).unwrap();
        read_up(&tmg, DESC, 2048).unwrap();
        assert_eq!(tmg.read_u32(rcbm::addr_pbuffer(DESC)).unwrap(), pbuffer_before);
        assert_eq!(tmg.read_u32(rcbm::addr_size_of_buffer(DESC)).unwrap(), size_before);
        assert_eq!(tmg.read_u32(rcbm::addr_flags(DESC)).unwrap(), flags_before);
        assert_eq!(tmg.read_u32(rcbm::addr_wr_off(DESC)).unwrap(), wr_before);
    }

    /// Randomized exercise of the Trim-mode invariant across many
    /// `(SizeOfBuffer, WrOff, RdOff, payload length)` combinations: the
    /// engine never reports copying more than `free`, never more than the
    /// payload, and `WrOff` always advances by exactly what was reported.
    #[test]
    fn trim_mode_holds_free_and_length_bound_across_random_inputs() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let tmg = gateway();
            let s: u32 = rng.gen_range(2..64);
            let w: u32 = rng.gen_range(0..s);
            let r: u32 = rng.gen_range(0..s);
            install_descriptor(&tmg, s, w, r, 1);
            let len: usize = rng.gen_range(0..32);
            let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();

            let free = free_space(r, w, s);
            let expected = (free as usize).min(len);

            let written = write_down(&tmg, DESC, &payload).unwrap();
            assert_eq!(written, expected);

            let new_w = tmg.read_u32(rcbm::addr_wr_off(DESC)).unwrap();
            assert_eq!(new_w, (w + written as u32) % s);
        }
    }
}
