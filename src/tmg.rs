//! Target Memory Gateway: a byte-granular reader/writer over the debugger
//! remote API, with a small retry policy for transient transport errors.

use crate::debugger::{DebuggerLink, LinkError, LinkHandle, MemorySpace};
use crate::error::TransportError;
use byteorder::{ByteOrder, LittleEndian};
use std::thread::sleep;
use std::time::Duration;

/// Retries before a transport error is surfaced as fatal.
pub const TMG_RETRY_COUNT: u32 = 8;
/// Pause between retries, milliseconds.
pub const TMG_RETRY_DELAY_MS: u64 = 5;

/// Runs `op` up to `TMG_RETRY_COUNT + 1` times, sleeping `TMG_RETRY_DELAY_MS`
/// between attempts, but only when the failure is a transport error
/// (`LinkError::ReceiveFail`/`TransmitFail`). Any other failure is returned
/// immediately as fatal. Shared by the Target Memory Gateway and the
/// Debugger Coordinator's state-polling calls.
pub fn with_retries<T>(mut op: impl FnMut() -> Result<T, LinkError>) -> Result<T, TransportError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(LinkError::Other(detail)) => {
                // Non-transport errors are fatal immediately, but TMG's
                // fatal-error vocabulary only distinguishes transport
                // kinds; fold this into a single-shot transmit failure so
                // the caller still sees *a* TransportError rather than
                // silently retrying forever.
                return Err(TransportError::TransmitFail { retries: 0, detail });
            }
            Err(LinkError::ReceiveFail(detail)) if attempt < TMG_RETRY_COUNT => {
                attempt += 1;
                sleep(Duration::from_millis(TMG_RETRY_DELAY_MS));
                let _ = detail;
            }
            Err(LinkError::TransmitFail(detail)) if attempt < TMG_RETRY_COUNT => {
                attempt += 1;
                sleep(Duration::from_millis(TMG_RETRY_DELAY_MS));
                let _ = detail;
            }
            Err(LinkError::ReceiveFail(detail)) => {
                return Err(TransportError::ReceiveFail {
                    retries: attempt,
                    detail,
                })
            }
            Err(LinkError::TransmitFail(detail)) => {
                return Err(TransportError::TransmitFail {
                    retries: attempt,
                    detail,
                })
            }
        }
    }
}

/// Byte-granular access to the target's "E:" (emulation/physical) memory
/// space, wrapping a shared `DebuggerLink` the same way a device driver
/// wraps a shared descriptor split between independent read/write halves.
pub struct TargetMemoryGateway {
    link: LinkHandle,
}

impl TargetMemoryGateway {
    pub fn new(link: LinkHandle) -> Self {
        TargetMemoryGateway { link }
    }

    pub fn read_bytes(&self, addr: u32, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        with_retries(|| {
            self.link
                .borrow_mut()
                .read_memory(addr, MemorySpace::Emulation, &mut buf)
        })?;
        Ok(buf)
    }

    pub fn write_bytes(&self, addr: u32, bytes: &[u8]) -> Result<(), TransportError> {
        with_retries(|| {
            self.link
                .borrow_mut()
                .write_memory(addr, MemorySpace::Emulation, bytes)
        })
    }

    /// Little-endian 32-bit, decoded with `byteorder` rather than raw
    /// `to_le_bytes`/`from_le_bytes`.
    pub fn read_u32(&self, addr: u32) -> Result<u32, TransportError> {
        let bytes = self.read_bytes(addr, 4)?;
        Ok(LittleEndian::read_u32(&bytes))
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, TransportError> {
        Ok(self.read_bytes(addr, 1)?[0])
    }

    pub fn write_u32(&self, addr: u32, v: u32) -> Result<(), TransportError> {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, v);
        self.write_bytes(addr, &bytes)
    }

    pub fn write_u8(&self, addr: u32, v: u8) -> Result<(), TransportError> {
        self.write_bytes(addr, &[v])
    }

    /// Reads up to `max_len` bytes starting at `addr` and stops at the
    /// first NUL, or at `max_len` if none is found (the acID/sName fields
    /// are at most 16/unbounded-but-practically-short C strings).
    pub fn read_cstring(&self, addr: u32, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let raw = self.read_bytes(addr, max_len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(raw[..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::fake::FakeLink;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn gateway() -> (TargetMemoryGateway, LinkHandle) {
        let link: LinkHandle = Rc::new(RefCell::new(FakeLink::new()));
        (TargetMemoryGateway::new(link.clone()), link)
    }

    #[test]
    fn round_trips_u32() {
        let (tmg, _link) = gateway();
        tmg.write_u32(0x2000_0000, 0xdead_beef).unwrap();
        assert_eq!(tmg.read_u32(0x2000_0000).unwrap(), 0xdead_beef);
    }

    #[test]
    fn read_cstring_stops_at_nul() {
        let (tmg, _link) = gateway();
        tmg.write_bytes(0x1000, b"abc\0junk").unwrap();
        assert_eq!(tmg.read_cstring(0x1000, 8).unwrap(), b"abc");
    }

    #[test]
    fn retries_transient_failures_then_succeeds() {
        let link: LinkHandle = Rc::new(RefCell::new(FakeLink::new().failing_reads(3)));
        let tmg = TargetMemoryGateway::new(link);
        tmg.write_u8(0x10, 7).unwrap_or(()); // write path unaffected by read-failure counter
        let result = tmg.read_u8(0x10);
        assert!(result.is_ok());
    }

    #[test]
    fn exhausts_retries_and_surfaces_fatal() {
        let link: LinkHandle = Rc::new(RefCell::new(FakeLink::new().failing_reads(100)));
        let tmg = TargetMemoryGateway::new(link);
        let err = tmg.read_u8(0x10).unwrap_err();
        assert!(matches!(err, TransportError::ReceiveFail { .. }));
    }
}
