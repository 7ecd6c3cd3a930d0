//! A `DebuggerLink` that speaks to a real debugger host over UDP, following
//! the TRACE32 Remote API's request/response-over-UDP shape (`T32_Config`,
//! `T32_Init`, `T32_Attach`, ...). The exact on-wire opcode layout is an
//! implementation detail of that proprietary protocol; this module models
//! it as a minimal fixed-header framing (`opcode`, `sequence`,
//! length-prefixed payload) sufficient to drive the narrow `DebuggerLink`
//! surface this crate actually needs.

use super::{CpuState, DebuggerLink, DeviceKind, LinkError, MemorySpace, ScriptState, Symbol};
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

const DEFAULT_PACKLEN: usize = 1024;
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

#[repr(u8)]
#[derive(Clone, Copy)]
enum Opcode {
    Config = 1,
    Init = 2,
    Attach = 3,
    Nop = 4,
    Ping = 5,
    GetSymbol = 6,
    GetState = 7,
    GetPracticeState = 8,
    Stop = 9,
    Go = 10,
    Break = 11,
    Cmd = 12,
    ReadMemory = 13,
    WriteMemory = 14,
    Exit = 15,
}

/// A live UDP session to a debugger host's remote-API port.
pub struct UdpLink {
    socket: UdpSocket,
    seq: u8,
    packlen: usize,
}

impl UdpLink {
    /// Binds an ephemeral local UDP socket and targets `node:port`. Does not
    /// itself send any packets; `DebuggerLink::init`/`config` do that.
    pub fn connect(node: &str, port: u16) -> Result<UdpLink, LinkError> {
        let addr = (node, port)
            .to_socket_addrs()
            .map_err(|e| LinkError::Other(format!("unresolvable node {node}: {e}")))?
            .next()
            .ok_or_else(|| LinkError::Other(format!("unresolvable node {node}")))?;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| LinkError::Other(format!("failed to bind local udp socket: {e}")))?;
        socket
            .connect(addr)
            .map_err(|e| LinkError::Other(format!("failed to target {addr}: {e}")))?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(|e| LinkError::Other(format!("set_read_timeout failed: {e}")))?;

        Ok(UdpLink {
            socket,
            seq: 0,
            packlen: DEFAULT_PACKLEN,
        })
    }

    pub fn set_packlen(&mut self, packlen: usize) {
        self.packlen = packlen.min(DEFAULT_PACKLEN);
    }

    fn exchange(&mut self, opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
        self.seq = self.seq.wrapping_add(1);
        let mut frame = Vec::with_capacity(2 + payload.len());
        frame.push(opcode as u8);
        frame.push(self.seq);
        frame.extend_from_slice(payload);
        if frame.len() > self.packlen {
            return Err(LinkError::Other(format!(
                "frame of {} bytes exceeds configured packlen {}",
                frame.len(),
                self.packlen
            )));
        }

        self.socket
            .send(&frame)
            .map_err(|e| LinkError::TransmitFail(e.to_string()))?;

        let mut buf = [0u8; DEFAULT_PACKLEN];
        let n = self
            .socket
            .recv(&mut buf)
            .map_err(|e| LinkError::ReceiveFail(e.to_string()))?;
        if n < 2 || buf[1] != self.seq {
            return Err(LinkError::ReceiveFail("sequence mismatch or short reply".into()));
        }
        Ok(buf[2..n].to_vec())
    }
}

impl DebuggerLink for UdpLink {
    fn config(&mut self, key: &str, value: &str) -> Result<(), LinkError> {
        let mut payload = key.as_bytes().to_vec();
        payload.push(b'=');
        payload.extend_from_slice(value.as_bytes());
        self.exchange(Opcode::Config, &payload).map(|_| ())
    }

    fn init(&mut self) -> Result<(), LinkError> {
        self.exchange(Opcode::Init, &[]).map(|_| ())
    }

    fn attach(&mut self, device: DeviceKind) -> Result<(), LinkError> {
        let code = match device {
            DeviceKind::Icd => 1u8,
        };
        self.exchange(Opcode::Attach, &[code]).map(|_| ())
    }

    fn nop(&mut self) -> Result<(), LinkError> {
        self.exchange(Opcode::Nop, &[]).map(|_| ())
    }

    fn ping(&mut self) -> Result<(), LinkError> {
        self.exchange(Opcode::Ping, &[]).map(|_| ())
    }

    fn get_symbol(&mut self, name: &str) -> Result<Symbol, LinkError> {
        let reply = self.exchange(Opcode::GetSymbol, name.as_bytes())?;
        if reply.len() < 8 {
            return Err(LinkError::Other(format!("symbol not found: {name}")));
        }
        let address = u32::from_le_bytes(reply[0..4].try_into().unwrap());
        let size = u32::from_le_bytes(reply[4..8].try_into().unwrap());
        Ok(Symbol { address, size })
    }

    fn get_state(&mut self) -> Result<CpuState, LinkError> {
        let reply = self.exchange(Opcode::GetState, &[])?;
        let code = *reply.first().ok_or_else(|| LinkError::Other("empty state reply".into()))?;
        Ok(CpuState::from_code(code as i32))
    }

    fn get_practice_state(&mut self) -> Result<ScriptState, LinkError> {
        let reply = self.exchange(Opcode::GetPracticeState, &[])?;
        let code = *reply.first().ok_or_else(|| LinkError::Other("empty state reply".into()))?;
        Ok(ScriptState::from_code(code as i32))
    }

    fn stop(&mut self) -> Result<(), LinkError> {
        self.exchange(Opcode::Stop, &[]).map(|_| ())
    }

    fn go(&mut self) -> Result<(), LinkError> {
        self.exchange(Opcode::Go, &[]).map(|_| ())
    }

    fn brk(&mut self) -> Result<(), LinkError> {
        self.exchange(Opcode::Break, &[]).map(|_| ())
    }

    fn cmd(&mut self, command: &str) -> Result<(), LinkError> {
        self.exchange(Opcode::Cmd, command.as_bytes()).map(|_| ())
    }

    fn read_memory(&mut self, addr: u32, _space: MemorySpace, dst: &mut [u8]) -> Result<(), LinkError> {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&addr.to_le_bytes());
        payload.extend_from_slice(&(dst.len() as u32).to_le_bytes());
        let reply = self.exchange(Opcode::ReadMemory, &payload)?;
        if reply.len() < dst.len() {
            return Err(LinkError::ReceiveFail("short memory read reply".into()));
        }
        dst.copy_from_slice(&reply[..dst.len()]);
        Ok(())
    }

    fn write_memory(&mut self, addr: u32, _space: MemorySpace, src: &[u8]) -> Result<(), LinkError> {
        let mut payload = Vec::with_capacity(4 + src.len());
        payload.extend_from_slice(&addr.to_le_bytes());
        payload.extend_from_slice(src);
        self.exchange(Opcode::WriteMemory, &payload).map(|_| ())
    }

    fn exit(&mut self) -> Result<(), LinkError> {
        self.exchange(Opcode::Exit, &[]).map(|_| ())
    }
}
