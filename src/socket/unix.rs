//! The Unix socket backend: raw `libc` calls for `select`-based readiness,
//! `accept`, socket options, and I/O.

use std::io;
use std::mem::{self, MaybeUninit};
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Backlog depth for the listening socket.
const LISTEN_BACKLOG: libc::c_int = 1;

/// Result of a bounded-time readiness probe: a `select` return of 0 is a
/// timeout, negative is a fatal OS error, positive means the fd is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Timeout,
}

fn select_one(fd: RawFd, for_write: bool, timeout: Duration) -> io::Result<Readiness> {
    unsafe {
        let mut fds = {
            let mut fds = MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(fds.as_mut_ptr());
            libc::FD_SET(fd, fds.as_mut_ptr());
            fds.assume_init()
        };
        let mut empty = {
            let mut fds = MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(fds.as_mut_ptr());
            fds.assume_init()
        };
        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };

        let (readfds, writefds): (*mut libc::fd_set, *mut libc::fd_set) = if for_write {
            (&mut empty, &mut fds)
        } else {
            (&mut fds, &mut empty)
        };

        let res = libc::select(
            fd + 1,
            readfds,
            writefds,
            std::ptr::null_mut(),
            &mut tv as *mut _,
        );
        match res {
            0 => Ok(Readiness::Timeout),
            n if n > 0 => Ok(Readiness::Ready),
            _ => Err(io::Error::last_os_error()),
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags == -1 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn set_sockopt_bool(fd: RawFd, level: libc::c_int, name: libc::c_int, enabled: bool) -> io::Result<()> {
    let value: libc::c_int = enabled as libc::c_int;
    unsafe {
        let res = libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        if res == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// The single listening socket, bound to `0.0.0.0:<lport>` with a backlog
/// of 1.
pub struct Listener {
    fd: RawFd,
}

impl Listener {
    pub fn bind(port: u16) -> io::Result<Listener> {
        unsafe {
            let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0);
            if fd == -1 {
                return Err(io::Error::last_os_error());
            }
            set_sockopt_bool(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, true)?;

            let addr = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: port.to_be(),
                sin_addr: libc::in_addr { s_addr: libc::INADDR_ANY },
                sin_zero: [0; 8],
            };
            let res = libc::bind(
                fd,
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            );
            if res == -1 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
            if libc::listen(fd, LISTEN_BACKLOG) == -1 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
            set_nonblocking(fd)?;
            Ok(Listener { fd })
        }
    }

    /// Probes for an incoming connection with a bounded-time `select`.
    pub fn accept_ready(&self, timeout: Duration) -> io::Result<Readiness> {
        select_one(self.fd, false, timeout)
    }

    /// The port actually bound, useful when `bind` was called with port 0
    /// to let the OS choose one (tests only; production always passes
    /// `--lport` explicitly).
    pub fn local_port(&self) -> io::Result<u16> {
        unsafe {
            let mut addr = MaybeUninit::<libc::sockaddr_in>::zeroed();
            let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            let res = libc::getsockname(self.fd, addr.as_mut_ptr() as *mut libc::sockaddr, &mut len);
            if res == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(u16::from_be(addr.assume_init().sin_port))
        }
    }

    /// Accepts a pending connection and configures it: `TCP_NODELAY`,
    /// `SO_KEEPALIVE`, non-blocking.
    pub fn accept(&self) -> io::Result<Peer> {
        unsafe {
            let fd = libc::accept(self.fd, std::ptr::null_mut(), std::ptr::null_mut());
            if fd == -1 {
                return Err(io::Error::last_os_error());
            }
            set_sockopt_bool(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, true)?;
            set_sockopt_bool(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, true)?;
            set_nonblocking(fd)?;
            Ok(Peer { fd })
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// At most one accepted connection at a time.
pub struct Peer {
    fd: RawFd,
}

impl Peer {
    pub fn readable(&self, timeout: Duration) -> io::Result<Readiness> {
        select_one(self.fd, false, timeout)
    }

    pub fn writable(&self, timeout: Duration) -> io::Result<Readiness> {
        select_one(self.fd, true, timeout)
    }

    /// `FIONREAD` readiness check: the ioctl call itself must succeed at
    /// least once before first use. `FIONREAD`'s byte count is not
    /// otherwise meaningful immediately after accept.
    pub fn is_ready(&self) -> io::Result<bool> {
        let mut pending: libc::c_int = 0;
        let res = unsafe { libc::ioctl(self.fd, libc::FIONREAD, &mut pending as *mut libc::c_int) };
        Ok(res == 0)
    }

    /// Receives into `buf`. Returns `Ok(0)` on graceful close; an `Err` on
    /// any other failure. Both are connection loss to the caller.
    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        unsafe {
            let n = libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0);
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(n as usize)
        }
    }

    /// Sends `buf`. A short write (return value less than `buf.len()`) is
    /// the caller's signal to treat the connection as lost.
    pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        unsafe {
            let n = libc::send(self.fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0);
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(n as usize)
        }
    }

    /// `shutdown` then `close`. A Winsock refcount decrement would be
    /// needed on Windows but has no Unix counterpart.
    pub fn close(self) {
        unsafe {
            libc::shutdown(self.fd, libc::SHUT_RDWR);
        }
        // Drop runs libc::close via the Drop impl below.
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
