use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::AsRawFd;

use crate::config::Config;
use crate::timing::TimeVal;

/// Outcome of waiting for the socket to become readable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Timeout,
}

/// Result of receiving one datagram
#[derive(Debug, Clone, Copy)]
pub struct Received {
    pub len: usize,
    pub source: Option<Ipv4Addr>,
    /// Kernel receive timestamp (`SO_TIMESTAMP`), if the kernel supplied one
    pub kernel_time: Option<TimeVal>,
}

/// Datagram I/O used by the ping loop.
///
/// Errors of kind `Interrupted` are treated as benign by callers and retried.
pub trait Transport {
    /// Send an ICMP message (no IP header) to `dest`
    fn send(&mut self, frame: &[u8], dest: Ipv4Addr) -> io::Result<usize>;

    /// Receive one IP datagram into `buf`
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Received>;

    /// Block until a datagram is readable or `timeout` elapses
    fn wait_readable(&mut self, timeout: TimeVal) -> io::Result<Readiness>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: &[u8], dest: Ipv4Addr) -> io::Result<usize> {
        (**self).send(frame, dest)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Received> {
        (**self).receive(buf)
    }

    fn wait_readable(&mut self, timeout: TimeVal) -> io::Result<Readiness> {
        (**self).wait_readable(timeout)
    }
}

fn permission_error() -> anyhow::Error {
    let binary_path = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "pingr".to_string());

    anyhow!(
        "Insufficient permissions for raw sockets.\n\n\
         Fix options:\n\
         \u{2022} Run with sudo: sudo pingr <host>\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep {}",
        binary_path
    )
}

/// Create a raw IPv4 ICMP socket
pub fn create_raw_icmp_socket() -> Result<Socket> {
    let socket = match Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)) {
        Ok(socket) => socket,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(permission_error()),
        Err(e) => return Err(e).context("Failed to create raw ICMP socket"),
    };

    // The loop only reads after poll() reports readiness
    socket
        .set_nonblocking(true)
        .context("Failed to make ICMP socket non-blocking")?;

    Ok(socket)
}

/// Enable `SO_TIMESTAMP` so `recvmsg` reports the kernel receive time
pub fn enable_recv_timestamp(socket: &Socket) -> io::Result<()> {
    let val: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_TIMESTAMP,
            &val as *const _ as *const libc::c_void,
            std::mem::size_of_val(&val) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Raw ICMP socket implementing [`Transport`]
#[derive(Debug)]
pub struct IcmpSocket {
    socket: Socket,
}

impl IcmpSocket {
    /// Create the socket and apply the configured options.
    ///
    /// Only socket creation is fatal. Option failures are logged and the
    /// socket is used as-is.
    pub fn open(config: &Config) -> Result<Self> {
        let socket = create_raw_icmp_socket()?;

        if let Err(e) = socket.set_broadcast(true) {
            warn!("Could not enable SO_BROADCAST: {}", e);
        }
        if let Err(e) = enable_recv_timestamp(&socket) {
            warn!("Could not enable SO_TIMESTAMP, using local receive times: {}", e);
        }
        if let Some(ttl) = config.ttl
            && let Err(e) = socket.set_ttl(ttl as u32)
        {
            warn!("Could not set IP_TTL to {}: {}", ttl, e);
        }
        if config.flood && socket.set_recv_buffer_size(1024 * 1024).is_err() {
            debug!("Could not grow receive buffer for flood mode");
        }

        Ok(Self { socket })
    }
}

impl Transport for IcmpSocket {
    fn send(&mut self, frame: &[u8], dest: Ipv4Addr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(dest, 0)));
        self.socket.send_to(frame, &addr)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Received> {
        recv_with_timestamp(&self.socket, buf)
    }

    fn wait_readable(&mut self, timeout: TimeVal) -> io::Result<Readiness> {
        let mut pfd = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        let ret = unsafe { libc::poll(&mut pfd, 1, timeout.poll_timeout_ms()) };
        match ret {
            // EINTR surfaces as ErrorKind::Interrupted
            r if r < 0 => Err(io::Error::last_os_error()),
            0 => Ok(Readiness::Timeout),
            _ => Ok(Readiness::Ready),
        }
    }
}

/// Control message buffer aligned for `cmsghdr` access.
/// Room for one SCM_TIMESTAMP timeval with alignment padding.
#[repr(C, align(8))]
struct CmsgBuffer([u8; 64]);

/// Receive one datagram with the kernel timestamp from its control message
fn recv_with_timestamp(socket: &Socket, buffer: &mut [u8]) -> io::Result<Received> {
    // Set up iovec for the data buffer
    let mut iov = libc::iovec {
        iov_base: buffer.as_mut_ptr() as *mut libc::c_void,
        iov_len: buffer.len(),
    };

    let mut cmsg_buf = CmsgBuffer([0u8; 64]);

    let mut src_storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_name = &mut src_storage as *mut _ as *mut libc::c_void;
    msg.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.0.as_mut_ptr() as *mut libc::c_void;
    // msg_controllen type differs: usize on Linux, u32 on macOS
    msg.msg_controllen = cmsg_buf.0.len() as _;

    let len = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, 0) };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(Received {
        len: len as usize,
        source: parse_sockaddr_storage(&src_storage),
        kernel_time: extract_timestamp_from_cmsg(&msg),
    })
}

/// Find the `SCM_TIMESTAMP` control message and decode its timeval
fn extract_timestamp_from_cmsg(msg: &libc::msghdr) -> Option<TimeVal> {
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;
            if hdr.cmsg_level == libc::SOL_SOCKET && hdr.cmsg_type == libc::SCM_TIMESTAMP {
                let data_ptr = libc::CMSG_DATA(cmsg) as *const libc::timeval;
                let tv = std::ptr::read_unaligned(data_ptr);
                return Some(TimeVal::new(tv.tv_sec as i64, tv.tv_usec as i64));
            }
            cmsg = libc::CMSG_NXTHDR(msg, cmsg);
        }
    }
    None
}

fn parse_sockaddr_storage(storage: &libc::sockaddr_storage) -> Option<Ipv4Addr> {
    if storage.ss_family as libc::c_int != libc::AF_INET {
        return None;
    }
    let addr: &libc::sockaddr_in = unsafe { &*(storage as *const _ as *const _) };
    Some(Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)))
}
