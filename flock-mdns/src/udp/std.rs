//! Setting up mDNS sockets using socket2
//!
//! All mDNS traffic shares one well-known port, so the sockets are
//! bound with address (and where available, port) reuse, then joined
//! to the relevant multicast group on whichever interface the kernel
//! picks. The setup functions return plain `std` sockets, already
//! non-blocking, ready to be wrapped by mio.

use super::{Error, Syscall};
use crate::{MDNS_GROUP_V4, MDNS_GROUP_V6};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

type NewSocketFn = fn(socket2::Domain) -> std::io::Result<socket2::Socket>;
type SockoptFn = fn(&socket2::Socket, bool) -> std::io::Result<()>;
type BindFn = fn(&socket2::Socket, SocketAddr) -> std::io::Result<()>;
type JoinFn = fn(&socket2::Socket) -> std::io::Result<()>;

fn new_socket(domain: socket2::Domain) -> std::io::Result<socket2::Socket> {
    socket2::Socket::new(
        domain,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )
}

fn nonblocking(
    socket: &socket2::Socket,
    value: bool,
) -> std::io::Result<()> {
    socket.set_nonblocking(value)
}

fn reuse(socket: &socket2::Socket, value: bool) -> std::io::Result<()> {
    socket.set_reuse_address(value)?;
    #[cfg(all(
        unix,
        not(any(target_os = "solaris", target_os = "illumos"))
    ))]
    socket.set_reuse_port(value)?;
    Ok(())
}

fn only_v6(socket: &socket2::Socket, value: bool) -> std::io::Result<()> {
    socket.set_only_v6(value)
}

fn bind(socket: &socket2::Socket, addr: SocketAddr) -> std::io::Result<()> {
    socket.bind(&socket2::SockAddr::from(addr))
}

fn join_v4(socket: &socket2::Socket) -> std::io::Result<()> {
    socket.join_multicast_v4(&MDNS_GROUP_V4, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_ttl_v4(255)
}

fn join_v6(socket: &socket2::Socket) -> std::io::Result<()> {
    socket.join_multicast_v6(&MDNS_GROUP_V6, 0)?;
    socket.set_multicast_hops_v6(255)
}

fn new_ipv4_socket_inner(
    port: u16,
    new_socket: NewSocketFn,
    nonblocking: SockoptFn,
    reuse: SockoptFn,
    bind: BindFn,
    join: JoinFn,
) -> Result<std::net::UdpSocket, Error> {
    let socket = new_socket(socket2::Domain::IPV4)
        .map_err(|e| Error::Syscall(Syscall::Socket, e))?;
    nonblocking(&socket, true)
        .map_err(|e| Error::Syscall(Syscall::SetSockopt, e))?;
    reuse(&socket, true)
        .map_err(|e| Error::Syscall(Syscall::SetSockopt, e))?;
    bind(
        &socket,
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
    )
    .map_err(|e| Error::Syscall(Syscall::Bind, e))?;
    join(&socket).map_err(|e| Error::Syscall(Syscall::JoinMulticast, e))?;
    Ok(socket.into())
}

fn new_ipv6_socket_inner(
    port: u16,
    new_socket: NewSocketFn,
    nonblocking: SockoptFn,
    reuse: SockoptFn,
    only_v6: SockoptFn,
    bind: BindFn,
    join: JoinFn,
) -> Result<std::net::UdpSocket, Error> {
    let socket = new_socket(socket2::Domain::IPV6)
        .map_err(|e| Error::Syscall(Syscall::Socket, e))?;
    nonblocking(&socket, true)
        .map_err(|e| Error::Syscall(Syscall::SetSockopt, e))?;
    reuse(&socket, true)
        .map_err(|e| Error::Syscall(Syscall::SetSockopt, e))?;
    only_v6(&socket, true)
        .map_err(|e| Error::Syscall(Syscall::SetSockopt, e))?;
    bind(
        &socket,
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
    )
    .map_err(|e| Error::Syscall(Syscall::Bind, e))?;
    join(&socket).map_err(|e| Error::Syscall(Syscall::JoinMulticast, e))?;
    Ok(socket.into())
}

/// Create a non-blocking IPv4 socket set up for mDNS on `port`
///
/// # Errors
///
/// Returns `Err`, tagged with the failing operation, if any part of
/// the setup fails.
pub fn new_ipv4_socket(port: u16) -> Result<std::net::UdpSocket, Error> {
    new_ipv4_socket_inner(port, new_socket, nonblocking, reuse, bind, join_v4)
}

/// Create a non-blocking IPv6 socket set up for mDNS on `port`
///
/// The socket is v6-only, so it can share the port with its IPv4
/// sibling rather than fighting it for the v4-mapped address space.
///
/// # Errors
///
/// Returns `Err`, tagged with the failing operation, if any part of
/// the setup fails.
pub fn new_ipv6_socket(port: u16) -> Result<std::net::UdpSocket, Error> {
    new_ipv6_socket_inner(
        port, new_socket, nonblocking, reuse, only_v6, bind, join_v6,
    )
}
