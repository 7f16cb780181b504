/// Which syscall (or syscall-like mio operation) went wrong
#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Syscall {
    /// Creating the socket
    Socket,
    /// Setting a socket option
    SetSockopt,
    /// Binding the socket to its port
    Bind,
    /// Joining the mDNS multicast group
    JoinMulticast,
    /// Registering the socket with the poller
    Register,
    /// Waiting for readiness
    Poll,
    /// Sending a datagram
    SendTo,
    /// Receiving a datagram
    RecvFrom,
}

/// The errors which can occur doing UDP networking
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// An error from the operating system, tagged with the operation
    /// that provoked it
    Syscall(Syscall, ::std::io::Error),
}

impl Error {
    /// True if this is a `RecvFrom` error meaning "no datagram ready
    /// right now" on a non-blocking socket
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        match self {
            Self::Syscall(Syscall::RecvFrom, e) => {
                e.kind() == ::std::io::ErrorKind::WouldBlock
            }
            Self::Syscall(..) => false,
        }
    }

    /// The raw OS errno, if the OS supplied one
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Syscall(_, e) => e.raw_os_error(),
        }
    }
}

impl ::core::fmt::Display for Error {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            Self::Syscall(s, _) => write!(f, "error from syscall {s:?}"),
        }
    }
}

impl ::std::error::Error for Error {
    fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
        match self {
            Self::Syscall(_, e) => Some(e),
        }
    }
}
