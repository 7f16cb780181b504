//! Sending and receiving UDP datagrams
//!
//! The discovery session is written against the traits in this module
//! rather than against any particular socket type. Implementations
//! for mio sockets are in [`mio`], and the socket setup itself (bind,
//! reuse flags, multicast group membership) is in [`std`].

use ::std::net::SocketAddr;

mod error;
pub use error::{Error, Syscall};

/// Sockets on which mDNS queries can be sent
pub trait DatagramSend {
    /// Send one datagram to the given address
    ///
    /// # Errors
    ///
    /// Returns `Err` if the underlying sendto call fails.
    fn send_datagram(
        &self,
        buffer: &[u8],
        to: &SocketAddr,
    ) -> Result<(), Error>;
}

/// Sockets on which mDNS responses can be received
pub trait DatagramReceive {
    /// Receive one datagram, recording who sent it
    ///
    /// On a non-blocking socket an exhausted receive queue surfaces as
    /// a [`Syscall::RecvFrom`] error of kind `WouldBlock`; see
    /// [`Error::is_would_block`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the underlying recvfrom call fails.
    fn receive_datagram(
        &self,
        buffer: &mut [u8],
    ) -> Result<(usize, SocketAddr), Error>;
}

#[cfg(feature = "std")]
pub mod std;

#[cfg(feature = "sync")]
pub mod mio;
