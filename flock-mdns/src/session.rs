//! One discovery conversation, from query to device list
//!
//! A session owns its sockets, its registry of discovered devices,
//! and its place in the lifecycle. The intended shape of a run is
//! start_discovery, then one or more receive_responses windows, then
//! drop (which closes the sockets). Sessions are independent of each
//! other; each binds its own pair of mDNS sockets.

use crate::message;
use crate::message::RecordType;
use crate::registry::Registry;
use crate::udp;
use crate::udp::{DatagramReceive, DatagramSend};
use crate::{MDNS_GROUP_V4, MDNS_GROUP_V6, MDNS_PORT};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

const QUERY_BUFFER_SIZE: usize = 1024;
const RECV_BUFFER_SIZE: usize = 2048;

const IPV4_TOKEN: mio::Token = mio::Token(0);
const IPV6_TOKEN: mio::Token = mio::Token(1);

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Nothing opened or sent yet
    #[default]
    Created,
    /// A query is being sent right now
    Querying,
    /// A query is out, responses not yet gathered
    Listening,
    /// At least one receive window has run to completion
    Idle,
}

/// The errors which can arise running a discovery session
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// Opening or registering the discovery sockets failed
    Socket(udp::Error),
    /// The query could not be encoded
    Encode(message::Error),
    /// The query could not be sent
    Send(udp::Error),
    /// Receiving failed in a way that is not just a timeout
    Receive(udp::Error),
    /// receive_responses was called before any query was started
    NotListening,
}

impl ::core::fmt::Display for Error {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            Self::Socket(_) => f.write_str("could not open mDNS socket"),
            Self::Encode(_) => f.write_str("could not encode mDNS query"),
            Self::Send(_) => f.write_str("could not send mDNS query"),
            Self::Receive(_) => {
                f.write_str("could not receive mDNS responses")
            }
            Self::NotListening => {
                f.write_str("discovery has not been started")
            }
        }
    }
}

impl ::std::error::Error for Error {
    fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
        match self {
            Self::Socket(e) | Self::Send(e) | Self::Receive(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::NotListening => None,
        }
    }
}

/// The bound, group-joined socket pair and its poller
#[derive(Debug)]
struct Sockets {
    poll: mio::Poll,
    ipv4: mio::net::UdpSocket,
    ipv6: Option<mio::net::UdpSocket>,
}

impl Sockets {
    fn open() -> Result<Self, udp::Error> {
        let poll = mio::Poll::new()
            .map_err(|e| udp::Error::Syscall(udp::Syscall::Poll, e))?;
        let mut ipv4 =
            mio::net::UdpSocket::from_std(udp::std::new_ipv4_socket(
                MDNS_PORT,
            )?);
        poll.registry()
            .register(&mut ipv4, IPV4_TOKEN, mio::Interest::READABLE)
            .map_err(|e| udp::Error::Syscall(udp::Syscall::Register, e))?;

        // Hosts without usable IPv6 still discover over IPv4.
        let ipv6 = match Self::open_ipv6(&poll) {
            Ok(socket) => Some(socket),
            Err(e) => {
                log::warn!("IPv6 mDNS unavailable: {e}");
                None
            }
        };
        Ok(Self { poll, ipv4, ipv6 })
    }

    fn open_ipv6(poll: &mio::Poll) -> Result<mio::net::UdpSocket, udp::Error> {
        let mut socket = mio::net::UdpSocket::from_std(
            udp::std::new_ipv6_socket(MDNS_PORT)?,
        );
        poll.registry()
            .register(&mut socket, IPV6_TOKEN, mio::Interest::READABLE)
            .map_err(|e| udp::Error::Syscall(udp::Syscall::Register, e))?;
        Ok(socket)
    }

    fn send_query(&self, service_type: Option<&str>) -> Result<(), Error> {
        let name = match service_type {
            Some(s) if !s.is_empty() => s,
            _ => message::WILDCARD_SERVICE,
        };
        let mut buffer = [0u8; QUERY_BUFFER_SIZE];
        let n =
            message::build_query(&mut buffer, Some(name), RecordType::Ptr)
                .map_err(Error::Encode)?;

        let group = SocketAddr::new(IpAddr::V4(MDNS_GROUP_V4), MDNS_PORT);
        self.ipv4
            .send_datagram(&buffer[0..n], &group)
            .map_err(Error::Send)?;

        if let Some(ipv6) = &self.ipv6 {
            let group =
                SocketAddr::new(IpAddr::V6(MDNS_GROUP_V6), MDNS_PORT);
            if let Err(e) = ipv6.send_datagram(&buffer[0..n], &group) {
                log::warn!("IPv6 mDNS query not sent: {e}");
            }
        }
        log::debug!("sent mDNS query for {name}");
        Ok(())
    }

    fn receive_window(
        &mut self,
        timeout: Duration,
        registry: &mut Registry,
    ) -> Result<(), Error> {
        let mut events = mio::Events::with_capacity(16);
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        let mut remaining = timeout;
        loop {
            let started = Instant::now();
            match self.poll.poll(&mut events, Some(remaining)) {
                Ok(()) => {}
                Err(e)
                    if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(Error::Receive(udp::Error::Syscall(
                        udp::Syscall::Poll,
                        e,
                    )));
                }
            }
            for event in &events {
                match event.token() {
                    IPV4_TOKEN => {
                        drain(&self.ipv4, &mut buffer, registry)?;
                    }
                    IPV6_TOKEN => {
                        if let Some(ipv6) = &self.ipv6 {
                            drain(ipv6, &mut buffer, registry)?;
                        }
                    }
                    _ => {}
                }
            }
            remaining = remaining.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Ok(());
            }
        }
    }
}

fn drain<S: DatagramReceive>(
    socket: &S,
    buffer: &mut [u8],
    registry: &mut Registry,
) -> Result<(), Error> {
    loop {
        match socket.receive_datagram(buffer) {
            Ok((n, from)) => {
                log::trace!("{n} byte datagram from {from}");
                absorb(registry, &buffer[0..n]);
            }
            Err(e) if e.is_would_block() => return Ok(()),
            Err(e) => return Err(Error::Receive(e)),
        }
    }
}

/// Merge one datagram's records into the registry, all or nothing
fn absorb(registry: &mut Registry, packet: &[u8]) {
    match message::parse_datagram(packet)
        .and_then(|records| records.collect::<Result<Vec<_>, _>>())
    {
        Ok(records) => {
            for record in &records {
                registry.merge(record);
            }
        }
        Err(e) => log::warn!("discarding malformed mDNS packet: {e}"),
    }
}

/// One mDNS service-discovery conversation
///
/// Sockets are opened lazily by the first successful call to
/// [`Session::start_discovery`], and closed when the session is
/// dropped.
#[derive(Debug, Default)]
pub struct Session {
    sockets: Option<Sockets>,
    registry: Registry,
    state: State,
}

impl Session {
    /// Create a session with no sockets open and nothing discovered
    #[must_use]
    pub fn new() -> Self {
        Self {
            sockets: None,
            registry: Registry::new(),
            state: State::Created,
        }
    }

    /// Send out one multicast query for the given service type
    ///
    /// `None` (or an empty string) queries for
    /// [`message::WILDCARD_SERVICE`], the meta-service which every
    /// responder answers with the service types it offers. Querying
    /// again on a live session keeps the devices found so far and
    /// solicits fresh responses.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the sockets cannot be opened, or the query
    /// cannot be encoded or sent. The session state is unchanged on
    /// failure.
    pub fn start_discovery(
        &mut self,
        service_type: Option<&str>,
    ) -> Result<(), Error> {
        let sockets = match self.sockets.take() {
            Some(sockets) => sockets,
            None => Sockets::open().map_err(Error::Socket)?,
        };
        let previous = self.state;
        self.state = State::Querying;
        let result = sockets.send_query(service_type);
        self.sockets = Some(sockets);
        match result {
            Ok(()) => {
                self.state = State::Listening;
                Ok(())
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    /// Gather responses for (up to) the given duration
    ///
    /// Blocks, draining datagrams as they arrive, until the timeout
    /// has elapsed. A zero timeout polls exactly once and returns
    /// immediately with whatever had already arrived. Returns the
    /// total number of devices discovered so far by this session,
    /// which a timeout with no answers leaves at whatever it already
    /// was.
    ///
    /// # Errors
    ///
    /// Returns `Err` if called before [`Session::start_discovery`],
    /// or if receiving fails outright.
    pub fn receive_responses(
        &mut self,
        timeout: Duration,
    ) -> Result<usize, Error> {
        if matches!(self.state, State::Created | State::Querying) {
            return Err(Error::NotListening);
        }
        let result = match &mut self.sockets {
            Some(sockets) => {
                sockets.receive_window(timeout, &mut self.registry)
            }
            None => return Err(Error::NotListening),
        };
        self.state = State::Idle;
        result?;
        Ok(self.registry.count())
    }

    /// The devices discovered so far
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Where the session is in its lifecycle
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }
}
