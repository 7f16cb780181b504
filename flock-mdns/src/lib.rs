//! Discovering services on the local network using multicast DNS
//!
//! Multicast DNS service discovery (RFC 6762 and RFC 6763, familiar
//! as Bonjour or Avahi) lets devices on a LAN announce named services
//! and lets clients enumerate them with no DNS server configured.
//! This crate implements the client half as a one-shot discoverer:
//! send out a query for a service type, listen for a while, and come
//! away with a list of devices, each carrying a name, an address, and
//! a port.
//!
//! Two interfaces are offered. [`session::Session`] is the Rust one,
//! with `Result` returns and real types. [`handle`] wraps it in flat
//! functions over opaque handles with integer status codes, the shape
//! needed when the caller sits on the far side of a C-style language
//! boundary.
//!
//! The protocol pieces are usable on their own: [`message`] builds
//! queries and parses response records, and [`registry`] folds
//! records into devices.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::net::{Ipv4Addr, Ipv6Addr};

/// The mDNS IPv4 multicast group
pub const MDNS_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// The mDNS IPv6 multicast group
pub const MDNS_GROUP_V6: Ipv6Addr =
    Ipv6Addr::new(0xFF02, 0, 0, 0, 0, 0, 0, 0xFB);

/// The port on which all mDNS traffic happens
pub const MDNS_PORT: u16 = 5353;

/// One discovered service instance
///
/// Fields fill in as the records describing the instance arrive; a
/// device seen only through its PTR record has a name and nothing
/// else yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Service instance name, such as `Printer._ipp._tcp.local`
    pub name: String,
    /// Address as text, IPv4 or IPv6; empty until an address record
    /// arrives
    pub address: String,
    /// Service port; 0 until an SRV record arrives
    pub port: u16,
}

pub mod message;
pub mod registry;
pub mod udp;

#[cfg(feature = "sync")]
pub mod handle;
#[cfg(feature = "sync")]
pub mod session;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_can_debug() {
        let d = Device {
            name: "fnord._http._tcp.local".to_string(),
            address: "10.0.0.37".to_string(),
            port: 8080,
        };
        let s = format!("{d:?}");
        assert!(s.contains("fnord"));
        assert!(s.contains("8080"));
    }

    #[test]
    fn device_can_clone_and_compare() {
        let d = Device {
            name: "fnord._http._tcp.local".to_string(),
            address: String::new(),
            port: 0,
        };
        let d2 = d.clone();
        assert_eq!(d, d2);
    }
}
