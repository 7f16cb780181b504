//! Building mDNS queries and parsing mDNS responses
//!
//! The format is standard DNS (RFC 1035) over UDP, restricted to the
//! subset that service discovery needs: a one-question query on the
//! way out, and PTR/SRV/A/AAAA records on the way back in.

use std::net::{Ipv4Addr, Ipv6Addr};

/// The service-enumeration name queried when no service type is given
pub const WILDCARD_SERVICE: &str = "_services._dns-sd._udp.local";

/// Longest permissible label (between dots) in a DNS name
pub const MAX_LABEL: usize = 63;

/// Longest permissible DNS name, in wire-format bytes
pub const MAX_NAME: usize = 255;

/// Compression pointers chased per name before giving up
const MAX_POINTER_HOPS: usize = 10;

const HEADER_SIZE: usize = 12;
const CLASS_IN: u16 = 1;
const CACHE_FLUSH: u16 = 0x8000;

/// The DNS record types that discovery deals in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RecordType {
    /// IPv4 host address
    A = 1,
    /// Domain name pointer (service enumeration)
    Ptr = 12,
    /// Freeform key/value text, not used for discovery
    Txt = 16,
    /// IPv6 host address
    Aaaa = 28,
    /// Service instance location (port and target host)
    Srv = 33,
}

impl RecordType {
    /// The TYPE number as it appears on the wire
    #[must_use]
    pub const fn value(self) -> u16 {
        self as u16
    }

    /// The record type for a wire TYPE number, if it is one we know
    #[must_use]
    pub fn from_value(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::A),
            12 => Some(Self::Ptr),
            16 => Some(Self::Txt),
            28 => Some(Self::Aaaa),
            33 => Some(Self::Srv),
            _ => None,
        }
    }
}

/// The errors which can arise encoding or decoding DNS messages
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// The output buffer is too small for the message being built
    BufferFull,
    /// A label (one dot-separated component) exceeds 63 bytes
    LabelTooLong,
    /// The whole name exceeds 255 bytes in wire format
    NameTooLong,
    /// A name contains an empty label ("a..b" or a leading dot)
    EmptyLabel,
    /// The packet ends before the structure it promises
    Truncated,
    /// A compression pointer is reserved, forward, or self-referential
    BadPointer,
    /// Too many compression pointers chained in one name
    PointerLoop,
    /// A record's RDATA does not fit its declared type
    BadRdata,
}

impl ::core::fmt::Display for Error {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            Self::BufferFull => f.write_str("message buffer full"),
            Self::LabelTooLong => f.write_str("label exceeds 63 bytes"),
            Self::NameTooLong => f.write_str("name exceeds 255 bytes"),
            Self::EmptyLabel => f.write_str("name contains an empty label"),
            Self::Truncated => f.write_str("packet truncated"),
            Self::BadPointer => f.write_str("bad compression pointer"),
            Self::PointerLoop => f.write_str("compression pointer loop"),
            Self::BadRdata => f.write_str("record data malformed"),
        }
    }
}

impl ::std::error::Error for Error {}

/// One resource record from a response datagram
///
/// Only the fields discovery cares about are kept; in particular TTLs
/// are dropped, because a one-shot client has no cache to expire.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    /// The name this record is about
    pub owner: String,
    /// The type-specific payload
    pub rdata: RecordData,
}

/// The payload of a resource record, by record type
#[derive(Debug, Clone)]
pub enum RecordData {
    /// PTR: the service instance name pointed at
    Ptr(String),
    /// A: an IPv4 address for the owner name
    A(Ipv4Addr),
    /// AAAA: an IPv6 address for the owner name
    Aaaa(Ipv6Addr),
    /// SRV: where the service instance actually lives
    Srv {
        /// Lower is preferred
        priority: u16,
        /// Tie-break weighting among equal priorities
        weight: u16,
        /// TCP or UDP port of the service
        port: u16,
        /// Host name offering the service
        target: String,
    },
    /// Anything else (including TXT), skipped over undecoded
    Other(u16),
}

/// A bounds-checked write cursor over a borrowed byte buffer
struct MessageCursor<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> MessageCursor<'a> {
    pub fn new(buf: &'a mut [u8]) -> MessageCursor<'a> {
        MessageCursor { buf, offset: 0 }
    }

    pub const fn position(&self) -> usize {
        self.offset
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let n = bytes.len();
        if n + self.offset > self.buf.len() {
            return Err(Error::BufferFull);
        }
        self.buf[self.offset..self.offset + n].copy_from_slice(bytes);
        self.offset += n;
        Ok(())
    }

    pub fn append_u16(&mut self, value: u16) -> Result<(), Error> {
        self.append(&value.to_be_bytes())
    }
}

#[allow(clippy::cast_possible_truncation)] // labels checked against MAX_LABEL
fn append_name(cursor: &mut MessageCursor, name: &str) -> Result<(), Error> {
    let name = name.strip_suffix('.').unwrap_or(name);
    let mut wire = 1usize; // the terminating root label
    for label in name.split('.') {
        if label.is_empty() {
            return Err(Error::EmptyLabel);
        }
        if label.len() > MAX_LABEL {
            return Err(Error::LabelTooLong);
        }
        wire += 1 + label.len();
        if wire > MAX_NAME {
            return Err(Error::NameTooLong);
        }
        cursor.append(&[label.len() as u8])?;
        cursor.append(label.as_bytes())?;
    }
    cursor.append(&[0])
}

/// Build one mDNS query datagram into `buf`, returning its length
///
/// The query asks for `rrtype` records (PTR, for discovery) of the
/// given service type, or of [`WILDCARD_SERVICE`] if none is given.
/// The header is fixed: ID 0 and all flags clear, the convention for
/// multicast queries, so the output is deterministic and comparable
/// byte-for-byte.
///
/// # Errors
///
/// Returns `Err` if the name breaks the wire-format length limits or
/// `buf` cannot hold the query.
pub fn build_query(
    buf: &mut [u8],
    service_type: Option<&str>,
    rrtype: RecordType,
) -> Result<usize, Error> {
    let name = match service_type {
        Some(s) if !s.is_empty() => s,
        _ => WILDCARD_SERVICE,
    };
    let mut cursor = MessageCursor::new(buf);
    cursor.append(&[0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0])?;
    append_name(&mut cursor, name)?;
    cursor.append_u16(rrtype.value())?;
    cursor.append_u16(CLASS_IN)?;
    Ok(cursor.position())
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, Error> {
    match buf.get(offset..offset + 2) {
        Some([a, b]) => Ok(u16::from_be_bytes([*a, *b])),
        _ => Err(Error::Truncated),
    }
}

/// Decode one possibly-compressed name starting at `start`
///
/// Returns the name in dotted form and the offset of whatever follows
/// it in place. Compression pointers must point strictly backwards,
/// and at most [`MAX_POINTER_HOPS`] of them are followed, so malformed
/// loops terminate with an error instead of spinning.
fn read_name(buf: &[u8], start: usize) -> Result<(String, usize), Error> {
    let mut name = String::new();
    let mut offset = start;
    let mut resume = None;
    let mut hops = 0;
    let mut wire = 1usize;
    loop {
        let len = *buf.get(offset).ok_or(Error::Truncated)? as usize;
        match len & 0xC0 {
            0x00 => {
                if len == 0 {
                    offset += 1;
                    break;
                }
                let label = buf
                    .get(offset + 1..offset + 1 + len)
                    .ok_or(Error::Truncated)?;
                wire += 1 + len;
                if wire > MAX_NAME {
                    return Err(Error::NameTooLong);
                }
                if !name.is_empty() {
                    name.push('.');
                }
                name.push_str(&String::from_utf8_lossy(label));
                offset += 1 + len;
            }
            0xC0 => {
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(Error::PointerLoop);
                }
                let low = *buf.get(offset + 1).ok_or(Error::Truncated)?;
                let target = ((len & 0x3F) << 8) | low as usize;
                if resume.is_none() {
                    resume = Some(offset + 2);
                }
                if target >= offset {
                    return Err(Error::BadPointer);
                }
                offset = target;
            }
            _ => return Err(Error::BadPointer),
        }
    }
    Ok((name, resume.unwrap_or(offset)))
}

fn read_record(
    buf: &[u8],
    offset: usize,
) -> Result<(ResourceRecord, usize), Error> {
    let (owner, offset) = read_name(buf, offset)?;
    let rrtype = read_u16(buf, offset)?;
    let class = read_u16(buf, offset + 2)?;
    let rdlength = read_u16(buf, offset + 8)? as usize;
    let rdata = offset + 10;
    let rdata_end = rdata + rdlength;
    if rdata_end > buf.len() {
        return Err(Error::Truncated);
    }

    // mDNS sets the top bit of CLASS to request cache flushing; it is
    // not part of the class number.
    let data = if (class & !CACHE_FLUSH) != CLASS_IN {
        RecordData::Other(rrtype)
    } else {
        match RecordType::from_value(rrtype) {
            Some(RecordType::Ptr) => {
                let (target, next) = read_name(buf, rdata)?;
                if next > rdata_end {
                    return Err(Error::BadRdata);
                }
                RecordData::Ptr(target)
            }
            Some(RecordType::A) => {
                if rdlength != 4 {
                    return Err(Error::BadRdata);
                }
                RecordData::A(Ipv4Addr::new(
                    buf[rdata],
                    buf[rdata + 1],
                    buf[rdata + 2],
                    buf[rdata + 3],
                ))
            }
            Some(RecordType::Aaaa) => {
                if rdlength != 16 {
                    return Err(Error::BadRdata);
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[rdata..rdata_end]);
                RecordData::Aaaa(Ipv6Addr::from(octets))
            }
            Some(RecordType::Srv) => {
                if rdlength < 7 {
                    return Err(Error::BadRdata);
                }
                let (target, next) = read_name(buf, rdata + 6)?;
                if next > rdata_end {
                    return Err(Error::BadRdata);
                }
                RecordData::Srv {
                    priority: read_u16(buf, rdata)?,
                    weight: read_u16(buf, rdata + 2)?,
                    port: read_u16(buf, rdata + 4)?,
                    target,
                }
            }
            _ => RecordData::Other(rrtype),
        }
    };
    Ok((ResourceRecord { owner, rdata: data }, rdata_end))
}

/// The records of one response datagram, in wire order
///
/// Yielded lazily and consumed once. The first malformed record ends
/// the iteration; the caller decides whether anything seen before the
/// error is still trustworthy (the discovery session does not, and
/// discards the whole datagram).
#[derive(Debug)]
pub struct RecordIter<'a> {
    buf: &'a [u8],
    offset: usize,
    remaining: usize,
}

impl Iterator for RecordIter<'_> {
    type Item = Result<ResourceRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match read_record(self.buf, self.offset) {
            Ok((record, next)) => {
                self.offset = next;
                Some(Ok(record))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

/// Parse a response datagram into an iterator of its records
///
/// The question section is skipped; answer, authority, and additional
/// records are all yielded, because mDNS responders routinely put the
/// SRV and address records a discoverer needs in the additional
/// section.
///
/// # Errors
///
/// Returns `Err` if the header or question section is truncated or
/// otherwise malformed. Malformed records later in the datagram
/// surface as `Err` items from the iterator instead.
pub fn parse_datagram(buf: &[u8]) -> Result<RecordIter<'_>, Error> {
    if buf.len() < HEADER_SIZE {
        return Err(Error::Truncated);
    }
    let qdcount = read_u16(buf, 4)?;
    let ancount = read_u16(buf, 6)? as usize;
    let nscount = read_u16(buf, 8)? as usize;
    let arcount = read_u16(buf, 10)? as usize;

    let mut offset = HEADER_SIZE;
    for _ in 0..qdcount {
        let (_, after_name) = read_name(buf, offset)?;
        offset = after_name + 4;
        if offset > buf.len() {
            return Err(Error::Truncated);
        }
    }

    Ok(RecordIter {
        buf,
        offset,
        remaining: ancount + nscount + arcount,
    })
}
