//! The handle-based discovery interface
//!
//! Flat functions over opaque handles, with integer status returns
//! instead of `Result`, shaped for re-exposure across a C-style
//! boundary (JNI, SWIG, and friends) where callers cannot hold a
//! `Session` directly. Rust callers are better served by
//! [`crate::session::Session`] itself.
//!
//! Failures are reported in bands: [`ERR_BAD_SESSION`] and
//! [`ERR_NOT_LISTENING`] stand alone, and the wider bands carry the
//! OS errno (or an encoding-error code) below the band base, so
//! `-2101` means "sendto failed with errno 101". A stale handle is
//! never undefined behaviour; every function degrades to an error
//! return, an empty answer, or a no-op.

use crate::message;
use crate::session::{self, Session};
use crate::udp;
use crate::Device;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

slotmap::new_key_type! {
    /// Opaque handle to a discovery session
    pub struct SessionHandle;
}

/// The handle does not (or no longer does) name a live session
pub const ERR_BAD_SESSION: i32 = -1;
/// Responses were asked for before any query was started
pub const ERR_NOT_LISTENING: i32 = -2;
/// Base of the band reporting socket-setup failures
pub const ERR_SOCKET: i32 = -1000;
/// Base of the band reporting query-send failures
pub const ERR_SEND: i32 = -2000;
/// Base of the band reporting query-encoding failures
pub const ERR_ENCODE: i32 = -3000;
/// Base of the band reporting receive failures
pub const ERR_RECV: i32 = -4000;

type Table = slotmap::SlotMap<SessionHandle, Arc<Mutex<Session>>>;

fn table() -> MutexGuard<'static, Table> {
    static TABLE: OnceLock<Mutex<Table>> = OnceLock::new();
    let mutex = TABLE.get_or_init(|| Mutex::new(Table::with_key()));
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Run `f` on the session named by `session`, if it is still live
///
/// The table lock is released before the session itself is locked, so
/// a session blocked in a receive window holds up only callers using
/// that same handle.
fn with_session<T>(
    session: SessionHandle,
    f: impl FnOnce(&mut Session) -> T,
) -> Option<T> {
    let cell = table().get(session).cloned()?;
    let mut guard = match cell.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    Some(f(&mut guard))
}

fn device_field<T>(
    session: SessionHandle,
    index: i32,
    f: impl FnOnce(&Device) -> T,
) -> Option<T> {
    let index = usize::try_from(index).ok()?;
    with_session(session, |s| s.registry().get(index).map(f)).flatten()
}

fn errno_of(error: &udp::Error) -> i32 {
    error.raw_os_error().unwrap_or(0)
}

fn encode_code(error: &message::Error) -> i32 {
    match error {
        message::Error::BufferFull => 1,
        message::Error::LabelTooLong => 2,
        message::Error::NameTooLong => 3,
        message::Error::EmptyLabel => 4,
        message::Error::Truncated => 5,
        message::Error::BadPointer => 6,
        message::Error::PointerLoop => 7,
        message::Error::BadRdata => 8,
    }
}

fn error_code(error: &session::Error) -> i32 {
    match error {
        session::Error::Socket(e) => ERR_SOCKET - errno_of(e),
        session::Error::Send(e) => ERR_SEND - errno_of(e),
        session::Error::Encode(e) => ERR_ENCODE - encode_code(e),
        session::Error::Receive(e) => ERR_RECV - errno_of(e),
        session::Error::NotListening => ERR_NOT_LISTENING,
    }
}

/// Create a new, empty discovery session
///
/// The returned handle stays distinct from every handle ever issued
/// by this process, including destroyed ones.
#[must_use]
pub fn create_session() -> SessionHandle {
    table().insert(Arc::new(Mutex::new(Session::new())))
}

/// Send out one multicast query for `service_type`
///
/// `None` or an empty string queries for every service type on the
/// network. Returns 0 on success, [`ERR_BAD_SESSION`] for a stale
/// handle, or a banded error code.
pub fn start_discovery(
    session: SessionHandle,
    service_type: Option<&str>,
) -> i32 {
    match with_session(session, |s| s.start_discovery(service_type)) {
        None => ERR_BAD_SESSION,
        Some(Ok(())) => 0,
        Some(Err(e)) => error_code(&e),
    }
}

/// Gather responses for (up to) `timeout_ms` milliseconds
///
/// Blocks the calling thread. A zero (or negative) timeout polls once
/// without waiting. Returns the total number of devices the session
/// has discovered so far, [`ERR_BAD_SESSION`] for a stale handle,
/// [`ERR_NOT_LISTENING`] before any query has been started, or a
/// banded error code.
pub fn receive_responses(session: SessionHandle, timeout_ms: i32) -> i32 {
    let millis = u64::try_from(timeout_ms.max(0)).unwrap_or(0);
    let timeout = Duration::from_millis(millis);
    match with_session(session, |s| s.receive_responses(timeout)) {
        None => ERR_BAD_SESSION,
        Some(Ok(count)) => i32::try_from(count).unwrap_or(i32::MAX),
        Some(Err(e)) => error_code(&e),
    }
}

/// How many devices this session has discovered so far
///
/// A stale handle counts as having discovered nothing.
#[must_use]
pub fn get_device_count(session: SessionHandle) -> i32 {
    with_session(session, |s| {
        i32::try_from(s.registry().count()).unwrap_or(i32::MAX)
    })
    .unwrap_or(0)
}

/// The instance name of the device at `index`
///
/// Returns None if the handle is stale or the index out of range.
#[must_use]
pub fn get_device_name(
    session: SessionHandle,
    index: i32,
) -> Option<String> {
    device_field(session, index, |d| d.name.clone())
}

/// The address of the device at `index`, as text
///
/// The address may be an empty string for a device whose A or AAAA
/// record has not arrived (yet). Returns None if the handle is stale
/// or the index out of range.
#[must_use]
pub fn get_device_ip(session: SessionHandle, index: i32) -> Option<String> {
    device_field(session, index, |d| d.address.clone())
}

/// The port of the device at `index`
///
/// Returns 0 if the port is not (yet) known, the handle is stale, or
/// the index out of range.
#[must_use]
pub fn get_device_port(session: SessionHandle, index: i32) -> i32 {
    device_field(session, index, |d| i32::from(d.port)).unwrap_or(0)
}

/// Destroy the session, closing its sockets
///
/// Idempotent; destroying a handle twice is a no-op, and other
/// functions given the destroyed handle fail softly rather than
/// misbehave.
pub fn destroy_session(session: SessionHandle) {
    table().remove(session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_gives_empty_session() {
        let h = create_session();
        assert_eq!(get_device_count(h), 0);
        assert_eq!(get_device_name(h, 0), None);
        assert_eq!(get_device_ip(h, 0), None);
        assert_eq!(get_device_port(h, 0), 0);
        destroy_session(h);
    }

    #[test]
    fn stale_handles_fail_softly() {
        let h = create_session();
        destroy_session(h);
        assert_eq!(get_device_count(h), 0);
        assert_eq!(start_discovery(h, None), ERR_BAD_SESSION);
        assert_eq!(receive_responses(h, 10), ERR_BAD_SESSION);
        assert_eq!(get_device_name(h, 0), None);
        assert_eq!(get_device_ip(h, 0), None);
        assert_eq!(get_device_port(h, 0), 0);
        destroy_session(h); // second destroy is a no-op
    }

    #[test]
    fn receive_without_start_is_not_listening() {
        let h = create_session();
        assert_eq!(receive_responses(h, 0), ERR_NOT_LISTENING);
        destroy_session(h);
    }

    #[test]
    fn negative_values_are_invalid_not_fatal() {
        let h = create_session();
        assert_eq!(get_device_name(h, -1), None);
        assert_eq!(get_device_ip(h, -37), None);
        assert_eq!(get_device_port(h, -1), 0);
        destroy_session(h);
    }

    #[test]
    fn destroyed_handles_are_never_reissued() {
        let h1 = create_session();
        destroy_session(h1);
        let h2 = create_session();
        assert_ne!(h1, h2);
        assert_eq!(receive_responses(h1, 0), ERR_BAD_SESSION);
        destroy_session(h2);
    }

    #[test]
    fn error_codes_band_by_kind() {
        assert_eq!(error_code(&session::Error::NotListening), -2);
        assert_eq!(
            error_code(&session::Error::Encode(
                message::Error::LabelTooLong
            )),
            -3002
        );
        assert_eq!(
            error_code(&session::Error::Send(udp::Error::Syscall(
                udp::Syscall::SendTo,
                std::io::Error::from_raw_os_error(101), // ENETUNREACH
            ))),
            -2101
        );
        assert_eq!(
            error_code(&session::Error::Receive(udp::Error::Syscall(
                udp::Syscall::RecvFrom,
                std::io::Error::from_raw_os_error(9), // EBADF
            ))),
            -4009
        );
        // No errno still lands in the right band.
        assert_eq!(
            error_code(&session::Error::Socket(udp::Error::Syscall(
                udp::Syscall::Socket,
                std::io::Error::other("injected"),
            ))),
            -1000
        );
    }
}
