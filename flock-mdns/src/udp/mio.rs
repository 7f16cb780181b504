//! Implementing the UDP traits for mio sockets

use super::{Error, Syscall};
use std::net::SocketAddr;

impl super::DatagramSend for mio::net::UdpSocket {
    fn send_datagram(
        &self,
        buffer: &[u8],
        to: &SocketAddr,
    ) -> Result<(), Error> {
        self.send_to(buffer, *to)
            .map(|_| ())
            .map_err(|e| Error::Syscall(Syscall::SendTo, e))
    }
}

impl super::DatagramReceive for mio::net::UdpSocket {
    fn receive_datagram(
        &self,
        buffer: &mut [u8],
    ) -> Result<(usize, SocketAddr), Error> {
        self.recv_from(buffer)
            .map_err(|e| Error::Syscall(Syscall::RecvFrom, e))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DatagramReceive, DatagramSend};
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback_socket() -> mio::net::UdpSocket {
        let addr =
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 0);
        mio::net::UdpSocket::bind(addr).unwrap()
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn mio_sockets_send_and_receive() {
        let tx = loopback_socket();
        let rx = loopback_socket();
        let rx_addr = rx.local_addr().unwrap();

        tx.send_datagram(b"fnord", &rx_addr).unwrap();

        let mut buffer = [0u8; 32];
        let (n, from) = loop {
            match rx.receive_datagram(&mut buffer) {
                Ok(r) => break r,
                Err(e) if e.is_would_block() => {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(e) => panic!("receive failed: {e}"),
            }
        };
        assert_eq!(&buffer[0..n], b"fnord");
        assert_eq!(from, tx.local_addr().unwrap());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn empty_receive_queue_is_would_block() {
        let rx = loopback_socket();
        let mut buffer = [0u8; 32];
        let r = rx.receive_datagram(&mut buffer);
        assert!(matches!(&r, Err(e) if e.is_would_block()));
    }
}
