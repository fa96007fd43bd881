use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use super::probe::{MULTICAST_ADDR, MULTICAST_PORT};

const RECV_BUFFER_BYTES: usize = 64 * 1024;

/// One probe's worth of UDP I/O. The socket is owned by a single scan call;
/// the receive timeout doubles as the collection deadline.
pub struct DiscoverySocket {
    socket: UdpSocket,
}

impl DiscoverySocket {
    pub fn open(timeout: Duration) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_multicast_ttl_v4(2)?;
        socket.set_read_timeout(Some(timeout))?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
        Ok(Self {
            socket: socket.into(),
        })
    }

    pub fn send_probe(&self, payload: &[u8]) -> io::Result<()> {
        self.socket
            .send_to(payload, (MULTICAST_ADDR, MULTICAST_PORT))?;
        Ok(())
    }

    /// Reads replies until the receive timeout fires. Each reply is the
    /// sender's IPv4 address plus the raw payload.
    pub fn collect_replies(&self) -> Vec<(String, Vec<u8>)> {
        let mut replies = Vec::new();
        let mut buffer = vec![0u8; RECV_BUFFER_BYTES];
        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok((len, sender)) => {
                    replies.push((sender.ip().to_string(), buffer[..len].to_vec()));
                }
                Err(_) => break,
            }
        }
        replies
    }
}
