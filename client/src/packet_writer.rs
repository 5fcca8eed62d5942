use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::bail;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;
use tracing::trace;

/// The largest packet that is ever sent, regardless of configuration: the UDP payload of a full
///  Ethernet frame with IPv6 and no optional headers
pub const MAX_OUTGOING_PACKET_SIZE: usize = 1452;

/// The maximum packet length of a new connection unless configured otherwise
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1350;

/// This is an abstraction for sending a finished packet, introduced to facilitate mocking the
///  I/O part away for testing. A writer is shared by the session and the network helper that
///  created it.
#[cfg_attr(test, automock)]
pub trait PacketWriter: Send + Sync {
    /// Writes without waiting. A packet that can not be written right away is reported as an
    ///  error, it is never queued.
    fn write_packet(&self, buf: &[u8], self_address: SocketAddr, peer_address: SocketAddr) -> anyhow::Result<usize>;

    fn max_packet_size(&self, peer_address: SocketAddr) -> usize;
}

pub struct UdpPacketWriter {
    socket: Option<Arc<UdpSocket>>,
}

impl UdpPacketWriter {
    /// A writer without a socket fails every write
    pub fn new(socket: Option<Arc<UdpSocket>>) -> UdpPacketWriter {
        UdpPacketWriter { socket }
    }
}

impl PacketWriter for UdpPacketWriter {
    fn write_packet(&self, buf: &[u8], self_address: SocketAddr, peer_address: SocketAddr) -> anyhow::Result<usize> {
        let Some(socket) = &self.socket else {
            bail!("no UDP socket bound");
        };

        trace!("UDP socket {:?}: sending {} bytes to {:?}", self_address, buf.len(), peer_address);
        Ok(socket.try_send_to(buf, peer_address)?)
    }

    fn max_packet_size(&self, _peer_address: SocketAddr) -> usize {
        MAX_OUTGOING_PACKET_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_packet_writer() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let sender_addr = sender.local_addr().unwrap();
        sender.writable().await.unwrap();

        let writer = UdpPacketWriter::new(Some(sender));
        let written = writer.write_packet(b"hello", sender_addr, receiver.local_addr().unwrap()).unwrap();
        assert_eq!(written, 5);

        let mut buf = [0u8; 16];
        let (len, from) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(from, sender_addr);
    }

    #[test]
    fn test_writer_without_socket_fails() {
        let writer = UdpPacketWriter::new(None);
        let addr = SocketAddr::from(([127, 0, 0, 1], 1));
        assert!(writer.write_packet(b"x", addr, addr).is_err());
        assert_eq!(writer.max_packet_size(addr), MAX_OUTGOING_PACKET_SIZE);
    }
}
