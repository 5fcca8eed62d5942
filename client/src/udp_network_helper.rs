use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::bail;
use async_trait::async_trait;
use quic_transport::error_code::QuicErrorCode;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::timeout_at;
use tracing::{debug, error, info, trace, warn};
use crate::connection::ConnectionCloseBehavior;
use crate::network_helper::{wildcard_address, NetworkHelper};
use crate::packet_writer::{PacketWriter, UdpPacketWriter};
use crate::session::ClientSession;

/// [NetworkHelper] on top of tokio's UDP sockets
pub struct UdpNetworkHelper {
    /// the latest socket is the last element
    sockets: Vec<Arc<UdpSocket>>,
    idle_timeout: Duration,
    receive_buffer: Vec<u8>,
}

impl UdpNetworkHelper {
    /// `idle_timeout` is the time without received packets after which a session is closed
    ///  with [QuicErrorCode::NetworkIdleTimeout]. Received packets longer than
    ///  `receive_buffer_size` are truncated.
    pub fn new(idle_timeout: Duration, receive_buffer_size: usize) -> UdpNetworkHelper {
        UdpNetworkHelper {
            sockets: Vec::new(),
            idle_timeout,
            receive_buffer: vec![0; receive_buffer_size],
        }
    }

    pub fn num_sockets(&self) -> usize {
        self.sockets.len()
    }
}

/// Binds with `SO_REUSEADDR` so that a socket can be bound to the port of a socket that is still
///  open, which is what migration keeping the local port does
fn bind_reusable(address: SocketAddr) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(address), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

#[async_trait]
impl NetworkHelper for UdpNetworkHelper {
    async fn create_udp_socket_and_bind(&mut self, server_address: SocketAddr, bind_to_address: Option<IpAddr>, local_port: u16) -> anyhow::Result<SocketAddr> {
        let ip = bind_to_address.unwrap_or_else(|| wildcard_address(server_address));
        if ip.is_ipv4() != server_address.is_ipv4() {
            bail!("can not reach {:?} from a socket bound to {}", server_address, ip);
        }

        let socket = bind_reusable(SocketAddr::new(ip, local_port))?;
        let local_address = socket.local_addr()?;
        info!("bound UDP socket to {:?}", local_address);

        self.sockets.push(Arc::new(socket));
        Ok(local_address)
    }

    fn create_packet_writer(&self) -> Arc<dyn PacketWriter> {
        Arc::new(UdpPacketWriter::new(self.sockets.last().cloned()))
    }

    async fn run_event_loop(&mut self, session: &mut dyn ClientSession) {
        let Some(socket) = self.sockets.last().cloned() else {
            warn!("no UDP socket bound - there is nothing to wait for");
            return;
        };

        // only packets from the peer count as activity, so the deadline is kept across
        //  foreign packets and receive errors
        let deadline = tokio::time::Instant::now() + self.idle_timeout;
        loop {
            match timeout_at(deadline, socket.recv_from(&mut self.receive_buffer)).await {
                Ok(Ok((len, from))) => {
                    if from != session.connection().peer_address() {
                        debug!("received packet from unexpected address {:?} - dropping", from);
                        continue;
                    }

                    let self_address = match socket.local_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("socket without local address: {}", e);
                            return;
                        }
                    };

                    trace!("received {} bytes from {:?}", len, from);
                    session.process_udp_packet(self_address, from, &self.receive_buffer[..len], Instant::now());
                    return;
                }
                Ok(Err(e)) => {
                    error!("error receiving from UDP socket: {}", e);
                }
                Err(_) => {
                    info!("no network activity for {:?}", self.idle_timeout);
                    session.close(QuicErrorCode::NetworkIdleTimeout, "no network activity", ConnectionCloseBehavior::SilentClose);
                    return;
                }
            }
        }
    }

    fn clean_up_stale_udp_sockets(&mut self) {
        let num_stale = self.sockets.len().saturating_sub(1);
        if num_stale > 0 {
            debug!("releasing {} stale UDP socket(s)", num_stale);
            self.sockets.drain(..num_stale);
        }
    }

    fn clean_up_all_udp_sockets(&mut self) {
        debug!("releasing all {} UDP socket(s)", self.sockets.len());
        self.sockets.clear();
    }

    fn latest_client_address(&self) -> Option<SocketAddr> {
        self.sockets.last()
            .and_then(|s| s.local_addr().ok())
    }
}
