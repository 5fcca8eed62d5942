use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use quic_transport::config::ReceivedPacketManagerConfig;
use quic_transport::connection_id::ConnectionId;
use quic_transport::error_code::QuicErrorCode;
use quic_transport::version::ProtocolVersion;
use crate::connection::{Connection, ConnectionCloseBehavior};
use crate::packet_writer::PacketWriter;

pub type StreamId = u32;

/// Everything a session needs to know about its connection attempt. It is created fresh for every
///  attempt and does not change afterwards.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub connection_id: ConnectionId,
    pub server_address: SocketAddr,
    pub self_address: SocketAddr,
    /// the versions to offer, in order of preference
    pub versions: Vec<ProtocolVersion>,
    pub initial_stream_flow_control_window: u32,
    pub initial_session_flow_control_window: u32,
    pub received_packets: ReceivedPacketManagerConfig,
}

/// A client session is the protocol state of a single connection attempt: the crypto handshake,
///  streams and requests on top of a [Connection]. The connection manager creates a new session
///  for every attempt and observes it only through this trait.
pub trait ClientSession: Send {
    /// starts the handshake, sending the first ClientHello
    fn initialize(&mut self);

    fn is_encryption_established(&self) -> bool;
    fn is_crypto_handshake_confirmed(&self) -> bool;

    fn num_sent_client_hellos(&self) -> u32;
    fn num_received_server_config_updates(&self) -> u32;

    fn is_closed_stream(&self, id: StreamId) -> bool;
    fn num_active_requests(&self) -> usize;
    fn goaway_received(&self) -> bool;

    fn process_udp_packet(&mut self, self_address: SocketAddr, peer_address: SocketAddr, packet: &[u8], receipt_time: Instant);

    fn connection(&self) -> &Connection;
    fn connection_mut(&mut self) -> &mut Connection;

    fn connected(&self) -> bool {
        self.connection().connected()
    }

    fn error(&self) -> QuicErrorCode {
        self.connection().error()
    }

    fn server_supported_versions(&self) -> &[ProtocolVersion] {
        self.connection().server_supported_versions()
    }

    fn set_max_packet_length(&mut self, length: usize) {
        self.connection_mut().set_max_packet_length(length);
    }

    fn set_self_address(&mut self, self_address: SocketAddr) {
        self.connection_mut().set_self_address(self_address);
    }

    fn set_packet_writer(&mut self, writer: Arc<dyn PacketWriter>) {
        self.connection_mut().set_packet_writer(writer);
    }

    fn close(&mut self, error: QuicErrorCode, details: &str, behavior: ConnectionCloseBehavior) {
        self.connection_mut().close_connection(error, details, behavior);
    }
}

pub trait SessionFactory: Send {
    fn create_session(&self, config: Arc<SessionConfig>, writer: Arc<dyn PacketWriter>) -> Box<dyn ClientSession>;
}

impl<F> SessionFactory for F
where F: Fn(Arc<SessionConfig>, Arc<dyn PacketWriter>) -> Box<dyn ClientSession> + Send
{
    fn create_session(&self, config: Arc<SessionConfig>, writer: Arc<dyn PacketWriter>) -> Box<dyn ClientSession> {
        self(config, writer)
    }
}

/// Application data that was handed to a session that did not survive its handshake. It is
///  kept by the connection manager and handed to the session of a successful retry.
pub trait DataToResend: Send {
    fn resend(self: Box<Self>, session: &mut dyn ClientSession);
}
