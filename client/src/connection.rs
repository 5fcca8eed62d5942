use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use anyhow::bail;
use quic_transport::ack_frame::AckFrame;
use quic_transport::connection_id::ConnectionId;
use quic_transport::error_code::QuicErrorCode;
use quic_transport::packet_header::PacketHeader;
use quic_transport::packet_number::PacketNumber;
use quic_transport::received_packet_manager::ReceivedPacketManager;
use quic_transport::version::ProtocolVersion;
use tracing::{debug, info, trace, warn};
use crate::packet_writer::{PacketWriter, DEFAULT_MAX_PACKET_SIZE, MAX_OUTGOING_PACKET_SIZE};
use crate::session::SessionConfig;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionCloseBehavior {
    SilentClose,
    SendConnectionClosePacket,
}

/// A close notification that is waiting to be serialized and sent to the peer
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionClose {
    pub error: QuicErrorCode,
    pub details: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConnectionStats {
    pub packets_received: u64,
    pub packets_processed: u64,
    pub packets_dropped: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
}

/// The state of a single connection attempt below the session: addresses, the packet writer,
///  and the bookkeeping of received packets. It is created with its session and dropped with it,
///  so nothing here survives a retry.
pub struct Connection {
    connection_id: ConnectionId,
    self_address: SocketAddr,
    peer_address: SocketAddr,
    versions: Vec<ProtocolVersion>,
    server_supported_versions: Vec<ProtocolVersion>,
    writer: Arc<dyn PacketWriter>,
    max_packet_length: usize,
    connected: bool,
    error: QuicErrorCode,
    received_packet_manager: ReceivedPacketManager,
    pending_close: Option<ConnectionClose>,
    stats: ConnectionStats,
}

impl Connection {
    pub fn new(config: &SessionConfig, writer: Arc<dyn PacketWriter>) -> Connection {
        let mut result = Connection {
            connection_id: config.connection_id,
            self_address: config.self_address,
            peer_address: config.server_address,
            versions: config.versions.clone(),
            server_supported_versions: Vec::new(),
            writer,
            max_packet_length: 0,
            connected: true,
            error: QuicErrorCode::NoError,
            received_packet_manager: ReceivedPacketManager::new(config.received_packets.clone()),
            pending_close: None,
            stats: ConnectionStats::default(),
        };
        result.set_max_packet_length(DEFAULT_MAX_PACKET_SIZE);
        result
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn self_address(&self) -> SocketAddr {
        self.self_address
    }

    pub fn peer_address(&self) -> SocketAddr {
        self.peer_address
    }

    /// the versions this connection offers
    pub fn versions(&self) -> &[ProtocolVersion] {
        &self.versions
    }

    /// the version in use, which is the most preferred of the offered versions
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.versions.first().copied()
    }

    /// The versions the server listed when it rejected our version. This is empty unless version
    ///  negotiation happened.
    pub fn server_supported_versions(&self) -> &[ProtocolVersion] {
        &self.server_supported_versions
    }

    pub fn writer(&self) -> &Arc<dyn PacketWriter> {
        &self.writer
    }

    pub fn max_packet_length(&self) -> usize {
        self.max_packet_length
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn error(&self) -> QuicErrorCode {
        self.error
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn received_packet_manager(&self) -> &ReceivedPacketManager {
        &self.received_packet_manager
    }

    pub fn received_packet_manager_mut(&mut self) -> &mut ReceivedPacketManager {
        &mut self.received_packet_manager
    }

    /// The requested length is capped at what the writer supports for the peer and at the
    ///  protocol's absolute maximum
    pub fn set_max_packet_length(&mut self, length: usize) {
        let limit = self.writer.max_packet_size(self.peer_address).min(MAX_OUTGOING_PACKET_SIZE);
        if length > limit {
            debug!("requested max packet length {} exceeds the limit of {} - capping", length, limit);
        }
        self.max_packet_length = length.min(limit);
    }

    pub fn set_self_address(&mut self, self_address: SocketAddr) {
        debug!("connection {}: self address changes from {:?} to {:?}", self.connection_id, self.self_address, self_address);
        self.self_address = self_address;
    }

    pub fn set_packet_writer(&mut self, writer: Arc<dyn PacketWriter>) {
        self.writer = writer;
    }

    /// Registers a received packet's header with the connection. Returns true if the packet is
    ///  new and belongs to this connection, i.e. if it should be processed further.
    pub fn on_packet_received(&mut self, header: &PacketHeader, receipt_time: Instant) -> bool {
        self.stats.packets_received += 1;

        if !self.connected {
            trace!("connection {} is closed - dropping packet {}", self.connection_id, header.packet_number);
            self.stats.packets_dropped += 1;
            return false;
        }
        if header.connection_id != self.connection_id {
            debug!("packet for connection {} received on connection {} - dropping", header.connection_id, self.connection_id);
            self.stats.packets_dropped += 1;
            return false;
        }
        if !self.received_packet_manager.is_awaiting_packet(header.packet_number) {
            trace!("connection {}: packet {} is a duplicate or was given up on - dropping", self.connection_id, header.packet_number);
            self.stats.packets_dropped += 1;
            return false;
        }

        self.received_packet_manager.record_packet_received(header, receipt_time);
        self.stats.packets_processed += 1;
        true
    }

    /// The peer will not (re)send anything below `least_unacked`
    pub fn on_stop_waiting(&mut self, least_unacked: PacketNumber) {
        self.received_packet_manager.dont_wait_for_packets_before(least_unacked);
    }

    /// Handles the server rejecting the version we use, listing the versions it supports
    ///  instead. This closes the connection with [QuicErrorCode::InvalidVersion] unless the
    ///  rejection is spurious, i.e. the server lists the version in use. Picking a version for
    ///  a new attempt is up to the connection manager.
    pub fn on_version_negotiation(&mut self, server_versions: Vec<ProtocolVersion>) {
        if !self.connected {
            return;
        }

        if let Some(version) = self.version() {
            if server_versions.contains(&version) {
                warn!("connection {}: server rejected version {} but lists it as supported - ignoring", self.connection_id, version);
                return;
            }
        }

        info!("connection {}: server does not support {:?}, only {:?}", self.connection_id, self.version(), server_versions);
        self.server_supported_versions = server_versions;
        self.close_connection(QuicErrorCode::InvalidVersion, "version not supported by the server", ConnectionCloseBehavior::SilentClose);
    }

    pub fn ack_frame(&mut self, approximate_now: Instant) -> AckFrame {
        self.received_packet_manager.get_updated_ack_frame(approximate_now)
    }

    /// A new gap in received packets is reported to the peer without delay
    pub fn should_send_ack_now(&self) -> bool {
        self.received_packet_manager.has_new_missing_packets()
    }

    /// Closing is final for a connection - a closed connection ignores further closes
    pub fn close_connection(&mut self, error: QuicErrorCode, details: &str, behavior: ConnectionCloseBehavior) {
        if !self.connected {
            debug!("connection {} is already closed - ignoring close with {}", self.connection_id, error);
            return;
        }

        info!("closing connection {}: {} ({})", self.connection_id, error, details);
        self.connected = false;
        self.error = error;

        if behavior == ConnectionCloseBehavior::SendConnectionClosePacket {
            self.pending_close = Some(ConnectionClose {
                error,
                details: details.to_string(),
            });
        }
    }

    pub fn pending_close(&self) -> Option<&ConnectionClose> {
        self.pending_close.as_ref()
    }

    /// for the serializer: returns a pending close notification once
    pub fn take_pending_close(&mut self) -> Option<ConnectionClose> {
        self.pending_close.take()
    }

    /// Hands a finished packet to the writer. A failed write closes the connection.
    pub fn write_packet(&mut self, buf: &[u8]) -> anyhow::Result<()> {
        if !self.connected {
            bail!("connection {} is closed", self.connection_id);
        }
        if buf.len() > self.max_packet_length {
            bail!("packet of {} bytes exceeds the max packet length of {}", buf.len(), self.max_packet_length);
        }

        match self.writer.write_packet(buf, self.self_address, self.peer_address) {
            Ok(written) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += written as u64;
                Ok(())
            }
            Err(e) => {
                self.close_connection(QuicErrorCode::PacketWriteError, &e.to_string(), ConnectionCloseBehavior::SilentClose);
                Err(e)
            }
        }
    }
}
