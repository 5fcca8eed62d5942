//! Fakes for sessions and the network, with scripted handshake outcomes

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use anyhow::bail;
use async_trait::async_trait;
use quic_transport::config::ReceivedPacketManagerConfig;
use quic_transport::connection_id::ConnectionId;
use quic_transport::error_code::QuicErrorCode;
use quic_transport::packet_header::PacketHeader;
use quic_transport::packet_number::PacketNumber;
use quic_transport::version::ProtocolVersion;
use crate::config::MINIMUM_FLOW_CONTROL_WINDOW;
use crate::connection::{Connection, ConnectionCloseBehavior};
use crate::network_helper::NetworkHelper;
use crate::packet_writer::{PacketWriter, MAX_OUTGOING_PACKET_SIZE};
use crate::session::{ClientSession, DataToResend, SessionConfig, SessionFactory, StreamId};

/// What a [FakeSession] does with the packets it receives
#[derive(Clone, Debug)]
pub enum HandshakeOutcome {
    /// the first packet establishes encryption and confirms the handshake
    Establish,
    /// the first packet establishes encryption, the second confirms the handshake
    EstablishUnconfirmed,
    /// the first packet establishes encryption, the second closes the connection
    EstablishThenTimeout,
    StatelessReject,
    /// the first packet is a version negotiation packet listing these versions
    VersionMismatch(Vec<ProtocolVersion>),
    Fail(QuicErrorCode),
}

pub fn session_config_for(server_address: SocketAddr, self_address: SocketAddr) -> SessionConfig {
    SessionConfig {
        connection_id: ConnectionId::from_raw(1),
        server_address,
        self_address,
        versions: vec![ProtocolVersion::new(46)],
        initial_stream_flow_control_window: MINIMUM_FLOW_CONTROL_WINDOW,
        initial_session_flow_control_window: MINIMUM_FLOW_CONTROL_WINDOW,
        received_packets: ReceivedPacketManagerConfig::default(),
    }
}

/// A local UDP port that was free a moment ago
pub fn free_port() -> u16 {
    std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap()
        .local_addr().unwrap()
        .port()
}

/// Every received packet gets the next packet number. The session starts out with two active
///  requests, and every packet received after encryption was established completes one of them.
///  Stream `n` counts as closed once `n` packets were received.
pub struct FakeSession {
    connection: Connection,
    outcome: HandshakeOutcome,
    encryption_established: bool,
    handshake_confirmed: bool,
    sent_client_hellos: u32,
    received_server_config_updates: u32,
    active_requests: usize,
    last_packet_number: u64,
    received_payloads: Vec<Vec<u8>>,
}

impl FakeSession {
    pub fn new(config: &SessionConfig, writer: Arc<dyn PacketWriter>, outcome: HandshakeOutcome) -> FakeSession {
        FakeSession {
            connection: Connection::new(config, writer),
            outcome,
            encryption_established: false,
            handshake_confirmed: false,
            sent_client_hellos: 0,
            received_server_config_updates: 0,
            active_requests: 2,
            last_packet_number: 0,
            received_payloads: Vec::new(),
        }
    }

    pub fn received_payloads(&self) -> &[Vec<u8>] {
        &self.received_payloads
    }

    fn on_handshake_packet(&mut self) {
        match self.outcome.clone() {
            HandshakeOutcome::Establish => {
                self.encryption_established = true;
                self.handshake_confirmed = true;
            }
            HandshakeOutcome::EstablishUnconfirmed => {
                if self.encryption_established {
                    self.handshake_confirmed = true;
                }
                else {
                    self.encryption_established = true;
                    self.received_server_config_updates += 1;
                }
            }
            HandshakeOutcome::EstablishThenTimeout => {
                if self.encryption_established {
                    self.close(QuicErrorCode::NetworkIdleTimeout, "idle", ConnectionCloseBehavior::SilentClose);
                }
                else {
                    self.encryption_established = true;
                }
            }
            HandshakeOutcome::StatelessReject => {
                self.close(QuicErrorCode::CryptoHandshakeStatelessReject, "stateless reject", ConnectionCloseBehavior::SilentClose);
            }
            HandshakeOutcome::VersionMismatch(versions) => {
                self.connection.on_version_negotiation(versions);
            }
            HandshakeOutcome::Fail(error) => {
                self.close(error, "handshake failed", ConnectionCloseBehavior::SilentClose);
            }
        }
    }
}

impl ClientSession for FakeSession {
    fn initialize(&mut self) {
        self.sent_client_hellos += 1;
    }

    fn is_encryption_established(&self) -> bool {
        self.encryption_established
    }

    fn is_crypto_handshake_confirmed(&self) -> bool {
        self.handshake_confirmed
    }

    fn num_sent_client_hellos(&self) -> u32 {
        self.sent_client_hellos
    }

    fn num_received_server_config_updates(&self) -> u32 {
        self.received_server_config_updates
    }

    fn is_closed_stream(&self, id: StreamId) -> bool {
        self.received_payloads.len() >= id as usize
    }

    fn num_active_requests(&self) -> usize {
        self.active_requests
    }

    fn goaway_received(&self) -> bool {
        false
    }

    fn process_udp_packet(&mut self, _self_address: SocketAddr, _peer_address: SocketAddr, packet: &[u8], receipt_time: Instant) {
        self.last_packet_number += 1;
        let header = PacketHeader::new(self.connection.connection_id(), PacketNumber::from_raw(self.last_packet_number));
        if !self.connection.on_packet_received(&header, receipt_time) {
            return;
        }
        self.received_payloads.push(packet.to_vec());

        if self.encryption_established {
            self.active_requests = self.active_requests.saturating_sub(1);
        }
        self.on_handshake_packet();
    }

    fn connection(&self) -> &Connection {
        &self.connection
    }

    fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

/// Creates [FakeSession]s with the given outcomes, one per session, and `fallback` once they are
///  used up. The configs of all created sessions are recorded in `created`.
pub fn scripted_session_factory(outcomes: Vec<HandshakeOutcome>, fallback: HandshakeOutcome, created: Arc<Mutex<Vec<Arc<SessionConfig>>>>) -> impl SessionFactory {
    let outcomes = Mutex::new(VecDeque::from(outcomes));
    move |config: Arc<SessionConfig>, writer: Arc<dyn PacketWriter>| -> Box<dyn ClientSession> {
        let outcome = outcomes.lock().unwrap()
            .pop_front()
            .unwrap_or_else(|| fallback.clone());
        created.lock().unwrap().push(config.clone());
        Box::new(FakeSession::new(&config, writer, outcome))
    }
}

/// Records the connection id of the session it was resent on
pub struct RecordingData {
    pub label: &'static str,
    pub log: Arc<Mutex<Vec<(&'static str, ConnectionId)>>>,
}

impl DataToResend for RecordingData {
    fn resend(self: Box<Self>, session: &mut dyn ClientSession) {
        self.log.lock().unwrap()
            .push((self.label, session.connection().connection_id()));
    }
}

pub struct FakePacketWriter {
    pub self_address: Option<SocketAddr>,
}

impl PacketWriter for FakePacketWriter {
    fn write_packet(&self, buf: &[u8], _self_address: SocketAddr, _peer_address: SocketAddr) -> anyhow::Result<usize> {
        if self.self_address.is_none() {
            bail!("no socket");
        }
        Ok(buf.len())
    }

    fn max_packet_size(&self, _peer_address: SocketAddr) -> usize {
        MAX_OUTGOING_PACKET_SIZE
    }
}

/// The state of a [FakeNetworkHelper], shared with the test
#[derive(Default)]
pub struct FakeNetworkState {
    /// the latest socket is the last element
    pub sockets: Vec<SocketAddr>,
    pub fail_binds: bool,
    pub num_event_loop_runs: usize,
}

/// Binds 'sockets' on consecutive ports without touching the network. Every run of the event
///  loop delivers a single packet from the server to the session.
pub struct FakeNetworkHelper {
    state: Arc<Mutex<FakeNetworkState>>,
    next_port: u16,
}

impl FakeNetworkHelper {
    pub fn new() -> (FakeNetworkHelper, Arc<Mutex<FakeNetworkState>>) {
        let state = Arc::new(Mutex::new(FakeNetworkState::default()));
        let helper = FakeNetworkHelper {
            state: state.clone(),
            next_port: 40000,
        };
        (helper, state)
    }
}

#[async_trait]
impl NetworkHelper for FakeNetworkHelper {
    async fn create_udp_socket_and_bind(&mut self, _server_address: SocketAddr, bind_to_address: Option<IpAddr>, local_port: u16) -> anyhow::Result<SocketAddr> {
        let mut state = self.state.lock().unwrap();
        if state.fail_binds {
            bail!("bind failed");
        }

        let port = if local_port == 0 {
            self.next_port += 1;
            self.next_port
        }
        else {
            local_port
        };
        let address = SocketAddr::new(bind_to_address.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)), port);
        state.sockets.push(address);
        Ok(address)
    }

    fn create_packet_writer(&self) -> Arc<dyn PacketWriter> {
        Arc::new(FakePacketWriter {
            self_address: self.latest_client_address(),
        })
    }

    async fn run_event_loop(&mut self, session: &mut dyn ClientSession) {
        let self_address = {
            let mut state = self.state.lock().unwrap();
            state.num_event_loop_runs += 1;
            assert!(state.num_event_loop_runs < 1000, "the event loop is spinning");
            state.sockets.last().copied()
        };

        if let Some(self_address) = self_address {
            let peer_address = session.connection().peer_address();
            session.process_udp_packet(self_address, peer_address, b"packet", Instant::now());
        }
    }

    fn clean_up_stale_udp_sockets(&mut self) {
        let mut state = self.state.lock().unwrap();
        let num_stale = state.sockets.len().saturating_sub(1);
        state.sockets.drain(..num_stale);
    }

    fn clean_up_all_udp_sockets(&mut self) {
        self.state.lock().unwrap().sockets.clear();
    }

    fn latest_client_address(&self) -> Option<SocketAddr> {
        self.state.lock().unwrap().sockets.last().copied()
    }
}
