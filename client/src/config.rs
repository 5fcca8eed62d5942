use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use anyhow::bail;
use quic_transport::config::ReceivedPacketManagerConfig;
use quic_transport::version::ProtocolVersion;

/// The smallest flow control window the protocol allows, and the value of both receive windows
///  until [ClientConfig::apply_default_flow_control_windows] raises them
pub const MINIMUM_FLOW_CONTROL_WINDOW: u32 = 16 * 1024;

/// Receive window for a single stream that is used unless the application configures something
///  other than the protocol minimum
pub const DEFAULT_STREAM_RECEIVE_WINDOW: u32 = 6 * 1024 * 1024;

/// Receive window for all streams of a connection combined, see [DEFAULT_STREAM_RECEIVE_WINDOW]
pub const DEFAULT_SESSION_RECEIVE_WINDOW: u32 = 15 * 1024 * 1024;

pub const DEFAULT_MAX_CLIENT_HELLOS: u32 = 3;

/// Protocol versions in order of preference
pub const DEFAULT_SUPPORTED_VERSIONS: [ProtocolVersion; 3] = [
    ProtocolVersion::new(46),
    ProtocolVersion::new(44),
    ProtocolVersion::new(43),
];

/// Identifies a server for the purpose of caching handshake state. Several servers may share an
///  address, so the address alone is not enough.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ServerId {
    pub host: String,
    pub port: u16,
}

impl ServerId {
    pub fn new(host: impl Into<String>, port: u16) -> ServerId {
        ServerId {
            host: host.into(),
            port,
        }
    }
}

impl Display for ServerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_id: ServerId,
    pub server_addr: SocketAddr,

    /// The local address to bind the client's socket to. If this is `None`, the socket is bound
    ///  to the wildcard address of the server address' family.
    pub bind_to_address: Option<IpAddr>,
    /// zero for an ephemeral port
    pub local_port: u16,

    /// Versions offered in the first connection attempt, in order of preference. If the server
    ///  rejects the version, a retry uses the first of these versions the server supports.
    pub supported_versions: Vec<ProtocolVersion>,

    /// The maximum number of ClientHello messages sent in the course of a single call to
    ///  `connect`, summed up over all connection attempts. This bounds the number of retries
    ///  after stateless rejects or version mismatches.
    pub max_client_hellos: u32,

    /// If true, data queued for sending during a failed attempt survives a stateless reject and
    ///  is sent once a retry succeeds
    pub stateless_reject_support: bool,

    /// If set, this overrides the default maximum packet length of new connections. It is capped
    ///  at what the packet writer supports.
    pub initial_max_packet_length: Option<usize>,

    pub initial_stream_flow_control_window: u32,
    pub initial_session_flow_control_window: u32,

    pub received_packets: ReceivedPacketManagerConfig,
}

impl ClientConfig {
    pub fn new(server_id: ServerId, server_addr: SocketAddr) -> ClientConfig {
        ClientConfig {
            server_id,
            server_addr,
            bind_to_address: None,
            local_port: 0,
            supported_versions: DEFAULT_SUPPORTED_VERSIONS.to_vec(),
            max_client_hellos: DEFAULT_MAX_CLIENT_HELLOS,
            stateless_reject_support: true,
            initial_max_packet_length: None,
            initial_stream_flow_control_window: MINIMUM_FLOW_CONTROL_WINDOW,
            initial_session_flow_control_window: MINIMUM_FLOW_CONTROL_WINDOW,
            received_packets: ReceivedPacketManagerConfig::default(),
        }
    }

    /// Windows left at the protocol minimum are raised to the client defaults. Windows the
    ///  application configured explicitly are left alone.
    pub fn apply_default_flow_control_windows(&mut self) {
        if self.initial_stream_flow_control_window == MINIMUM_FLOW_CONTROL_WINDOW {
            self.initial_stream_flow_control_window = DEFAULT_STREAM_RECEIVE_WINDOW;
        }
        if self.initial_session_flow_control_window == MINIMUM_FLOW_CONTROL_WINDOW {
            self.initial_session_flow_control_window = DEFAULT_SESSION_RECEIVE_WINDOW;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.supported_versions.is_empty() {
            bail!("at least one protocol version must be supported");
        }
        if self.max_client_hellos == 0 {
            bail!("max_client_hellos must be at least 1");
        }
        if self.initial_stream_flow_control_window < MINIMUM_FLOW_CONTROL_WINDOW {
            bail!("stream flow control window is below the protocol minimum of {}", MINIMUM_FLOW_CONTROL_WINDOW);
        }
        if self.initial_session_flow_control_window < MINIMUM_FLOW_CONTROL_WINDOW {
            bail!("session flow control window is below the protocol minimum of {}", MINIMUM_FLOW_CONTROL_WINDOW);
        }
        if let Some(bind_to) = self.bind_to_address {
            if bind_to.is_ipv4() != self.server_addr.is_ipv4() {
                bail!("bind address {} and server address {} belong to different address families", bind_to, self.server_addr);
            }
        }
        self.received_packets.validate()
    }
}
