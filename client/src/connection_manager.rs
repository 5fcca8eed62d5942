use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use quic_transport::connection_id::ConnectionId;
use quic_transport::error_code::QuicErrorCode;
use quic_transport::version::{select_mutual_version, ProtocolVersion};
use tracing::{debug, error, info, warn};
use crate::config::ClientConfig;
use crate::connection::ConnectionCloseBehavior;
use crate::crypto_cache::CryptoConfigCache;
use crate::network_helper::{wildcard_address, NetworkHelper};
use crate::session::{ClientSession, DataToResend, SessionConfig, SessionFactory, StreamId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionAttemptState {
    Idle,
    Connecting,
    EncryptionEstablished,
    Connected,
    Failed(QuicErrorCode),
}

/// Handshake statistics of the sessions that were replaced by a retry. The current session's
///  numbers are added on top when they are queried.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HandshakeCounters {
    pub sent_client_hellos: u32,
    pub stateless_rejects_received: u32,
    pub received_server_config_updates: u32,
}

/// The client side of a logical connection to a server. It creates a session for every
///  connection attempt and retries attempts that fail in a recoverable way:
///
/// * a *stateless reject* by the server is retried with a new session, typically using a
///   connection id the server designated in the reject
/// * a *version mismatch* is retried with the first of our versions the server supports, if any
///
/// The total number of ClientHello messages per call to [ConnectionManager::connect] is limited
///  by [ClientConfig::max_client_hellos]. Data the application queued with
///  [ConnectionManager::add_data_to_resend] while an attempt was failing is handed to the
///  session of the successful retry.
pub struct ConnectionManager {
    config: ClientConfig,
    bind_to_address: Option<IpAddr>,
    network_helper: Box<dyn NetworkHelper>,
    session_factory: Box<dyn SessionFactory>,
    crypto_cache: Arc<dyn CryptoConfigCache>,

    /// This is the current attempt's session, or the last attempt's if it failed
    session: Option<Box<dyn ClientSession>>,

    initialized: bool,
    /// true iff `session` belongs to the current call to `connect`, i.e. if its statistics
    ///  count towards `counters`
    connected_or_attempting_connect: bool,
    counters: HandshakeCounters,
    /// This is set when the manager gives up on connecting for a reason that is not the last
    ///  session's own error. It takes precedence over the session's error.
    connection_error: QuicErrorCode,
    attempt_state: ConnectionAttemptState,
    data_to_resend: Vec<Box<dyn DataToResend>>,
}

impl ConnectionManager {
    pub fn new(
        config: ClientConfig,
        network_helper: Box<dyn NetworkHelper>,
        session_factory: Box<dyn SessionFactory>,
        crypto_cache: Arc<dyn CryptoConfigCache>,
    ) -> ConnectionManager {
        ConnectionManager {
            bind_to_address: config.bind_to_address,
            config,
            network_helper,
            session_factory,
            crypto_cache,
            session: None,
            initialized: false,
            connected_or_attempting_connect: false,
            counters: HandshakeCounters::default(),
            connection_error: QuicErrorCode::NoError,
            attempt_state: ConnectionAttemptState::Idle,
            data_to_resend: Vec::new(),
        }
    }

    /// Validates the configuration and binds the client's socket
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        self.counters = HandshakeCounters::default();
        self.connection_error = QuicErrorCode::NoError;
        self.connected_or_attempting_connect = false;
        self.attempt_state = ConnectionAttemptState::Idle;

        self.config.apply_default_flow_control_windows();
        self.config.validate()?;

        let self_address = self.network_helper
            .create_udp_socket_and_bind(self.config.server_addr, self.bind_to_address, self.config.local_port)
            .await?;
        info!("client for {} initialized on {:?}", self.config.server_id, self_address);

        self.initialized = true;
        Ok(())
    }

    /// Connects to the server, retrying recoverable failures. Returns true if the connection is
    ///  established, i.e. if encryption is established. The handshake may still be unconfirmed,
    ///  see [ConnectionManager::wait_for_crypto_handshake_confirmed].
    pub async fn connect(&mut self) -> bool {
        if !self.initialized {
            warn!("connect called on a client that is not initialized");
            return false;
        }
        if self.connected() {
            debug!("already connected - keeping the current session");
            return true;
        }

        self.counters = HandshakeCounters::default();
        self.connection_error = QuicErrorCode::NoError;
        self.connected_or_attempting_connect = false;

        self.connect_with_retries().await
    }

    async fn connect_with_retries(&mut self) -> bool {
        while !self.connected() && self.num_sent_client_hellos() < self.config.max_client_hellos {
            if !self.start_connect() {
                break;
            }
            while self.encryption_being_established() {
                self.run_event_loop_once().await;
            }

            if self.connected() {
                if self.config.stateless_reject_support {
                    self.resend_saved_data();
                }
                break;
            }

            if !self.has_retryable_failure() {
                break;
            }
            debug!("connection attempt failed with {} - retrying", self.session_error());
        }

        if self.connected() {
            info!("connected to {}", self.config.server_id);
            self.attempt_state = if self.handshake_confirmed() {
                ConnectionAttemptState::Connected
            }
            else {
                ConnectionAttemptState::EncryptionEstablished
            };
            return true;
        }

        if self.session_error() == QuicErrorCode::CryptoHandshakeStatelessReject
            && self.num_sent_client_hellos() >= self.config.max_client_hellos
        {
            warn!("giving up on {} after {} ClientHellos", self.config.server_id, self.num_sent_client_hellos());
            self.connection_error = QuicErrorCode::CryptoTooManyRejects;
        }

        warn!("connecting to {} failed: {}", self.config.server_id, self.connection_error());
        self.attempt_state = ConnectionAttemptState::Failed(self.connection_error());
        false
    }

    /// Starts a single connection attempt with a new session, replacing the previous one. This
    ///  does not wait for the attempt to complete. Returns false if no attempt could be started
    ///  because the client is not initialized or already connected.
    pub fn start_connect(&mut self) -> bool {
        if !self.initialized {
            warn!("start_connect called on a client that is not initialized");
            return false;
        }
        if self.connected() {
            warn!("start_connect called while connected");
            return false;
        }

        let writer = self.network_helper.create_packet_writer();
        let retry_version = self.can_reconnect_with_different_version();

        if let Some(previous) = self.session.take() {
            if previous.error() != QuicErrorCode::CryptoHandshakeStatelessReject && retry_version.is_none() {
                self.clear_data_to_resend();
            }
            if self.connected_or_attempting_connect {
                self.update_stats(previous.as_ref());
            }
        }

        let versions = match retry_version {
            Some(version) => {
                info!("retrying with version {}", version);
                vec![version]
            }
            None => self.config.supported_versions.clone(),
        };

        let session_config = Arc::new(SessionConfig {
            connection_id: self.next_connection_id(),
            server_address: self.config.server_addr,
            self_address: self.network_helper.latest_client_address()
                .unwrap_or_else(|| SocketAddr::new(wildcard_address(self.config.server_addr), 0)),
            versions,
            initial_stream_flow_control_window: self.config.initial_stream_flow_control_window,
            initial_session_flow_control_window: self.config.initial_session_flow_control_window,
            received_packets: self.config.received_packets.clone(),
        });
        debug!("starting connection attempt {} with versions {:?}", session_config.connection_id, session_config.versions);

        let mut session = self.session_factory.create_session(session_config, writer);
        if let Some(max_packet_length) = self.config.initial_max_packet_length {
            session.set_max_packet_length(max_packet_length);
        }
        session.initialize();

        self.session = Some(session);
        self.connected_or_attempting_connect = true;
        self.attempt_state = ConnectionAttemptState::Connecting;
        true
    }

    /// Closes the connection (notifying the server) and releases all sockets. The client must be
    ///  initialized again before it can reconnect.
    pub fn disconnect(&mut self) {
        if !self.initialized {
            warn!("disconnect called on a client that is not initialized");
            return;
        }

        if let Some(session) = self.session.as_deref_mut() {
            if session.connected() {
                session.close(QuicErrorCode::PeerGoingAway, "client disconnecting", ConnectionCloseBehavior::SendConnectionClosePacket);
            }
        }

        self.clear_data_to_resend();
        self.network_helper.clean_up_all_udp_sockets();
        self.initialized = false;
        self.attempt_state = ConnectionAttemptState::Idle;
        info!("disconnected from {}", self.config.server_id);
    }

    /// Moves the connection to a new local address. The new socket is bound before anything is
    ///  changed, so if binding fails, the connection continues on the old socket.
    pub async fn migrate_socket_with_specified_port(&mut self, new_host: IpAddr, port: u16) -> bool {
        if !self.connected() {
            warn!("can not migrate a connection that is not established");
            return false;
        }

        let self_address = match self.network_helper.create_udp_socket_and_bind(self.config.server_addr, Some(new_host), port).await {
            Ok(addr) => addr,
            Err(e) => {
                warn!("migrating to {}:{} failed: {}", new_host, port, e);
                return false;
            }
        };
        let writer = self.network_helper.create_packet_writer();

        self.bind_to_address = Some(new_host);
        if let Some(session) = self.session.as_deref_mut() {
            session.set_self_address(self_address);
            session.set_packet_writer(writer);
        }
        self.network_helper.clean_up_stale_udp_sockets();

        info!("migrated connection to {:?}", self_address);
        true
    }

    pub async fn migrate_socket(&mut self, new_host: IpAddr) -> bool {
        self.migrate_socket_with_specified_port(new_host, self.config.local_port).await
    }

    /// Runs the event loop once. If the session failed in a recoverable way and the client was not
    ///  disconnected, this reconnects. Returns true if the session has active requests.
    pub async fn wait_for_events(&mut self) -> bool {
        if self.session.is_none() {
            warn!("waiting for events without a session");
            return false;
        }

        self.run_event_loop_once().await;

        if self.initialized && !self.connected() && self.has_retryable_failure() {
            info!("connection failed with {} - reconnecting", self.session_error());
            self.connect_with_retries().await;
        }

        self.session.as_deref()
            .map_or(false, |s| s.num_active_requests() != 0)
    }

    pub async fn wait_for_stream_to_close(&mut self, id: StreamId) {
        while self.connected() && !self.session.as_deref().map_or(true, |s| s.is_closed_stream(id)) {
            self.wait_for_events().await;
        }
    }

    /// Returns false if the connection dropped before the handshake was confirmed
    pub async fn wait_for_crypto_handshake_confirmed(&mut self) -> bool {
        while self.connected() && !self.handshake_confirmed() {
            self.wait_for_events().await;
        }

        if !self.connected() {
            error!("handshake with {} failed: {}", self.config.server_id, self.connection_error());
            self.attempt_state = ConnectionAttemptState::Failed(self.connection_error());
            return false;
        }
        self.attempt_state = ConnectionAttemptState::Connected;
        true
    }

    /// The version to retry with, if the session failed because the server does not support
    ///  the versions it offered and we have a version in common with the server
    pub fn can_reconnect_with_different_version(&self) -> Option<ProtocolVersion> {
        let session = self.session.as_deref()?;
        if session.error() != QuicErrorCode::InvalidVersion {
            return None;
        }
        select_mutual_version(&self.config.supported_versions, session.server_supported_versions())
    }

    pub fn connected(&self) -> bool {
        self.session.as_deref()
            .map_or(false, |s| s.connected())
    }

    pub fn goaway_received(&self) -> bool {
        self.session.as_deref()
            .map_or(false, |s| s.goaway_received())
    }

    /// the manager's own error if it gave up, otherwise the last session's error
    pub fn connection_error(&self) -> QuicErrorCode {
        if self.connection_error != QuicErrorCode::NoError {
            return self.connection_error;
        }
        self.session_error()
    }

    pub fn num_sent_client_hellos(&self) -> u32 {
        self.counters.sent_client_hellos + self.current_session_stat(|s| s.num_sent_client_hellos())
    }

    pub fn num_stateless_rejects_received(&self) -> u32 {
        let current_rejected = self.current_session_stat(|s| (s.error() == QuicErrorCode::CryptoHandshakeStatelessReject) as u32);
        self.counters.stateless_rejects_received + current_rejected
    }

    pub fn num_received_server_config_updates(&self) -> u32 {
        self.counters.received_server_config_updates + self.current_session_stat(|s| s.num_received_server_config_updates())
    }

    pub fn attempt_state(&self) -> ConnectionAttemptState {
        self.attempt_state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.network_helper.latest_client_address()
    }

    pub fn session(&self) -> Option<&dyn ClientSession> {
        self.session.as_deref()
    }

    pub fn session_mut(&mut self) -> Option<&mut (dyn ClientSession + 'static)> {
        self.session.as_deref_mut()
    }

    pub fn add_data_to_resend(&mut self, data: Box<dyn DataToResend>) {
        self.data_to_resend.push(data);
    }

    pub fn clear_data_to_resend(&mut self) {
        if !self.data_to_resend.is_empty() {
            debug!("discarding {} queued item(s)", self.data_to_resend.len());
            self.data_to_resend.clear();
        }
    }

    pub fn num_data_to_resend(&self) -> usize {
        self.data_to_resend.len()
    }

    /// Hands queued data to the current session, in the order it was queued
    pub fn resend_saved_data(&mut self) {
        let Some(session) = self.session.as_deref_mut() else {
            return;
        };

        let data = std::mem::take(&mut self.data_to_resend);
        if !data.is_empty() {
            debug!("resending {} queued item(s)", data.len());
        }
        for d in data {
            d.resend(session);
        }
    }

    async fn run_event_loop_once(&mut self) {
        if let Some(session) = self.session.as_deref_mut() {
            self.network_helper.run_event_loop(session).await;
        }
    }

    fn handshake_confirmed(&self) -> bool {
        self.session.as_deref()
            .map_or(false, |s| s.is_crypto_handshake_confirmed())
    }

    fn encryption_being_established(&self) -> bool {
        self.session.as_deref()
            .map_or(false, |s| s.connected() && !s.is_encryption_established())
    }

    fn has_retryable_failure(&self) -> bool {
        self.session_error() == QuicErrorCode::CryptoHandshakeStatelessReject
            || self.can_reconnect_with_different_version().is_some()
    }

    fn session_error(&self) -> QuicErrorCode {
        self.session.as_deref()
            .map_or(QuicErrorCode::NoError, |s| s.error())
    }

    fn current_session_stat(&self, f: impl Fn(&dyn ClientSession) -> u32) -> u32 {
        match self.session.as_deref() {
            Some(session) if self.connected_or_attempting_connect => f(session),
            _ => 0,
        }
    }

    fn update_stats(&mut self, previous: &dyn ClientSession) {
        self.counters.sent_client_hellos += previous.num_sent_client_hellos();
        self.counters.received_server_config_updates += previous.num_received_server_config_updates();
        if previous.error() == QuicErrorCode::CryptoHandshakeStatelessReject {
            self.counters.stateless_rejects_received += 1;
        }
    }

    fn next_connection_id(&self) -> ConnectionId {
        let cached = self.crypto_cache.lookup_or_create(&self.config.server_id);
        match cached.next_server_designated_connection_id() {
            Some(connection_id) => {
                debug!("using server designated connection id {}", connection_id);
                connection_id
            }
            None => ConnectionId::from_raw(rand::random()),
        }
    }
}
