use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use async_trait::async_trait;
use crate::packet_writer::PacketWriter;
use crate::session::ClientSession;

/// The connection manager's access to the network: it owns the client's UDP sockets and drives
///  a session by feeding it received packets.
///
/// The helper may hold several sockets at a time. The most recently bound one is used for all
///  I/O, older ('stale') ones are kept open until they are released explicitly. This allows
///  switching to a new socket only after it was bound successfully.
#[async_trait]
pub trait NetworkHelper: Send {
    /// Binds a new socket, making it the latest one, and returns its local address. On failure,
    ///  the helper's existing sockets are unaffected.
    async fn create_udp_socket_and_bind(&mut self, server_address: SocketAddr, bind_to_address: Option<IpAddr>, local_port: u16) -> anyhow::Result<SocketAddr>;

    /// a writer for the latest socket - it fails all writes if no socket is bound
    fn create_packet_writer(&self) -> Arc<dyn PacketWriter>;

    /// Waits for network activity and passes it on to the session. Returning without activity is
    ///  fine, callers check the session's state and call this again as needed. Implementations
    ///  are responsible for timeouts.
    async fn run_event_loop(&mut self, session: &mut dyn ClientSession);

    /// releases all sockets except the latest one
    fn clean_up_stale_udp_sockets(&mut self);

    fn clean_up_all_udp_sockets(&mut self);

    fn latest_client_address(&self) -> Option<SocketAddr>;
}

/// the 'any' address of the server address' family
pub fn wildcard_address(server_address: SocketAddr) -> IpAddr {
    match server_address {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}
