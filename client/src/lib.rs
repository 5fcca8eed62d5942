//! The client side of connection establishment for an encrypted, packet-based transport
//!  protocol.
//!
//! A logical connection goes through one or more *connection attempts*. Each attempt has its own
//!  [session::ClientSession] (handshake and streams) on top of its own [connection::Connection]
//!  (addresses, packet writer, received packet bookkeeping), created from an immutable
//!  [session::SessionConfig]. Nothing is shared between attempts except what the
//!  [connection_manager::ConnectionManager] carries over explicitly:
//!
//! ```ascii
//!  connect()
//!    |
//!    v
//!  start attempt ---> wait for encryption ---> established: done
//!    ^                     |
//!    |                     v
//!    +---- retry <---- stateless reject, or version mismatch with a version in common
//!                          |
//!                          v
//!                   anything else, or too many ClientHellos: failed
//! ```
//!
//! I/O is abstracted behind [network_helper::NetworkHelper] and [packet_writer::PacketWriter],
//!  with [udp_network_helper::UdpNetworkHelper] as the implementation on top of tokio.

pub mod config;
pub mod connection;
pub mod connection_manager;
pub mod crypto_cache;
pub mod network_helper;
pub mod packet_writer;
pub mod session;
pub mod udp_network_helper;

#[cfg(test)] mod test_util;

#[cfg(test)]
mod tests {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
