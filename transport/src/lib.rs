//! Connection-level building blocks of an encrypted, packet-based transport protocol: the value
//!  types that identify connections, packets and protocol versions, the per-connection error
//!  codes, and the bookkeeping for received packets that outgoing acks are built from.
//!
//! ## Received packets and acks
//!
//! Every packet carries a packet number that is unique within its connection. The receiver does
//!  not store received packet numbers individually - it stores the largest packet number it
//!  observed, and the *gaps* below it:
//!
//! ```ascii
//!   received:   1 2 . . 5 6 7 . 9
//!   missing:        [3,5)     [8,9)
//!   largest observed: 9
//! ```
//!
//! An ack makes a statement about every packet number from its lower bound up to the largest
//!  observed packet: received, unless it is listed as missing.
//!
//! Tracking is bounded in two ways:
//! * The peer periodically tells the receiver which packets it will never (re-)send again
//!   ('least unacked'). Everything below that is discarded, and packets below it are dropped if
//!   they arrive late.
//! * The number of missing ranges is limited by configuration. If loss produces more gaps than
//!   that, the oldest gaps are forgotten and the ack's lower bound moves up. Acks may therefore
//!   fail to acknowledge some old packets, but they never acknowledge a packet that was not
//!   received.
//!
//! A gap close to the largest observed packet (see
//!  [config::DEFAULT_NEW_MISSING_PACKETS_WINDOW]) is a 'new' gap, which is a reason to send an
//!  ack right away rather than waiting.

pub mod ack_frame;
pub mod config;
pub mod connection_id;
pub mod error_code;
pub mod packet_header;
pub mod packet_number;
pub mod received_packet_manager;
pub mod stats;
pub mod version;

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
