use crate::connection_id::ConnectionId;
use crate::packet_number::PacketNumber;
use crate::version::ProtocolVersion;

/// The parts of a decrypted and parsed packet header that connection-level bookkeeping needs.
///  Parsing the header from the wire is the framer's job and happens before this is constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PacketHeader {
    pub connection_id: ConnectionId,
    pub packet_number: PacketNumber,
    /// present only in packets sent before version negotiation is complete
    pub version: Option<ProtocolVersion>,
}

impl PacketHeader {
    pub fn new(connection_id: ConnectionId, packet_number: PacketNumber) -> PacketHeader {
        PacketHeader {
            connection_id,
            packet_number,
            version: None,
        }
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> PacketHeader {
        self.version = Some(version);
        self
    }
}
