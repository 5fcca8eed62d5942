use anyhow::bail;

/// The default for [ReceivedPacketManagerConfig::new_missing_packets_window]: A gap is
///  considered 'new' if it is at most this many packet numbers below the largest observed packet.
///
/// NB: Changing this changes how often acks are sent in the presence of loss, which is visible
///      to the peer
pub const DEFAULT_NEW_MISSING_PACKETS_WINDOW: u64 = 3;

/// Saved receipt timestamps are reported relative to the largest observed packet with a one-byte
///  packet number delta, so timestamps of packets further below are discarded
pub const MAX_TIMESTAMP_PACKET_DISTANCE: u64 = u8::MAX as u64;

#[derive(Clone, Debug)]
pub struct ReceivedPacketManagerConfig {
    /// This is the maximum number of missing packet ranges that are tracked and reported. If
    ///  loss patterns produce more gaps than this, the oldest gaps are forgotten, and the ack
    ///  summary does not make any statement about packets below the remaining gaps.
    ///
    /// Zero disables the limit.
    pub max_ack_ranges: usize,

    /// If true, the receipt time of every received packet is stored (in addition to the receipt
    ///  time of the largest observed packet which is always stored) and included in the ack
    ///  summary
    pub save_timestamps: bool,

    /// see [DEFAULT_NEW_MISSING_PACKETS_WINDOW]
    pub new_missing_packets_window: u64,

    /// upper bound for the number of saved receipt timestamps between two ack summaries
    pub max_received_packet_times: usize,
}

impl Default for ReceivedPacketManagerConfig {
    fn default() -> Self {
        ReceivedPacketManagerConfig {
            max_ack_ranges: 255,
            save_timestamps: false,
            new_missing_packets_window: DEFAULT_NEW_MISSING_PACKETS_WINDOW,
            max_received_packet_times: 255,
        }
    }
}

impl ReceivedPacketManagerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.new_missing_packets_window == 0 {
            bail!("new missing packets window must be at least 1");
        }
        if self.save_timestamps && self.max_received_packet_times == 0 {
            bail!("saving timestamps requires room for at least one timestamp");
        }
        Ok(())
    }
}
