use std::time::Duration;

/// How far out of order packets arrive. These are diagnostics only, nothing in the protocol
///  depends on them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReorderingStats {
    /// number of packets that arrived after a packet with a higher packet number
    pub packets_reordered: u64,
    /// the biggest distance in packet numbers between a late packet and the largest observed
    pub max_sequence_reordering: u64,
    /// the longest time a late packet arrived after the largest observed packet
    pub max_time_reordering: Duration,
}
