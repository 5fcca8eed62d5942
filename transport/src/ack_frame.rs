use crate::packet_number::PacketNumber;
use std::ops::Range;
use std::time::{Duration, Instant};

/// A snapshot of what was received, as it goes into an outgoing ack. It is created fresh by
///  every call to [crate::received_packet_manager::ReceivedPacketManager::get_updated_ack_frame]
///  and does not change when more packets arrive - it is simply outdated then.
///
/// The frame makes a statement about every packet number in
///  `lowest_reported ..= largest_observed`: it was received unless it is in one of the
///  `missing_ranges`. Nothing is claimed about packet numbers below `lowest_reported`.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct AckFrame {
    pub largest_observed: Option<PacketNumber>,
    pub lowest_reported: Option<PacketNumber>,
    /// ascending and non-overlapping, end exclusive
    pub missing_ranges: Vec<Range<PacketNumber>>,
    pub ack_delay: Duration,
    /// in order of arrival
    pub received_packet_times: Vec<(PacketNumber, Instant)>,
}

impl AckFrame {
    pub fn is_missing(&self, packet_number: PacketNumber) -> bool {
        self.missing_ranges.iter()
            .any(|r| r.contains(&packet_number))
    }

    pub fn num_missing_ranges(&self) -> usize {
        self.missing_ranges.len()
    }

    pub fn num_missing_packets(&self) -> u64 {
        self.missing_ranges.iter()
            .map(|r| r.end - r.start)
            .sum()
    }

    /// true iff the frame positively acknowledges this packet number
    pub fn acks(&self, packet_number: PacketNumber) -> bool {
        match (self.lowest_reported, self.largest_observed) {
            (Some(lowest), Some(largest)) => {
                packet_number >= lowest && packet_number <= largest && !self.is_missing(packet_number)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pn(raw: u64) -> PacketNumber {
        PacketNumber::from_raw(raw)
    }

    #[test]
    fn test_acks() {
        let frame = AckFrame {
            largest_observed: Some(pn(10)),
            lowest_reported: Some(pn(3)),
            missing_ranges: vec![pn(4)..pn(6), pn(8)..pn(9)],
            ack_delay: Duration::ZERO,
            received_packet_times: vec![],
        };

        let acked = (0..12)
            .filter(|&n| frame.acks(pn(n)))
            .collect::<Vec<_>>();
        assert_eq!(acked, vec![3, 6, 7, 9, 10]);

        assert_eq!(frame.num_missing_ranges(), 2);
        assert_eq!(frame.num_missing_packets(), 3);
        assert!(frame.is_missing(pn(5)));
        assert!(!frame.is_missing(pn(6)));
    }

    #[test]
    fn test_empty_acks_nothing() {
        assert!(!AckFrame::default().acks(pn(0)));
    }
}
