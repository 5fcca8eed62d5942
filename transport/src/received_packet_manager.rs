use crate::ack_frame::AckFrame;
use crate::config::{ReceivedPacketManagerConfig, MAX_TIMESTAMP_PACKET_DISTANCE};
use crate::packet_header::PacketHeader;
use crate::packet_number::PacketNumber;
use crate::stats::ReorderingStats;
use std::cmp::{max, min};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Keeps track of the packets received on a connection, providing the data for outgoing acks.
///
/// Received packets are not stored individually. The manager stores the largest packet number
///  observed so far, and the *gaps* below it as ranges of missing packet numbers. Memory is
///  bounded in two ways:
/// * The peer tells us (through [ReceivedPacketManager::dont_wait_for_packets_before]) that it
///   will never send packets below some packet number again, and all information below that
///   number is discarded.
/// * The number of missing ranges is limited by configuration. When there are more gaps, the
///   oldest are forgotten, and acks stop making statements about packet numbers below the
///   remaining gaps.
///
/// There is an invariant that every packet number from `lowest_reported` up to
///  `largest_observed` (both inclusive) is either in one of the missing ranges or was received.
pub struct ReceivedPacketManager {
    config: ReceivedPacketManagerConfig,

    /// The peer's 'least unacked' cutover: packets below this will not be sent (or re-sent) by
    ///  the peer, so we stop waiting for them, and drop them if they arrive nonetheless
    peer_least_packet_awaiting_ack: PacketNumber,

    largest_observed: Option<PacketNumber>,
    /// the receipt time of the packet that is currently `largest_observed`, used to calculate
    ///  the ack delay
    time_largest_observed: Option<Instant>,

    /// the lowest packet number ever received, our best guess for the peer's initial packet number
    least_received_packet_number: Option<PacketNumber>,

    /// the lowest packet number that ack frames make statements about
    lowest_reported: Option<PacketNumber>,

    /// start -> end (exclusive), non-overlapping and non-adjacent
    missing_ranges: BTreeMap<PacketNumber, PacketNumber>,

    /// receipt times of packets since the last ack frame was created, in order of arrival
    received_packet_times: VecDeque<(PacketNumber, Instant)>,

    ack_frame_updated: bool,

    stats: ReorderingStats,
}

impl ReceivedPacketManager {
    pub fn new(config: ReceivedPacketManagerConfig) -> ReceivedPacketManager {
        ReceivedPacketManager {
            config,
            peer_least_packet_awaiting_ack: PacketNumber::ZERO,
            largest_observed: None,
            time_largest_observed: None,
            least_received_packet_number: None,
            lowest_reported: None,
            missing_ranges: Default::default(),
            received_packet_times: VecDeque::new(),
            ack_frame_updated: false,
            stats: Default::default(),
        }
    }

    /// Updates the state to reflect that a packet was received. Packets that are not awaited
    ///  (see [ReceivedPacketManager::is_awaiting_packet]) are ignored.
    pub fn record_packet_received(&mut self, header: &PacketHeader, receipt_time: Instant) {
        let packet_number = header.packet_number;
        if !self.is_awaiting_packet(packet_number) {
            debug!("packet #{} is a duplicate or below the cutover #{} - ignoring", packet_number, self.peer_least_packet_awaiting_ack);
            return;
        }
        trace!("recording packet #{}", packet_number);

        if !self.ack_frame_updated {
            // these were reported in the previous ack frame
            self.received_packet_times.clear();
        }
        self.ack_frame_updated = true;

        match self.largest_observed {
            None => {
                self.largest_observed = Some(packet_number);
                self.time_largest_observed = Some(receipt_time);
                self.lowest_reported = Some(packet_number);
            }
            Some(largest) if packet_number > largest => {
                let gap_start = max(largest.next(), self.peer_least_packet_awaiting_ack);
                if gap_start < packet_number {
                    trace!("packets #{} to #{} (exclusive) are missing", gap_start, packet_number);
                    self.insert_missing_range(gap_start, packet_number);
                }
                self.largest_observed = Some(packet_number);
                self.time_largest_observed = Some(receipt_time);
            }
            Some(largest) => {
                self.update_reordering_stats(largest, packet_number, receipt_time);

                match self.lowest_reported {
                    Some(lowest) if packet_number >= lowest => {
                        self.remove_missing(packet_number);
                    }
                    Some(lowest) => {
                        // This is below everything we ever received. If we have exact
                        //  information down to the least received packet, we can extend it down
                        //  to this packet
                        if Some(lowest) == self.least_received_packet_number {
                            self.insert_missing_range(packet_number.next(), lowest);
                            self.lowest_reported = Some(packet_number);
                        }
                    }
                    None => {}
                }
            }
        }

        self.least_received_packet_number = Some(match self.least_received_packet_number {
            Some(least) => min(least, packet_number),
            None => packet_number,
        });

        if self.config.save_timestamps {
            self.save_timestamp(packet_number, receipt_time);
        }

        self.enforce_max_ack_ranges();
    }

    /// true iff the packet is below the largest observed packet and was not received
    pub fn is_missing(&self, packet_number: PacketNumber) -> bool {
        match self.largest_observed {
            Some(largest) if packet_number < largest => self.missing_range_containing(packet_number).is_some(),
            _ => false,
        }
    }

    /// true iff a packet with this number should be processed if it arrives, i.e. it was not
    ///  received before and is not below the peer's cutover
    pub fn is_awaiting_packet(&self, packet_number: PacketNumber) -> bool {
        if packet_number < self.peer_least_packet_awaiting_ack {
            return false;
        }

        let largest = match self.largest_observed {
            None => return true,
            Some(largest) => largest,
        };
        if packet_number > largest {
            return true;
        }

        match self.lowest_reported {
            Some(lowest) if packet_number >= lowest => self.is_missing(packet_number),
            // below the range we have exact information about: we can only be sure that it is
            //  new if it is below anything we ever received
            _ => self.least_received_packet_number
                .map(|least| packet_number < least)
                .unwrap_or(true),
        }
    }

    /// Creates a snapshot of the current state for sending in an ack. The snapshot does not
    ///  change when further packets are recorded, so it should be serialized before that happens.
    pub fn get_updated_ack_frame(&mut self, approximate_now: Instant) -> AckFrame {
        self.ack_frame_updated = false;

        let ack_delay = self.time_largest_observed
            .map(|t| approximate_now.saturating_duration_since(t))
            .unwrap_or(Duration::ZERO);

        self.enforce_max_ack_ranges();

        if let Some(largest) = self.largest_observed {
            // this is expected to be very rare
            self.received_packet_times
                .retain(|(packet_number, _)| largest - *packet_number < MAX_TIMESTAMP_PACKET_DISTANCE);
        }

        AckFrame {
            largest_observed: self.largest_observed,
            lowest_reported: self.lowest_reported,
            missing_ranges: self.missing_ranges.iter()
                .map(|(&start, &end)| start..end)
                .collect(),
            ack_delay,
            received_packet_times: self.received_packet_times.iter().copied().collect(),
        }
    }

    /// Discards all information about packets below `least_unacked`. Packets below it that
    ///  arrive later are not awaited any more.
    pub fn dont_wait_for_packets_before(&mut self, least_unacked: PacketNumber) {
        if least_unacked <= self.peer_least_packet_awaiting_ack {
            if least_unacked < self.peer_least_packet_awaiting_ack {
                debug!("peer's least unacked #{} is below previous value #{} - ignoring", least_unacked, self.peer_least_packet_awaiting_ack);
            }
            return;
        }
        trace!("not waiting for packets before #{}", least_unacked);
        self.peer_least_packet_awaiting_ack = least_unacked;

        while let Some((&start, &end)) = self.missing_ranges.first_key_value() {
            if start >= least_unacked {
                break;
            }
            self.missing_ranges.remove(&start);
            self.ack_frame_updated = true;
            if end > least_unacked {
                self.missing_ranges.insert(least_unacked, end);
                break;
            }
        }

        if let Some(lowest) = self.lowest_reported {
            if lowest < least_unacked {
                self.lowest_reported = Some(least_unacked);
                self.ack_frame_updated = true;
            }
        }
    }

    pub fn has_missing_packets(&self) -> bool {
        !self.missing_ranges.is_empty()
    }

    /// true iff there is a gap close to the largest observed packet. This limits the ack
    ///  frequency to recently discovered gaps rather than re-reporting old ones over and over.
    pub fn has_new_missing_packets(&self) -> bool {
        let (largest, highest_missing) = match (self.largest_observed, self.missing_ranges.last_key_value()) {
            (Some(largest), Some((_, &end))) => match end.checked_minus(1) {
                Some(highest_missing) => (largest, highest_missing),
                None => return false,
            },
            _ => return false,
        };
        largest - highest_missing <= self.config.new_missing_packets_window
    }

    pub fn ack_frame_updated(&self) -> bool {
        self.ack_frame_updated
    }

    pub fn largest_observed(&self) -> Option<PacketNumber> {
        self.largest_observed
    }

    pub fn least_received_packet_number(&self) -> Option<PacketNumber> {
        self.least_received_packet_number
    }

    /// Our best guess of the first packet number the peer sent. Must be called only after at
    ///  least one packet was received - falls back to 1, the conventional initial packet number.
    pub fn peer_first_sending_packet_number(&self) -> PacketNumber {
        self.least_received_packet_number
            .unwrap_or(PacketNumber::from_raw(1))
    }

    pub fn peer_least_packet_awaiting_ack(&self) -> PacketNumber {
        self.peer_least_packet_awaiting_ack
    }

    pub fn num_missing_ranges(&self) -> usize {
        self.missing_ranges.len()
    }

    pub fn reordering_stats(&self) -> &ReorderingStats {
        &self.stats
    }

    pub fn set_max_ack_ranges(&mut self, max_ack_ranges: usize) {
        self.config.max_ack_ranges = max_ack_ranges;
        self.enforce_max_ack_ranges();
    }

    pub fn set_save_timestamps(&mut self, save_timestamps: bool) {
        self.config.save_timestamps = save_timestamps;
    }

    fn missing_range_containing(&self, packet_number: PacketNumber) -> Option<(PacketNumber, PacketNumber)> {
        self.missing_ranges.range(..=packet_number)
            .next_back()
            .filter(|(_, &end)| packet_number < end)
            .map(|(&start, &end)| (start, end))
    }

    /// inserts a range, coalescing it with overlapping or adjacent ranges
    fn insert_missing_range(&mut self, mut start: PacketNumber, mut end: PacketNumber) {
        if start >= end {
            return;
        }

        if let Some((&prev_start, &prev_end)) = self.missing_ranges.range(..=start).next_back() {
            if prev_end >= start {
                start = prev_start;
                end = max(end, prev_end);
                self.missing_ranges.remove(&prev_start);
            }
        }

        while let Some((&next_start, &next_end)) = self.missing_ranges.range(start..).next() {
            if next_start > end {
                break;
            }
            end = max(end, next_end);
            self.missing_ranges.remove(&next_start);
        }

        self.missing_ranges.insert(start, end);
    }

    fn remove_missing(&mut self, packet_number: PacketNumber) {
        if let Some((start, end)) = self.missing_range_containing(packet_number) {
            trace!("previously missing packet #{} arrived", packet_number);
            self.missing_ranges.remove(&start);
            if start < packet_number {
                self.missing_ranges.insert(start, packet_number);
            }
            if packet_number.next() < end {
                self.missing_ranges.insert(packet_number.next(), end);
            }
        }
    }

    fn enforce_max_ack_ranges(&mut self) {
        if self.config.max_ack_ranges == 0 {
            return;
        }

        while self.missing_ranges.len() > self.config.max_ack_ranges {
            if let Some((start, end)) = self.missing_ranges.pop_first() {
                debug!("more than {} missing ranges - forgetting missing packets #{} to #{} (exclusive)", self.config.max_ack_ranges, start, end);
                // `end` was received since ranges are never adjacent
                self.lowest_reported = Some(match self.lowest_reported {
                    Some(lowest) => max(lowest, end),
                    None => end,
                });
            }
        }
    }

    fn update_reordering_stats(&mut self, largest: PacketNumber, packet_number: PacketNumber, receipt_time: Instant) {
        self.stats.packets_reordered += 1;
        self.stats.max_sequence_reordering = max(self.stats.max_sequence_reordering, largest - packet_number);
        if let Some(time_largest_observed) = self.time_largest_observed {
            self.stats.max_time_reordering = max(
                self.stats.max_time_reordering,
                receipt_time.saturating_duration_since(time_largest_observed),
            );
        }
    }

    fn save_timestamp(&mut self, packet_number: PacketNumber, receipt_time: Instant) {
        if let Some(&(_, last_time)) = self.received_packet_times.back() {
            if last_time > receipt_time {
                warn!("receive time went backwards for packet #{} - not saving its timestamp", packet_number);
                return;
            }
        }

        self.received_packet_times.push_back((packet_number, receipt_time));
        if self.received_packet_times.len() > self.config.max_received_packet_times {
            self.received_packet_times.pop_front();
        }
    }
}
