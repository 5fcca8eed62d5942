use std::fmt::{Display, Formatter};
use std::ops::Sub;

/// Identifies a packet within one connection. Packet numbers are never reused inside a connection,
///  and a reconnection starts a new packet number space.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct PacketNumber(u64);

impl Display for PacketNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PacketNumber {
    pub const ZERO: PacketNumber = PacketNumber(0);
    pub const MAX: PacketNumber = PacketNumber(u64::MAX);

    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u64 {
        self.0
    }

    /// NB: saturates at [PacketNumber::MAX] - a peer can not realistically exhaust a 64 bit
    ///  packet number space, and saturation keeps range arithmetic panic free
    pub fn next(&self) -> PacketNumber {
        PacketNumber(self.0.saturating_add(1))
    }

    pub fn checked_minus(&self, other: u64) -> Option<PacketNumber> {
        self.0.checked_sub(other).map(PacketNumber)
    }
}

/// distance between two packet numbers, saturating at zero
impl Sub for PacketNumber {
    type Output = u64;

    fn sub(self, rhs: PacketNumber) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}
