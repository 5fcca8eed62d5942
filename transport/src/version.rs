use std::fmt::{Display, Formatter};

/// A protocol version as it is negotiated on the wire.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ProtocolVersion(u32);

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{:03}", self.0)
    }
}

impl ProtocolVersion {
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u32 {
        self.0
    }
}

/// Returns the first of `ours` (i.e. the one we prefer most) that `theirs` supports as well.
pub fn select_mutual_version(ours: &[ProtocolVersion], theirs: &[ProtocolVersion]) -> Option<ProtocolVersion> {
    ours.iter()
        .find(|v| theirs.contains(v))
        .copied()
}
