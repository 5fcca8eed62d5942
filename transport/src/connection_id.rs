use std::fmt::{Display, Formatter};

/// The identifier the server uses to route packets to a connection. It is chosen per connection
///  attempt, either randomly by the client or designated by the server in an earlier handshake.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ConnectionId(u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl ConnectionId {
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u64 {
        self.0
    }
}
