use std::fmt::{Display, Formatter};

/// Per-connection error codes. A connection carries exactly one of these after it was closed,
///  and [QuicErrorCode::NoError] while it is open.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum QuicErrorCode {
    #[default]
    NoError,
    InternalError,
    /// The server does not support the version(s) this attempt offered. If the server advertised
    ///  a version we support, this is recoverable by reconnecting with that version.
    InvalidVersion,
    /// The server rejected the handshake without keeping any state, asking for a fresh attempt
    CryptoHandshakeStatelessReject,
    /// Top-level error after the configured number of ClientHellos were all statelessly rejected
    CryptoTooManyRejects,
    HandshakeFailed,
    PeerGoingAway,
    NetworkIdleTimeout,
    PacketWriteError,
    ConnectionCancelled,
}

/// Coarse classification of [QuicErrorCode]s, determining how the client reacts to them
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ErrorClass {
    None,
    /// retried automatically with a fresh connection attempt, up to the attempt limit
    TransientRetryable,
    /// aborts the current connect operation and is reported to the caller
    TransientFatalToAttempt,
    /// closes an established connection
    ProtocolFatal,
}

impl QuicErrorCode {
    pub fn class(&self) -> ErrorClass {
        use QuicErrorCode::*;

        match self {
            NoError => ErrorClass::None,
            InvalidVersion | CryptoHandshakeStatelessReject => ErrorClass::TransientRetryable,
            CryptoTooManyRejects | HandshakeFailed => ErrorClass::TransientFatalToAttempt,
            InternalError | PeerGoingAway | NetworkIdleTimeout | PacketWriteError | ConnectionCancelled => ErrorClass::ProtocolFatal,
        }
    }
}

impl Display for QuicErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::no_error(QuicErrorCode::NoError, ErrorClass::None)]
    #[case::stateless_reject(QuicErrorCode::CryptoHandshakeStatelessReject, ErrorClass::TransientRetryable)]
    #[case::invalid_version(QuicErrorCode::InvalidVersion, ErrorClass::TransientRetryable)]
    #[case::too_many_rejects(QuicErrorCode::CryptoTooManyRejects, ErrorClass::TransientFatalToAttempt)]
    #[case::idle_timeout(QuicErrorCode::NetworkIdleTimeout, ErrorClass::ProtocolFatal)]
    fn test_class(#[case] code: QuicErrorCode, #[case] expected: ErrorClass) {
        assert_eq!(code.class(), expected);
    }
}
