//! Why a session ended.

use std::fmt;

use axum::extract::ws::close_code;

/// Terminal condition of a connection session. The first one to fire wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The client closed the transport.
    PeerClosed,
    /// Reading from the transport failed.
    ReadFailed,
    /// No pong arrived before the read deadline.
    LivenessTimeout,
    /// A ping could not be written in time.
    PingFailed,
    /// Any other write failed or missed its deadline.
    WriteFailed,
    /// The claims snapshot expired.
    ClaimsExpired,
    /// The session has no claims snapshot.
    ClaimsMissing,
    /// The contest topic could not be subscribed.
    SubscribeFailed,
    /// The bus ended the subscription.
    BusClosed,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Stable label for logs, metrics and the `disconnected` envelope.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadFailed => "read_failed",
            Self::LivenessTimeout => "liveness_timeout",
            Self::PingFailed => "ping_failed",
            Self::WriteFailed => "write_failed",
            Self::ClaimsExpired => "claims_expired",
            Self::ClaimsMissing => "claims_missing",
            Self::SubscribeFailed => "subscribe_failed",
            Self::BusClosed => "bus_closed",
            Self::Shutdown => "shutdown",
        }
    }

    /// Close frame the server sends for this reason, if any.
    ///
    /// Transport failures get none: the peer is gone or unreachable.
    pub fn close_frame(self) -> Option<(u16, &'static str)> {
        match self {
            Self::ClaimsExpired => Some((close_code::POLICY, "claims expired")),
            Self::ClaimsMissing => Some((close_code::POLICY, "claims missing")),
            Self::SubscribeFailed => Some((close_code::ERROR, "subscribe failed")),
            Self::BusClosed => Some((close_code::AGAIN, "bus unavailable")),
            Self::Shutdown => Some((close_code::AWAY, "server shutting down")),
            Self::PeerClosed
            | Self::ReadFailed
            | Self::LivenessTimeout
            | Self::PingFailed
            | Self::WriteFailed => None,
        }
    }

    /// Whether the client is told why with a `disconnected` envelope first.
    pub fn notifies_client(self) -> bool {
        matches!(self, Self::ClaimsExpired | Self::ClaimsMissing)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_failures_notify_and_close_with_policy() {
        for reason in [CloseReason::ClaimsExpired, CloseReason::ClaimsMissing] {
            assert!(reason.notifies_client());
            assert_eq!(reason.close_frame().map(|(code, _)| code), Some(close_code::POLICY));
        }
    }

    #[test]
    fn transport_failures_send_nothing() {
        for reason in [
            CloseReason::PeerClosed,
            CloseReason::ReadFailed,
            CloseReason::LivenessTimeout,
            CloseReason::PingFailed,
            CloseReason::WriteFailed,
        ] {
            assert!(!reason.notifies_client());
            assert!(reason.close_frame().is_none());
        }
    }

    #[test]
    fn shutdown_is_going_away() {
        assert_eq!(
            CloseReason::Shutdown.close_frame().map(|(code, _)| code),
            Some(close_code::AWAY)
        );
    }

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(CloseReason::LivenessTimeout.to_string(), "liveness_timeout");
        assert_eq!(CloseReason::BusClosed.as_str(), "bus_closed");
    }
}
