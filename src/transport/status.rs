//! Status codes reported by transport endpoints.
//!
//! [`ConnectionStatus`] classifies an endpoint at a single instant and
//! [`OfferOutcome`] is the result of one non-blocking send attempt. The
//! numeric codes match the conventions of Aeron-style transports so raw
//! integer results can be converted with [`OfferOutcome::try_from`].

use derive_more::{Display, From, Into};

use super::TransportError;

/// Offer code returned when no subscriber is connected to the publication.
pub const NOT_CONNECTED: i64 = -1;
/// Offer code returned when the subscribers are too slow to accept more data.
pub const BACK_PRESSURED: i64 = -2;
/// Offer code returned when an administrative action (for example a term
/// rotation) interrupted the attempt.
pub const ADMIN_ACTION: i64 = -3;
/// Offer code returned once the publication has been closed.
pub const CLOSED: i64 = -4;
/// Offer code returned when the publication reached its maximum position.
pub const MAX_POSITION_EXCEEDED: i64 = -5;

/// Reason an endpoint can no longer be used.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum TerminalReason {
    /// The endpoint is shutting down.
    #[display("closing")]
    Closing,
    /// The endpoint failed and will not recover.
    #[display("errored")]
    Errored,
}

/// Connectivity of a publication or subscription at a point in time.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Registered but not yet usable.
    #[display("pending")]
    Pending,
    /// Connected and usable.
    #[display("active")]
    Active,
    /// Unusable; the owning bridge must stop.
    #[display("terminal ({_0})")]
    Terminal(TerminalReason),
}

impl ConnectionStatus {
    /// Report whether the endpoint reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool { matches!(self, Self::Terminal(_)) }

    /// Return the terminal reason, if any.
    #[must_use]
    pub const fn terminal_reason(self) -> Option<TerminalReason> {
        match self {
            Self::Terminal(reason) => Some(reason),
            Self::Pending | Self::Active => None,
        }
    }
}

/// Stream position reached after an accepted offer.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[display("{_0}")]
pub struct Position(u64);

impl Position {
    /// Wrap a raw position value.
    #[must_use]
    pub const fn new(value: u64) -> Self { Self(value) }

    /// Return the raw position value.
    #[must_use]
    pub const fn get(self) -> u64 { self.0 }
}

/// Result of a single [`Publication::offer`](super::Publication::offer) call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OfferOutcome {
    /// The message was accepted and the stream advanced to this position.
    Accepted(Position),
    /// No subscriber is connected yet.
    NotConnected,
    /// Subscribers are lagging; retry later.
    BackPressured,
    /// An administrative action interrupted the attempt; retry immediately.
    AdminAction,
    /// The publication is closed and will never accept another message.
    Closed,
    /// The publication cannot advance any further.
    MaxPositionExceeded,
}

impl OfferOutcome {
    /// Return the signed code for this outcome. Accepted offers map to their
    /// position, every other outcome to a non-positive code.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Accepted(position) => i64::try_from(position.get()).unwrap_or(i64::MAX),
            Self::NotConnected => NOT_CONNECTED,
            Self::BackPressured => BACK_PRESSURED,
            Self::AdminAction => ADMIN_ACTION,
            Self::Closed => CLOSED,
            Self::MaxPositionExceeded => MAX_POSITION_EXCEEDED,
        }
    }

    /// Whether the same message should be offered again after backing off.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::BackPressured | Self::AdminAction
        )
    }

    /// Whether the publication can never accept another message.
    #[must_use]
    pub const fn is_terminal(self) -> bool { matches!(self, Self::Closed | Self::MaxPositionExceeded) }

    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted(_) => "accepted",
            Self::NotConnected => "not_connected",
            Self::BackPressured => "back_pressured",
            Self::AdminAction => "admin_action",
            Self::Closed => "closed",
            Self::MaxPositionExceeded => "max_position_exceeded",
        }
    }
}

impl TryFrom<i64> for OfferOutcome {
    type Error = TransportError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            NOT_CONNECTED => Ok(Self::NotConnected),
            BACK_PRESSURED => Ok(Self::BackPressured),
            ADMIN_ACTION => Ok(Self::AdminAction),
            CLOSED => Ok(Self::Closed),
            MAX_POSITION_EXCEEDED => Ok(Self::MaxPositionExceeded),
            positive if positive > 0 => Ok(Self::Accepted(Position::new(positive.unsigned_abs()))),
            unknown => Err(TransportError::UnknownOfferCode(unknown)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(NOT_CONNECTED, OfferOutcome::NotConnected)]
    #[case(BACK_PRESSURED, OfferOutcome::BackPressured)]
    #[case(ADMIN_ACTION, OfferOutcome::AdminAction)]
    #[case(CLOSED, OfferOutcome::Closed)]
    #[case(MAX_POSITION_EXCEEDED, OfferOutcome::MaxPositionExceeded)]
    #[case(4096, OfferOutcome::Accepted(Position::new(4096)))]
    fn raw_codes_map_to_outcomes(#[case] code: i64, #[case] expected: OfferOutcome) {
        let outcome = OfferOutcome::try_from(code).expect("known code");
        assert_eq!(outcome, expected);
        assert_eq!(outcome.code(), code);
    }

    #[rstest]
    #[case(0)]
    #[case(-42)]
    fn unknown_codes_are_rejected(#[case] code: i64) {
        assert_eq!(
            OfferOutcome::try_from(code),
            Err(TransportError::UnknownOfferCode(code))
        );
    }

    #[test]
    fn only_closing_outcomes_are_terminal() {
        assert!(OfferOutcome::Closed.is_terminal());
        assert!(OfferOutcome::MaxPositionExceeded.is_terminal());
        assert!(OfferOutcome::BackPressured.is_transient());
        assert!(OfferOutcome::AdminAction.is_transient());
        assert!(OfferOutcome::NotConnected.is_transient());
        assert!(!OfferOutcome::Accepted(Position::new(1)).is_transient());
    }

    #[test]
    fn terminal_status_exposes_reason() {
        let status = ConnectionStatus::Terminal(TerminalReason::Errored);
        assert!(status.is_terminal());
        assert_eq!(status.terminal_reason(), Some(TerminalReason::Errored));
        assert_eq!(ConnectionStatus::Pending.terminal_reason(), None);
        assert_eq!(status.to_string(), "terminal (errored)");
    }
}
