//! Offer retry loop.

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{
    idle::IdleStrategy,
    metrics,
    transport::{OfferOutcome, Position, Publication},
};

/// How an offer attempt sequence ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OfferResult {
    /// The transport accepted the message after `retries` rejected attempts.
    Sent { position: Position, retries: u64 },
    /// Cancellation arrived before the transport accepted the message.
    Cancelled,
    /// The transport returned a code that rules out any further offer.
    Terminal(OfferOutcome),
}

/// Offer `payload` until the transport accepts it, rejects it terminally, or
/// `shutdown` fires.
///
/// Every transient rejection backs off through `idle` with the rejection
/// code as the progress indicator. Acceptance resets `idle`. Cancellation is
/// checked before each attempt, so no offer is made once it has been
/// observed.
pub(crate) async fn offer_with_retry<P, S>(
    publication: &mut P,
    payload: &[u8],
    idle: &mut S,
    shutdown: &CancellationToken,
) -> OfferResult
where
    P: Publication + ?Sized,
    S: IdleStrategy,
{
    let mut retries = 0u64;
    loop {
        if shutdown.is_cancelled() {
            return OfferResult::Cancelled;
        }
        match publication.offer(payload) {
            OfferOutcome::Accepted(position) => {
                idle.reset();
                return OfferResult::Sent { position, retries };
            }
            outcome if outcome.is_terminal() => return OfferResult::Terminal(outcome),
            outcome => {
                retries += 1;
                metrics::inc_offer_retries(outcome);
                trace!(outcome = outcome.as_str(), retries, "offer rejected, backing off");
                select! {
                    biased;

                    () = shutdown.cancelled() => return OfferResult::Cancelled,
                    () = idle.idle_with(outcome.code()) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use mockall::mock;
    use rstest::{fixture, rstest};
    use tokio_util::sync::CancellationToken;

    use super::{OfferResult, offer_with_retry};
    use crate::{
        idle::{BackoffIdleStrategy, BackoffPhase, NoOpIdleStrategy},
        transport::{ConnectionStatus, Endpoint, OfferOutcome, Position, Publication},
    };

    mock! {
        Pub {}

        impl Endpoint for Pub {
            fn is_connected(&self) -> bool;
            fn channel_status(&self) -> ConnectionStatus;
            fn close(&mut self);
        }

        impl Publication for Pub {
            fn offer(&mut self, payload: &[u8]) -> OfferOutcome;
        }
    }

    fn scripted(outcomes: impl IntoIterator<Item = OfferOutcome>) -> MockPub {
        let mut script: VecDeque<OfferOutcome> = outcomes.into_iter().collect();
        let mut publication = MockPub::new();
        publication
            .expect_offer()
            .times(script.len())
            .returning(move |_| script.pop_front().unwrap_or(OfferOutcome::Closed));
        publication
    }

    #[fixture]
    fn shutdown() -> CancellationToken { CancellationToken::new() }

    #[rstest]
    #[case(OfferOutcome::NotConnected)]
    #[case(OfferOutcome::BackPressured)]
    #[case(OfferOutcome::AdminAction)]
    #[tokio::test]
    async fn transient_codes_are_retried(
        shutdown: CancellationToken,
        #[case] transient: OfferOutcome,
    ) {
        let accepted = OfferOutcome::Accepted(Position::new(64));
        let mut publication = scripted([transient, transient, transient, accepted]);
        let mut idle = BackoffIdleStrategy::default();

        let result = offer_with_retry(&mut publication, b"msg", &mut idle, &shutdown).await;

        assert_eq!(
            result,
            OfferResult::Sent {
                position: Position::new(64),
                retries: 3
            }
        );
        assert_eq!(idle.phase(), BackoffPhase::NotIdle);
    }

    #[rstest]
    #[case(OfferOutcome::Closed)]
    #[case(OfferOutcome::MaxPositionExceeded)]
    #[tokio::test]
    async fn terminal_codes_stop_immediately(
        shutdown: CancellationToken,
        #[case] terminal: OfferOutcome,
    ) {
        let mut publication = scripted([OfferOutcome::BackPressured, terminal]);

        let result =
            offer_with_retry(&mut publication, b"msg", &mut NoOpIdleStrategy, &shutdown).await;

        assert_eq!(result, OfferResult::Terminal(terminal));
    }

    #[rstest]
    #[tokio::test]
    async fn cancelled_token_prevents_any_offer(shutdown: CancellationToken) {
        let mut publication = MockPub::new();
        publication.expect_offer().never();
        shutdown.cancel();

        let result =
            offer_with_retry(&mut publication, b"msg", &mut NoOpIdleStrategy, &shutdown).await;

        assert_eq!(result, OfferResult::Cancelled);
    }
}
