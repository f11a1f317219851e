//! Scripted transport endpoints with fault injection.
//!
//! [`ScriptedTransport`] hands out publications and subscriptions whose
//! behaviour is driven by shared probes. Tests keep the [`PublicationProbe`]
//! and [`SubscriptionProbe`] to script connectivity, offer outcomes and
//! inbound fragments, and to inspect every call a bridge made.

use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
};

use bytes::Bytes;
use wirebridge::transport::{
    ConnectionStatus,
    Endpoint,
    FragmentFlags,
    FragmentHandler,
    FragmentHeader,
    ImageHandler,
    OfferOutcome,
    Position,
    Publication,
    SessionId,
    StreamId,
    Subscription,
    TransportClient,
    TransportError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().expect("probe mutex poisoned") }

/// Connectivity shared by both probe kinds.
#[derive(Debug, Default)]
struct Connectivity {
    /// `is_connected` calls that answer `false` before the endpoint connects.
    connect_after: usize,
    checks: usize,
    status: Option<ConnectionStatus>,
    closes: usize,
}

impl Connectivity {
    fn is_connected(&mut self) -> bool {
        self.checks += 1;
        self.closes == 0 && self.checks > self.connect_after
    }

    fn status(&self) -> ConnectionStatus {
        self.status.unwrap_or(if self.checks > self.connect_after {
            ConnectionStatus::Active
        } else {
            ConnectionStatus::Pending
        })
    }
}

#[derive(Debug, Default)]
struct PublicationState {
    link: Connectivity,
    script: VecDeque<OfferOutcome>,
    attempts: Vec<Bytes>,
    accepted: Vec<Bytes>,
    position: u64,
}

/// Control and inspection handle for a [`ScriptedPublication`].
#[derive(Clone, Debug, Default)]
pub struct PublicationProbe {
    state: Arc<Mutex<PublicationState>>,
}

impl PublicationProbe {
    /// Answer `false` to the first `checks` connectivity checks.
    pub fn connect_after(&self, checks: usize) { lock(&self.state).link.connect_after = checks; }

    /// Never report connected.
    pub fn never_connect(&self) { self.connect_after(usize::MAX); }

    /// Force the channel status reported by the publication.
    pub fn set_status(&self, status: ConnectionStatus) {
        lock(&self.state).link.status = Some(status);
    }

    /// Queue outcomes returned by successive offers. Once the script runs
    /// out, offers are accepted.
    pub fn script_offers(&self, outcomes: impl IntoIterator<Item = OfferOutcome>) {
        lock(&self.state).script.extend(outcomes);
    }

    /// Number of connectivity checks made so far.
    #[must_use]
    pub fn connectivity_checks(&self) -> usize { lock(&self.state).link.checks }

    /// Payload of every offer attempt, accepted or not.
    #[must_use]
    pub fn attempts(&self) -> Vec<Bytes> { lock(&self.state).attempts.clone() }

    /// Payloads the publication accepted, in order.
    #[must_use]
    pub fn accepted(&self) -> Vec<Bytes> { lock(&self.state).accepted.clone() }

    /// Number of times the publication was closed.
    #[must_use]
    pub fn close_count(&self) -> usize { lock(&self.state).link.closes }
}

/// Publication whose behaviour follows a [`PublicationProbe`].
#[derive(Debug)]
pub struct ScriptedPublication {
    probe: PublicationProbe,
}

impl Endpoint for ScriptedPublication {
    fn is_connected(&self) -> bool { lock(&self.probe.state).link.is_connected() }

    fn channel_status(&self) -> ConnectionStatus { lock(&self.probe.state).link.status() }

    fn close(&mut self) { lock(&self.probe.state).link.closes += 1; }
}

impl Publication for ScriptedPublication {
    fn offer(&mut self, payload: &[u8]) -> OfferOutcome {
        let mut state = lock(&self.probe.state);
        let payload = Bytes::copy_from_slice(payload);
        state.attempts.push(payload.clone());
        if let Some(outcome) = state.script.pop_front() {
            if !matches!(outcome, OfferOutcome::Accepted(_)) {
                return outcome;
            }
        }
        state.position += u64::try_from(payload.len()).unwrap_or(u64::MAX);
        state.accepted.push(payload);
        OfferOutcome::Accepted(Position::new(state.position))
    }
}

#[derive(Default)]
struct SubscriptionState {
    link: Connectivity,
    pending: VecDeque<(Bytes, FragmentHeader)>,
    polls: usize,
    polls_after_close: usize,
    handlers: Option<(ImageHandler, ImageHandler)>,
}

/// Control and inspection handle for a [`ScriptedSubscription`].
#[derive(Clone, Default)]
pub struct SubscriptionProbe {
    state: Arc<Mutex<SubscriptionState>>,
}

impl SubscriptionProbe {
    /// Answer `false` to the first `checks` connectivity checks.
    pub fn connect_after(&self, checks: usize) { lock(&self.state).link.connect_after = checks; }

    /// Never report connected.
    pub fn never_connect(&self) { self.connect_after(usize::MAX); }

    /// Force the channel status reported by the subscription.
    pub fn set_status(&self, status: ConnectionStatus) {
        lock(&self.state).link.status = Some(status);
    }

    /// Queue one raw fragment for delivery.
    pub fn push_fragment(&self, session_id: SessionId, flags: FragmentFlags, payload: &[u8]) {
        let header = FragmentHeader::new(session_id, StreamId::new(0), flags);
        lock(&self.state)
            .pending
            .push_back((Bytes::copy_from_slice(payload), header));
    }

    /// Queue `payload` split into fragments of at most `mtu` bytes.
    pub fn deliver_message(&self, session_id: SessionId, payload: &[u8], mtu: NonZeroUsize) {
        let count = payload.len().div_ceil(mtu.get()).max(1);
        if payload.is_empty() {
            self.push_fragment(session_id, FragmentFlags::UNFRAGMENTED, payload);
            return;
        }
        for (index, chunk) in payload.chunks(mtu.get()).enumerate() {
            self.push_fragment(session_id, FragmentFlags::for_position(index, count), chunk);
        }
    }

    /// Invoke the image-unavailable callback registered by the bridge.
    ///
    /// # Panics
    ///
    /// Panics if no subscription has been registered yet.
    pub fn image_unavailable(&self, session_id: SessionId) {
        let handler = lock(&self.state)
            .handlers
            .as_ref()
            .map(|(_, unavailable)| Arc::clone(unavailable))
            .expect("subscription registered");
        handler(session_id);
    }

    /// Invoke the image-available callback registered by the bridge.
    ///
    /// # Panics
    ///
    /// Panics if no subscription has been registered yet.
    pub fn image_available(&self, session_id: SessionId) {
        let handler = lock(&self.state)
            .handlers
            .as_ref()
            .map(|(available, _)| Arc::clone(available))
            .expect("subscription registered");
        handler(session_id);
    }

    /// Fragments queued but not yet polled.
    #[must_use]
    pub fn pending(&self) -> usize { lock(&self.state).pending.len() }

    /// Number of `poll` calls made so far.
    #[must_use]
    pub fn polls(&self) -> usize { lock(&self.state).polls }

    /// Number of `poll` calls made after the subscription was closed.
    #[must_use]
    pub fn polls_after_close(&self) -> usize { lock(&self.state).polls_after_close }

    /// Number of connectivity checks made so far.
    #[must_use]
    pub fn connectivity_checks(&self) -> usize { lock(&self.state).link.checks }

    /// Number of times the subscription was closed.
    #[must_use]
    pub fn close_count(&self) -> usize { lock(&self.state).link.closes }
}

/// Subscription whose behaviour follows a [`SubscriptionProbe`].
pub struct ScriptedSubscription {
    probe: SubscriptionProbe,
}

impl Endpoint for ScriptedSubscription {
    fn is_connected(&self) -> bool { lock(&self.probe.state).link.is_connected() }

    fn channel_status(&self) -> ConnectionStatus { lock(&self.probe.state).link.status() }

    fn close(&mut self) { lock(&self.probe.state).link.closes += 1; }
}

impl Subscription for ScriptedSubscription {
    fn poll<H>(&mut self, handler: &mut H, fragment_limit: usize) -> usize
    where
        H: FragmentHandler + ?Sized,
    {
        let batch: Vec<(Bytes, FragmentHeader)> = {
            let mut state = lock(&self.probe.state);
            state.polls += 1;
            if state.link.closes > 0 {
                state.polls_after_close += 1;
            }
            let take = fragment_limit.min(state.pending.len());
            state.pending.drain(..take).collect()
        };
        for (payload, header) in &batch {
            handler.on_fragment(payload, header);
        }
        batch.len()
    }
}

#[derive(Default)]
struct Registrations {
    publication_error: Option<TransportError>,
    subscription_error: Option<TransportError>,
    publications: usize,
    subscriptions: usize,
}

/// Transport client returning scripted endpoints.
///
/// # Examples
///
/// ```
/// use wirebridge::transport::{Endpoint, OfferOutcome, Publication, StreamId, TransportClient};
/// use wirebridge_testing::ScriptedTransport;
///
/// let transport = ScriptedTransport::new();
/// transport.publication().script_offers([OfferOutcome::BackPressured]);
///
/// let mut publication = transport
///     .add_exclusive_publication("scripted", StreamId::new(1))
///     .expect("registered");
/// assert_eq!(publication.offer(b"x"), OfferOutcome::BackPressured);
/// assert!(matches!(publication.offer(b"x"), OfferOutcome::Accepted(_)));
/// ```
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    publication: PublicationProbe,
    subscription: SubscriptionProbe,
    registrations: Arc<Mutex<Registrations>>,
}

impl ScriptedTransport {
    /// Create a transport whose endpoints connect on the first check and
    /// accept every offer.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Probe shared by every publication this transport creates.
    #[must_use]
    pub fn publication(&self) -> &PublicationProbe { &self.publication }

    /// Probe shared by every subscription this transport creates.
    #[must_use]
    pub fn subscription(&self) -> &SubscriptionProbe { &self.subscription }

    /// Make the next publication registrations fail with `error`.
    pub fn fail_publications(&self, error: TransportError) {
        lock(&self.registrations).publication_error = Some(error);
    }

    /// Make the next subscription registrations fail with `error`.
    pub fn fail_subscriptions(&self, error: TransportError) {
        lock(&self.registrations).subscription_error = Some(error);
    }

    /// Number of publications successfully registered.
    #[must_use]
    pub fn publications_registered(&self) -> usize { lock(&self.registrations).publications }

    /// Number of subscriptions successfully registered.
    #[must_use]
    pub fn subscriptions_registered(&self) -> usize { lock(&self.registrations).subscriptions }
}

impl TransportClient for ScriptedTransport {
    type Publication = ScriptedPublication;
    type Subscription = ScriptedSubscription;

    fn add_exclusive_publication(
        &self,
        _channel: &str,
        _stream_id: StreamId,
    ) -> Result<Self::Publication, TransportError> {
        let mut registrations = lock(&self.registrations);
        if let Some(error) = registrations.publication_error.clone() {
            return Err(error);
        }
        registrations.publications += 1;
        Ok(ScriptedPublication {
            probe: self.publication.clone(),
        })
    }

    fn add_subscription(
        &self,
        _channel: &str,
        _stream_id: StreamId,
        on_available: ImageHandler,
        on_unavailable: ImageHandler,
    ) -> Result<Self::Subscription, TransportError> {
        let mut registrations = lock(&self.registrations);
        if let Some(error) = registrations.subscription_error.clone() {
            return Err(error);
        }
        registrations.subscriptions += 1;
        lock(&self.subscription.state).handlers = Some((on_available, on_unavailable));
        Ok(ScriptedSubscription {
            probe: self.subscription.clone(),
        })
    }
}
