//! RAII release of transport endpoints.

use std::ops::{Deref, DerefMut};

use super::Endpoint;

/// Owns an endpoint and closes it when dropped.
///
/// Bridges hold their publication or subscription through this guard so the
/// endpoint is released on every exit path, including cancellation and a
/// task being aborted mid-await.
#[derive(Debug)]
pub struct EndpointGuard<E: Endpoint> {
    endpoint: E,
}

impl<E: Endpoint> EndpointGuard<E> {
    /// Take ownership of `endpoint`.
    #[must_use]
    pub fn new(endpoint: E) -> Self { Self { endpoint } }
}

impl<E: Endpoint> Deref for EndpointGuard<E> {
    type Target = E;

    fn deref(&self) -> &Self::Target { &self.endpoint }
}

impl<E: Endpoint> DerefMut for EndpointGuard<E> {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.endpoint }
}

impl<E: Endpoint> Drop for EndpointGuard<E> {
    fn drop(&mut self) { self.endpoint.close(); }
}

#[cfg(test)]
mod tests {
    use super::EndpointGuard;
    use crate::transport::{Endpoint, MockEndpoint};

    #[test]
    fn dropping_the_guard_closes_the_endpoint() {
        let mut endpoint = MockEndpoint::new();
        endpoint.expect_is_connected().return_const(true);
        endpoint.expect_close().times(1).return_const(());

        let guard = EndpointGuard::new(endpoint);
        assert!(guard.is_connected());
        drop(guard);
    }
}
