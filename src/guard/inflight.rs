//! In-flight request tracking.
//!
//! Each worker owns one registry. The timeout guard registers a request on
//! entry and the returned ticket removes it on drop, including when the
//! request future is dropped with the worker's runtime. The master reads the
//! registries to find requests stuck past their deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// A request currently being handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightRequest {
    pub request_id: Uuid,
    pub started_at: Instant,
    pub deadline: Instant,
}

impl InFlightRequest {
    pub fn new(request_id: Uuid, started_at: Instant, timeout: Duration) -> Self {
        Self {
            request_id,
            started_at,
            deadline: started_at + timeout,
        }
    }

    /// Past the deadline by more than `slack`.
    pub fn is_overdue(&self, now: Instant, slack: Duration) -> bool {
        now >= self.deadline + slack
    }
}

/// Concurrent set of a worker's in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<DashMap<Uuid, InFlightRequest>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `request`; it stays registered while the ticket lives.
    pub fn begin(&self, request: InFlightRequest) -> InFlightTicket {
        let request_id = request.request_id;
        self.inner.insert(request_id, request);
        InFlightTicket {
            inner: Arc::clone(&self.inner),
            request_id,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The overdue request with the earliest deadline, if any.
    pub fn oldest_overdue(&self, now: Instant, slack: Duration) -> Option<InFlightRequest> {
        self.inner
            .iter()
            .filter(|entry| entry.value().is_overdue(now, slack))
            .min_by_key(|entry| entry.value().deadline)
            .map(|entry| entry.value().clone())
    }
}

/// Removes its request from the registry when dropped.
#[derive(Debug)]
pub struct InFlightTicket {
    inner: Arc<DashMap<Uuid, InFlightRequest>>,
    request_id: Uuid,
}

impl InFlightTicket {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.inner.remove(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_start_plus_timeout() {
        let start = Instant::now();
        let request = InFlightRequest::new(Uuid::new_v4(), start, Duration::from_secs(120));
        assert_eq!(request.deadline, start + Duration::from_secs(120));
        assert!(!request.is_overdue(start + Duration::from_secs(119), Duration::ZERO));
        assert!(request.is_overdue(start + Duration::from_secs(120), Duration::ZERO));
        assert!(!request.is_overdue(start + Duration::from_secs(121), Duration::from_secs(2)));
    }

    #[test]
    fn ticket_tracks_lifetime() {
        let registry = InFlightRegistry::new();
        assert!(registry.is_empty());

        let first = registry.begin(InFlightRequest::new(
            Uuid::new_v4(),
            Instant::now(),
            Duration::from_secs(1),
        ));
        let second = registry.begin(InFlightRequest::new(
            Uuid::new_v4(),
            Instant::now(),
            Duration::from_secs(1),
        ));
        assert_eq!(registry.len(), 2);

        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn oldest_overdue_picks_earliest_deadline() {
        let registry = InFlightRegistry::new();
        let start = Instant::now();
        let old = InFlightRequest::new(Uuid::new_v4(), start, Duration::from_secs(1));
        let newer = InFlightRequest::new(Uuid::new_v4(), start, Duration::from_secs(2));
        let fresh = InFlightRequest::new(Uuid::new_v4(), start, Duration::from_secs(60));
        let _tickets = [
            registry.begin(newer),
            registry.begin(old.clone()),
            registry.begin(fresh),
        ];

        let now = start + Duration::from_secs(5);
        assert_eq!(registry.oldest_overdue(now, Duration::ZERO), Some(old.clone()));
        assert_eq!(registry.oldest_overdue(start, Duration::ZERO), None);
        assert_eq!(
            registry.oldest_overdue(now, Duration::from_millis(3500)),
            Some(old)
        );
        assert!(registry
            .oldest_overdue(now, Duration::from_millis(4500))
            .is_none());
    }
}
