//! Single-flight coordination for same-digest writes.
//!
//! Concurrent stores of an identical payload must collapse into one
//! physical write with every caller observing success. The first caller
//! for a digest becomes the leader and performs the write; later
//! arrivals become followers and wait on a oneshot for the leader's
//! outcome instead of hashing and inserting again.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::domain::CasId;

use super::content::PutOutcome;

/// Outcome broadcast from a flight leader to its followers.
#[derive(Debug, Clone, Copy)]
pub enum FlightOutcome {
    /// The leader's write (or dedup hit) succeeded.
    Stored(PutOutcome),
    /// The leader failed or was dropped mid-flight; followers perform
    /// their own put, which is idempotent.
    Abandoned,
}

type Waiters = Vec<oneshot::Sender<FlightOutcome>>;

/// In-flight write registry keyed by digest.
#[derive(Default, Clone)]
pub struct WriteFlights {
    inner: Arc<DashMap<CasId, Waiters>>,
}

/// Role assigned to a caller joining a flight.
pub enum WriteFlight {
    /// This caller performs the write and must resolve the flight via
    /// [`FlightGuard::complete`] (or by dropping the guard on failure).
    Leader(FlightGuard),
    /// Another caller is already writing this digest; await its outcome.
    Follower(oneshot::Receiver<FlightOutcome>),
}

impl WriteFlights {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn join(&self, id: CasId) -> WriteFlight {
        use dashmap::mapref::entry::Entry;

        match self.inner.entry(id) {
            Entry::Vacant(vacant) => {
                vacant.insert(Vec::new());
                WriteFlight::Leader(FlightGuard {
                    id,
                    flights: Arc::clone(&self.inner),
                    resolved: false,
                })
            }
            Entry::Occupied(mut occupied) => {
                let (tx, rx) = oneshot::channel();
                occupied.get_mut().push(tx);
                WriteFlight::Follower(rx)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.inner.len()
    }
}

/// Leader's handle on an open flight. Dropping without completion
/// notifies followers that the flight was abandoned.
pub struct FlightGuard {
    id: CasId,
    flights: Arc<DashMap<CasId, Waiters>>,
    resolved: bool,
}

impl FlightGuard {
    /// Close the flight and broadcast the write outcome to followers.
    pub fn complete(mut self, outcome: PutOutcome) {
        self.resolve(FlightOutcome::Stored(outcome));
    }

    fn resolve(&mut self, outcome: FlightOutcome) {
        self.resolved = true;
        if let Some((_, waiters)) = self.flights.remove(&self.id) {
            for waiter in waiters {
                let _ = waiter.send(outcome);
            }
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.resolved {
            self.resolve(FlightOutcome::Abandoned);
        }
    }
}
