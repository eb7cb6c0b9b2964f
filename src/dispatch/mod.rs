//! Request dispatcher: the concurrency core in front of the service.
//!
//! Every RPC passes through here. Admission is a semaphore sized by
//! configuration; when the server is at its limit new requests are
//! rejected immediately with a transient-unavailable signal rather
//! than queued and starved. Each admitted request runs under an
//! independent deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::domain::{Artifact, CacheKey, CasId};
use crate::service::{CacheService, ServiceError, StoreCommand, StoreReceipt};

pub struct Dispatcher {
    service: Arc<CacheService>,
    permits: Arc<Semaphore>,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(service: Arc<CacheService>, max_concurrent: usize, deadline: Duration) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            deadline,
        }
    }

    /// Direct access for surfaces that bypass admission control (the
    /// admin/inspection routes).
    pub fn service(&self) -> &CacheService {
        &self.service
    }

    pub async fn lookup(&self, key: CacheKey) -> Result<Option<Artifact>, ServiceError> {
        self.run("get_value", async { Ok(self.service.lookup(&key)) })
            .await
    }

    pub async fn store(&self, command: StoreCommand) -> Result<StoreReceipt, ServiceError> {
        self.run("save", self.service.store(command)).await
    }

    pub async fn associate(&self, key: CacheKey, id: CasId) -> Result<(), ServiceError> {
        self.run("put_value", async {
            self.service.associate(key, id);
            Ok(())
        })
        .await
    }

    pub async fn load(&self, id: CasId) -> Result<Option<Artifact>, ServiceError> {
        self.run("load", async { Ok(self.service.load(&id)) })
            .await
    }

    async fn run<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        let Ok(_permit) = self.permits.try_acquire() else {
            debug!(target: "dispensa::dispatch", op, "Rejected request at concurrency limit");
            counter!("dispensa_dispatch_rejected_total", "op" => op).increment(1);
            return Err(ServiceError::Backpressure);
        };

        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!(target: "dispensa::dispatch", op, "Request exceeded its deadline");
                counter!("dispensa_dispatch_timeout_total", "op" => op).increment(1);
                Err(ServiceError::DeadlineExceeded)
            }
        }
    }
}
