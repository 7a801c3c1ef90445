use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::{Error, Result};

/// Bounded pool for the blocking pipeline stages.
///
/// At most `workers` jobs run at once. Each job gets `timeout` to finish,
/// including the time spent waiting for a permit. A job that times out keeps its
/// permit until the blocking work actually returns; its result is dropped.
#[derive(Clone)]
pub struct Executor {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl Executor {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let run = async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|e| Error::Internal(format!("worker failed: {}", e)))?
        };

        tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
    }
}
