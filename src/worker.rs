//! Bounded background execution for work that must not hold up interaction handling.

use {
    std::future::Future,
    tokio::{
        sync::Semaphore,
        task::JoinHandle,
    },
    crate::prelude::*,
};

#[derive(Debug, Clone)]
pub(crate) struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub(crate) fn new(workers: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(workers.max(1))) }
    }

    /// Runs `work` once a worker is free, then hands its output to `on_complete`.
    ///
    /// `on_complete` runs exactly once per dispatched unit, whether `work` succeeded or failed.
    pub(crate) fn dispatch<T, W, C, F>(&self, work: W, on_complete: C) -> JoinHandle<()>
    where
        T: Send + 'static,
        W: Future<Output = T> + Send + 'static,
        C: FnOnce(T) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        if self.idle_workers() == 0 {
            log::debug!("all workers busy, queueing");
        }
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let output = {
                let _permit = permits.acquire_owned().await.ok();
                work.await
            };
            on_complete(output).await;
        })
    }

    pub(crate) fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }
}
