use std::sync::Arc;
use std::time::Duration;

use crony_core::WorkloadId;
use crony_runtime::{LifecycleEvent, Runtime, WorkloadFilter};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::JobRegistry;

/// Keeps the [`JobRegistry`] in step with workloads created and destroyed in
/// the runtime.
///
/// Subscription failures are logged and the watcher re-subscribes after
/// `resubscribe_delay`; only cancellation ends the loop.
pub struct EventWatcher {
    runtime: Arc<dyn Runtime>,
    registry: Arc<JobRegistry>,
    resubscribe_delay: Duration,
}

impl EventWatcher {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        registry: Arc<JobRegistry>,
        resubscribe_delay: Duration,
    ) -> Self {
        Self {
            runtime,
            registry,
            resubscribe_delay,
        }
    }

    /// Run the watch loop on its own task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => info!("event watcher stopped"),
                _ = self.watch() => {}
            }
        })
    }

    async fn watch(&self) {
        loop {
            match self.runtime.subscribe_events().await {
                Ok(mut events) => {
                    debug!("subscribed to lifecycle events");
                    while let Some(event) = events.next().await {
                        match event {
                            Ok(event) => self.handle(event).await,
                            Err(e) => error!(error = %e, "lifecycle event stream error"),
                        }
                    }
                    warn!("lifecycle event stream closed, re-subscribing");
                }
                Err(e) => {
                    error!(error = %e, "can't subscribe to lifecycle events");
                }
            }
            sleep(self.resubscribe_delay).await;
        }
    }

    async fn handle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Created { id } => self.on_created(id).await,
            LifecycleEvent::Destroyed { id, name } => {
                debug!(%id, %name, "workload destroyed");
                self.registry.remove(&id);
            }
        }
    }

    async fn on_created(&self, id: WorkloadId) {
        let found = match self
            .runtime
            .list_schedulable(&WorkloadFilter::Id(id.clone()))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                error!(%id, error = %e, "can't inspect created workload");
                return;
            }
        };

        match <[_; 1]>::try_from(found) {
            Ok([workload]) => {
                let name = workload.name.clone();
                if let Err(e) = self.registry.add(workload) {
                    error!(workload = %name, error = %e, "can't register job");
                }
            }
            Err(found) => {
                debug!(%id, matches = found.len(), "created workload is not schedulable");
            }
        }
    }
}
