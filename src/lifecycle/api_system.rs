use super::settings::ApiSettings;
use crate::gateway::ApiGateway;
use crate::model::{AdInsertion, Source};
use reconcile_framework::{RemoteGateway, SchemaRegistry, StoreClient};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The simulated broadpeak.io API: one store for sources, one for
/// ad-insertion services.
///
/// The service store runs with a clone of the source client as its context,
/// so it can check the sources a service points at.
///
/// # Example
///
/// ```ignore
/// let api = BpkioApi::start(ApiSettings::default());
/// let reconciler = Reconciler::new(registry.clone(), api.gateway(registry));
///
/// let report = reconciler.reconcile(&batch).await?;
///
/// // Every gateway must be gone before the stores can stop.
/// drop(reconciler);
/// api.shutdown().await?;
/// ```
pub struct BpkioApi {
    pub sources: StoreClient<Source>,
    pub services: StoreClient<AdInsertion>,
    handles: Vec<JoinHandle<()>>,
}

impl BpkioApi {
    /// Spawns both stores. Must be called inside a Tokio runtime.
    pub fn start(settings: ApiSettings) -> Self {
        let (source_store, sources) = crate::source_actor::new(settings.buffer_size);
        let (service_store, services) = crate::service_actor::new(settings.buffer_size);

        let source_handle = tokio::spawn(source_store.run(settings));
        let service_handle = tokio::spawn(service_store.run(sources.clone()));

        Self {
            sources,
            services,
            handles: vec![source_handle, service_handle],
        }
    }

    /// Gateway bound to these stores.
    pub fn gateway(&self, registry: Arc<SchemaRegistry>) -> Arc<dyn RemoteGateway> {
        Arc::new(ApiGateway::new(registry, self.sources.clone(), self.services.clone()))
    }

    /// Drops the clients held here and waits for both stores to stop.
    ///
    /// A store stops once every client of it is dropped, so gateways handed
    /// out by [`gateway`](Self::gateway) must be dropped first. The service
    /// store holds a source client of its own, which it releases when it
    /// stops; the handles are awaited services first for that reason.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down API...");
        drop(self.sources);
        drop(self.services);

        for handle in self.handles.into_iter().rev() {
            if let Err(e) = handle.await {
                error!(error = %e, "Store task failed");
                return Err(format!("Store task failed: {e}"));
            }
        }

        info!("API shutdown complete.");
        Ok(())
    }
}
