//! Wiring of the verifier, job store and queue behind the submission flow.

use std::sync::Arc;

use jobgate_auth::{Hs256Verifier, IdentityVerifier, RemoteIdentityVerifier};
use jobgate_infra::{
    InMemoryJobQueue, InMemoryJobStore, JobQueue, JobStore, Reconciler, SubmissionOrchestrator,
};

use crate::config::{AppConfig, IdentityConfig};

#[cfg(feature = "redis")]
use jobgate_infra::{PostgresJobStore, QueueAddress, queue::RedisJobQueue};
#[cfg(feature = "redis")]
use sqlx::PgPool;

/// Everything the handlers need.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub orchestrator: SubmissionOrchestrator,
}

impl AppServices {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            orchestrator: SubmissionOrchestrator::new(verifier, store, queue),
        }
    }

    /// In-memory store and queue (dev/test).
    pub fn in_memory(
        verifier: Arc<dyn IdentityVerifier>,
        queue_name: &str,
    ) -> (Self, Arc<InMemoryJobStore>, Arc<InMemoryJobQueue>) {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryJobQueue::new(queue_name));
        let services = Self::new(verifier, store.clone(), queue.clone());
        (services, store, queue)
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        self.orchestrator.queue()
    }

    /// Reconciler over the same store and queue.
    pub fn reconciler(&self, stale_after: std::time::Duration) -> Reconciler {
        let stale_after = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        Reconciler::new(
            self.orchestrator.store().clone(),
            self.orchestrator.queue().clone(),
            stale_after,
        )
    }
}

pub fn build_verifier(identity: &IdentityConfig) -> anyhow::Result<Arc<dyn IdentityVerifier>> {
    let verifier: Arc<dyn IdentityVerifier> = match identity {
        IdentityConfig::Jwt { secret } => Arc::new(Hs256Verifier::new(secret.as_bytes())),
        IdentityConfig::Remote { base_url, api_key } => {
            tracing::info!(%base_url, "verifying tokens with the identity provider");
            Arc::new(RemoteIdentityVerifier::new(base_url, Some(api_key.clone()))?)
        }
    };
    Ok(verifier)
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let verifier = build_verifier(&config.identity)?;

    if config.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(config, verifier).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    } else {
        tracing::warn!("using in-memory job store and queue; jobs are lost on restart");
    }

    let (services, _, _) = AppServices::in_memory(verifier, &config.queue.name);
    Ok(services)
}

#[cfg(feature = "redis")]
async fn build_persistent_services(
    config: &AppConfig,
    verifier: Arc<dyn IdentityVerifier>,
) -> anyhow::Result<AppServices> {
    use anyhow::Context;

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PostgresJobStore::new(pool);
    store.ensure_schema().await.context("failed to prepare job table")?;

    let address = QueueAddress::parse(&config.queue.url, config.queue.password.clone())?;
    tracing::info!(queue = %config.queue.name, %address, "using Redis job queue");
    let queue = RedisJobQueue::new(address, config.queue.name.clone(), config.queue.connect_timeout)?;

    Ok(AppServices::new(verifier, Arc::new(store), Arc::new(queue)))
}
