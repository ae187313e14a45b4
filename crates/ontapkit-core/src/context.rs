// ── Provider context ──
//
// Everything a lifecycle step needs, built once and shared by reference:
// the profile registry, the client factory, the job poller, the per-profile
// cluster version cache, and the root cancellation token.

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ontapkit_api::{RestClient, Transport};

use crate::config::{ClientSettings, PollPolicy};
use crate::error::CoreError;
use crate::factory::ClientFactory;
use crate::poller::Poller;
use crate::reconcile::ClusterVersion;
use crate::registry::ProfileRegistry;

pub struct ProviderContext {
    registry: ProfileRegistry,
    factory: ClientFactory,
    poller: Poller,
    cancel: CancellationToken,
    versions: DashMap<String, ClusterVersion>,
}

impl ProviderContext {
    pub fn new(registry: ProfileRegistry, settings: ClientSettings, policy: PollPolicy) -> Self {
        let cancel = CancellationToken::new();
        Self {
            registry,
            factory: ClientFactory::new(settings, cancel.clone()),
            poller: Poller::new(policy, cancel.clone()),
            cancel,
            versions: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Root token. Per-call tokens handed to
    /// [`Reconciler::connect_with_cancel`](crate::Reconciler::connect_with_cancel)
    /// are usually its children.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abort pending slot waits, in-flight requests, and poll sleeps on every
    /// client built from this context. This is a shutdown: the context stays
    /// cancelled and every later call returns `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cluster version for `profile`, fetched through `client` on first use.
    /// The fetch also stops when `cancel` fires.
    pub async fn cluster_version<T: Transport>(
        &self,
        profile: &str,
        client: &RestClient<T>,
        cancel: &CancellationToken,
    ) -> Result<ClusterVersion, CoreError> {
        if let Some(version) = self.cached_version(profile) {
            return Ok(version);
        }

        let body: Value = client
            .execute_with(&ClusterVersion::operation(), cancel)
            .await?;
        let version = ClusterVersion::from_response(body)?;
        debug!(profile, %version, "resolved cluster version");

        self.versions.insert(profile.to_owned(), version);
        Ok(version)
    }

    pub fn cached_version(&self, profile: &str) -> Option<ClusterVersion> {
        self.versions.get(profile).map(|v| *v)
    }
}
