// ── Client factory ──
//
// Translates a `ConnectionProfile` into a ready `RestClient`: transport
// config, basic auth, telemetry tag, and the profile's concurrency limiter.
// Limiters are keyed by profile name so every client for one endpoint
// shares the same bound.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ontapkit_api::{
    BasicAuth, ConcurrencyLimiter, HttpTransport, RestClient, TlsMode, TransportConfig,
    normalize_endpoint,
};

use crate::config::{ClientSettings, ConnectionProfile};
use crate::error::CoreError;

/// Builds and caches per-profile execution clients.
pub struct ClientFactory {
    settings: ClientSettings,
    cancel: CancellationToken,
    limiters: DashMap<String, ConcurrencyLimiter>,
    clients: DashMap<(String, String), Arc<RestClient>>,
}

impl ClientFactory {
    /// Clients observe child tokens of `cancel`.
    pub fn new(settings: ClientSettings, cancel: CancellationToken) -> Self {
        Self {
            settings,
            cancel,
            limiters: DashMap::new(),
            clients: DashMap::new(),
        }
    }

    /// Return the client for `(profile, purpose_tag)`, building it on first
    /// use.
    pub fn build(
        &self,
        profile: &ConnectionProfile,
        purpose_tag: &str,
    ) -> Result<Arc<RestClient>, CoreError> {
        let key = (profile.name.clone(), purpose_tag.to_owned());
        if let Some(client) = self.clients.get(&key) {
            return Ok(Arc::clone(&client));
        }

        let base_url = normalize_endpoint(&profile.endpoint).map_err(|e| CoreError::Transport {
            reason: format!(
                "invalid endpoint '{}' for profile '{}': {e}",
                profile.endpoint, profile.name
            ),
        })?;

        let transport_config = TransportConfig {
            tls: TlsMode::from_validate_certs(profile.validate_certs),
            timeout: self.settings.request_timeout,
            purpose_tag: Some(purpose_tag.to_owned()),
        };
        let auth = BasicAuth {
            username: profile.username.clone(),
            password: profile.secret.clone(),
        };
        let transport = HttpTransport::new(&transport_config, Some(auth))?;

        let client = Arc::new(RestClient::new(
            transport,
            base_url,
            self.limiter_for(profile),
            self.cancel.child_token(),
        ));

        debug!(
            profile = %profile.name,
            tag = purpose_tag,
            base_url = %client.base_url(),
            "built REST client"
        );

        // A concurrent builder may have won the race; keep whichever landed
        // first so callers share one client.
        let client = self.clients.entry(key).or_insert(client);
        Ok(Arc::clone(&client))
    }

    /// The limiter shared by every client of `profile`.
    pub fn limiter_for(&self, profile: &ConnectionProfile) -> ConcurrencyLimiter {
        self.limiters
            .entry(profile.name.clone())
            .or_insert_with(|| ConcurrencyLimiter::new(profile.max_concurrent_requests))
            .clone()
    }

    /// Number of cached clients.
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}
