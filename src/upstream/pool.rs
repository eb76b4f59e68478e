//! Per-target client pool.
//!
//! # Responsibilities
//! - Lazily build one HTTP client per target, keyed by target id
//! - Deduplicate concurrent construction for the same id
//! - Drop cached clients when a target's content hash changes
//! - Close all transport state on shutdown
//!
//! # Design Decisions
//! - Clients are transport-only (TLS material, pooling, timeouts);
//!   credentials are injected by the dispatcher from the target snapshot
//! - Construction failures are returned to every waiter and never cached,
//!   so a misconfigured target stays terminal until its config changes
//! - The underlying client follows no redirects, which structurally rules
//!   out cross-BMC credential leakage through Location headers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use dashmap::DashMap;
use hyper_rustls::HttpsConnector;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::OnceCell;

use crate::targets::Target;
use crate::upstream::session::SessionTokens;
use crate::upstream::tls;

/// Upper bound of idle connections the hyper pool keeps per target host.
const MAX_IDLE_PER_HOST: usize = 8;

/// The per-target outbound HTTP client type.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Error constructing or using a target's client. Mapped to 500.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("tls material for target '{id}' is invalid: {reason}")]
    TlsMaterial { id: String, reason: String },
    #[error("client pool is shut down")]
    ShutDown,
}

/// One constructed client with the provenance needed for invalidation.
pub struct ClientEntry {
    pub client: UpstreamClient,
    pub built_from_hash: u64,
    pub built_at: Instant,
    /// Session token cache for session-auth targets.
    pub session: Option<SessionTokens>,
}

type EntryCell = Arc<OnceCell<Arc<ClientEntry>>>;

/// Pool of per-target clients with deduplicated lazy construction.
pub struct ClientPool {
    entries: DashMap<String, EntryCell>,
    shut_down: AtomicBool,
}

impl ClientPool {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Get (or build) the client for a target snapshot.
    ///
    /// Concurrent callers for a missing id wait on one construction rather
    /// than racing duplicates. A cached entry whose content hash no longer
    /// matches the snapshot is dropped and rebuilt once.
    pub async fn client_for(&self, target: &Arc<Target>) -> Result<Arc<ClientEntry>, PoolError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }

        for _attempt in 0..2 {
            let cell = self
                .entries
                .entry(target.id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            let entry = cell
                .get_or_try_init(|| async { build_entry(target).map(Arc::new) })
                .await?
                .clone();

            if entry.built_from_hash == target.content_hash() {
                return Ok(entry);
            }

            // Stale entry from a previous target generation. Drop it (only
            // if the map still holds this exact cell) and rebuild.
            self.entries
                .remove_if(&target.id, |_, current| Arc::ptr_eq(current, &cell));
        }

        // A reload raced both attempts; build an unshared client for this
        // request rather than looping.
        build_entry(target).map(Arc::new)
    }

    /// Drop the cached entry for a target id. The next `client_for`
    /// reconstructs it.
    pub fn invalidate(&self, id: &str) {
        if self.entries.remove(id).is_some() {
            tracing::debug!(target_id = %id, "Dropped cached upstream client");
        }
    }

    /// Drop every entry and refuse further use. Dropping the clients closes
    /// their idle connections.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.entries.clear();
        tracing::info!("Upstream client pool shut down");
    }
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new()
    }
}

fn build_entry(target: &Target) -> Result<ClientEntry, PoolError> {
    let tls_config = tls::client_config(&target.id, &target.tls)?;

    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector.set_connect_timeout(Some(target.timeouts.connect));
    connector.set_nodelay(true);

    let https = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .wrap_connector(connector);

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(target.timeouts.idle)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .build(https);

    tracing::debug!(
        target_id = %target.id,
        address = %target.address,
        scheme = target.scheme.as_str(),
        "Built upstream client"
    );

    Ok(ClientEntry {
        client,
        built_from_hash: target.content_hash(),
        built_at: Instant::now(),
        session: target.uses_session_auth().then(SessionTokens::new),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        CredentialsConfig, TargetConfig, TargetTimeoutConfig, TargetTlsConfig, TlsModeConfig,
        UpstreamScheme,
    };

    fn target(id: &str, secret: &str) -> Arc<Target> {
        Arc::new(
            Target::from_config(&TargetConfig {
                id: id.into(),
                address: "10.0.0.1".into(),
                scheme: UpstreamScheme::Https,
                enabled: true,
                credentials: CredentialsConfig::Basic {
                    username: "root".into(),
                    secret: secret.into(),
                },
                tls: TargetTlsConfig {
                    mode: TlsModeConfig::InsecureSkipVerify,
                    ..TargetTlsConfig::default()
                },
                timeouts: TargetTimeoutConfig::default(),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_entry_is_reused_for_same_target() {
        let pool = ClientPool::new();
        let target = target("bmc-1", "calvin");

        let a = pool.client_for(&target).await.unwrap();
        let b = pool.client_for(&target).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_hash_change_rebuilds_entry() {
        let pool = ClientPool::new();
        let old = target("bmc-1", "calvin");
        let new = target("bmc-1", "hobbes");

        let a = pool.client_for(&old).await.unwrap();
        let b = pool.client_for(&new).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.built_from_hash, new.content_hash());
    }

    #[tokio::test]
    async fn test_invalidate_drops_entry() {
        let pool = ClientPool::new();
        let target = target("bmc-1", "calvin");

        let a = pool.client_for(&target).await.unwrap();
        pool.invalidate("bmc-1");
        let b = pool.client_for(&target).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_further_use() {
        let pool = ClientPool::new();
        let target = target("bmc-1", "calvin");

        pool.client_for(&target).await.unwrap();
        pool.shutdown();
        assert!(matches!(
            pool.client_for(&target).await,
            Err(PoolError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_construction_is_deduplicated() {
        let pool = Arc::new(ClientPool::new());
        let target = target("bmc-1", "calvin");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            let target = target.clone();
            handles.push(tokio::spawn(
                async move { pool.client_for(&target).await },
            ));
        }

        let mut entries = Vec::new();
        for handle in handles {
            entries.push(handle.await.unwrap().unwrap());
        }
        for entry in &entries[1..] {
            assert!(Arc::ptr_eq(&entries[0], entry));
        }
    }

    #[tokio::test]
    async fn test_session_targets_carry_token_cache() {
        let pool = ClientPool::new();
        let target = Arc::new(
            Target::from_config(&TargetConfig {
                id: "bmc-1".into(),
                address: "10.0.0.1".into(),
                scheme: UpstreamScheme::Https,
                enabled: true,
                credentials: CredentialsConfig::Session {
                    username: "root".into(),
                    secret: "calvin".into(),
                },
                tls: TargetTlsConfig {
                    mode: TlsModeConfig::InsecureSkipVerify,
                    ..TargetTlsConfig::default()
                },
                timeouts: TargetTimeoutConfig::default(),
            })
            .unwrap(),
        );

        let entry = pool.client_for(&target).await.unwrap();
        assert!(entry.session.is_some());
    }
}
