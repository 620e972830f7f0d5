// Protocol client boundary
//
// The wire-level broker client is an external collaborator; the harness
// only depends on the capability below. A handle tears its connection
// down when it is released (last reference dropped), which is what lets
// ownership handoffs between the orchestrator, connection tasks and the
// keep-alive task decide who pays the close-handshake cost.

pub mod sim;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClientError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transport-phase intervals measured during `connect`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionTimings {
    pub tcp: Duration,
    pub opening_handshake: Duration,
}

/// Application-phase intervals: time to associate, and how long the
/// session has been up so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssociationTimings {
    pub association: Duration,
    pub session: Duration,
}

/// One simulated client's connection to the broker.
///
/// Implementations perform their close handshake on release (`Drop`), so
/// a handle is torn down exactly once, by whichever component drops the
/// last reference.
pub trait ProtocolClient: Send + Sync {
    /// Attempt the full establishment sequence, bounded by the timeouts
    /// in the client's configuration.
    fn connect(&self) -> BoxFuture<'_, Result<(), ClientError>>;
    /// Liveness probe over the established connection.
    fn ping(&self) -> BoxFuture<'_, Result<(), ClientError>>;
    fn is_associated(&self) -> bool;
    fn connection_timings(&self) -> ConnectionTimings;
    fn association_timings(&self) -> AssociationTimings;
    fn common_name(&self) -> &str;
}

pub type ClientHandle = Arc<dyn ProtocolClient>;

/// The set of handles processed by one connection task.
pub type Batch = Vec<ClientHandle>;

/// Builds protocol clients from per-endpoint configurations.
pub trait ClientFactory: Send + Sync {
    fn build(&self, config: ClientConfig) -> ClientHandle;
}

/// Per-endpoint client configuration, cloned from a seed and renamed for
/// each endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub common_name: String,
    pub client_type: String,
    pub broker_uris: Vec<String>,
    pub certificates_dir: PathBuf,
    pub crt_path: PathBuf,
    pub key_path: PathBuf,
    pub connection_timeout: Duration,
    pub association_timeout: Duration,
    pub association_request_ttl: Duration,
}

impl ClientConfig {
    pub fn new(
        common_name: impl Into<String>,
        client_type: impl Into<String>,
        broker_uris: Vec<String>,
        certificates_dir: PathBuf,
        connection_timeout: Duration,
        association_timeout: Duration,
        association_request_ttl: Duration,
    ) -> Self {
        let mut config = Self {
            common_name: common_name.into(),
            client_type: client_type.into(),
            broker_uris,
            certificates_dir,
            crt_path: PathBuf::new(),
            key_path: PathBuf::new(),
            connection_timeout,
            association_timeout,
            association_request_ttl,
        };
        config.update_cert_paths();
        config
    }

    /// Re-derive certificate paths from the current common name.
    pub fn update_cert_paths(&mut self) {
        self.crt_path = self
            .certificates_dir
            .join("certs")
            .join(format!("{}.pem", self.common_name));
        self.key_path = self
            .certificates_dir
            .join("private_keys")
            .join(format!("{}.pem", self.common_name));
    }

    /// Clone this configuration for another endpoint.
    pub fn with_name(&self, common_name: &str) -> Self {
        let mut config = self.clone();
        config.common_name = common_name.to_string();
        config.update_cert_paths();
        config
    }
}

/// Hands out client identities for a run: agents first, then controllers.
/// Exhaustion is a configuration error the orchestrator treats as fatal.
pub struct NamePool<'a> {
    names: std::iter::Chain<std::slice::Iter<'a, String>, std::slice::Iter<'a, String>>,
}

impl<'a> NamePool<'a> {
    pub fn new(agents: &'a [String], controllers: &'a [String]) -> Self {
        Self {
            names: agents.iter().chain(controllers.iter()),
        }
    }

    pub fn next_name(&mut self) -> Option<&'a str> {
        self.names.next().map(String::as_str)
    }
}

/// Release every batch, one execution unit per batch when there is more
/// than one, so close-handshake latency is paid in parallel instead of
/// serially. A single batch is released inline. Never called inside the
/// timed region of a run.
pub async fn close_connections_concurrently(batches: Vec<Batch>) {
    tracing::info!("about to close all connections");

    if batches.len() > 1 {
        let mut units = Vec::with_capacity(batches.len());
        for batch in batches {
            units.push(tokio::task::spawn_blocking(move || release_batch(batch)));
        }
        for unit in units {
            if let Err(e) = unit.await {
                tracing::error!("teardown unit failed: {}", e);
            }
        }
    } else {
        for batch in batches {
            release_batch(batch);
        }
    }
}

fn release_batch(batch: Batch) {
    for client in batch {
        tracing::debug!(client = client.common_name(), "releasing connection");
        drop(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockFactory, MockSpec};
    use std::path::Path;

    fn seed_config() -> ClientConfig {
        ClientConfig::new(
            "0000agent",
            "agent",
            vec!["wss://broker:8142/server".to_string()],
            PathBuf::from("/etc/pki"),
            Duration::from_millis(1500),
            Duration::from_secs(15),
            Duration::from_secs(120),
        )
    }

    #[test]
    fn cert_paths_derive_from_common_name() {
        let config = seed_config();
        assert_eq!(config.crt_path, Path::new("/etc/pki/certs/0000agent.pem"));
        assert_eq!(
            config.key_path,
            Path::new("/etc/pki/private_keys/0000agent.pem")
        );
    }

    #[test]
    fn with_name_rederives_paths() {
        let config = seed_config().with_name("agent_17");
        assert_eq!(config.common_name, "agent_17");
        assert_eq!(config.crt_path, Path::new("/etc/pki/certs/agent_17.pem"));
        assert_eq!(config.connection_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn name_pool_serves_agents_before_controllers() {
        let agents = vec!["a1".to_string(), "a2".to_string()];
        let controllers = vec!["c1".to_string()];
        let mut pool = NamePool::new(&agents, &controllers);
        assert_eq!(pool.next_name(), Some("a1"));
        assert_eq!(pool.next_name(), Some("a2"));
        assert_eq!(pool.next_name(), Some("c1"));
        assert_eq!(pool.next_name(), None);
        assert_eq!(pool.next_name(), None);
    }

    #[test]
    fn name_pool_handles_empty_lists() {
        let agents: Vec<String> = Vec::new();
        let controllers: Vec<String> = Vec::new();
        let mut pool = NamePool::new(&agents, &controllers);
        assert_eq!(pool.next_name(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_teardown_releases_every_handle_once() {
        let factory = MockFactory::new(vec![MockSpec::default(); 6]);
        let released = factory.released.clone();
        let seed = seed_config();
        let batches: Vec<Batch> = (0..3)
            .map(|b| {
                (0..2)
                    .map(|i| factory.build(seed.with_name(&format!("agent_{}_{}", b, i))))
                    .collect()
            })
            .collect();
        close_connections_concurrently(batches).await;
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn single_batch_is_released_inline() {
        let factory = MockFactory::new(vec![MockSpec::default(); 2]);
        let released = factory.released.clone();
        let seed = seed_config();
        let batch: Batch = (0..2)
            .map(|i| factory.build(seed.with_name(&format!("agent_{}", i))))
            .collect();
        close_connections_concurrently(vec![batch]).await;
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn teardown_of_nothing_is_a_no_op() {
        close_connections_concurrently(Vec::new()).await;
    }
}
