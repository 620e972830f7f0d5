// Shared test doubles
//
// A scripted protocol client and factory used by the unit tests and the
// integration tests: connect outcomes, association drops and ping
// failures are configured per client, and releases are counted so tests
// can assert teardown happened exactly once per handle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{
    AssociationTimings, BoxFuture, ClientConfig, ClientFactory, ClientHandle, ConnectionTimings,
    ProtocolClient,
};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    #[default]
    Succeed,
    /// Expected failure mode: the broker refused or timed out.
    FailConnection,
    /// Anything else that can go wrong inside the client.
    FailUnexpected,
    /// Never resolves; models a task stuck past the join budget.
    Hang,
}

/// Per-client script consumed by [`MockFactory`] in build order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockSpec {
    pub behavior: ConnectBehavior,
    /// Associated at the post-connect check, gone by the post-pause one.
    pub drop_association_after_pause: bool,
    pub ping_fails: bool,
}

pub struct MockClient {
    name: String,
    spec: MockSpec,
    connected: AtomicBool,
    association_checks: AtomicUsize,
    pings: AtomicUsize,
    pings_total: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    connect_attempts: Arc<AtomicUsize>,
}

impl MockClient {
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

impl ProtocolClient for MockClient {
    fn connect(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            self.connect_attempts.fetch_add(1, Ordering::SeqCst);
            match self.spec.behavior {
                ConnectBehavior::Succeed => {
                    self.connected.store(true, Ordering::SeqCst);
                    Ok(())
                }
                ConnectBehavior::FailConnection => {
                    Err(ClientError::Connection("mock refusal".to_string()))
                }
                ConnectBehavior::FailUnexpected => {
                    Err(ClientError::Unexpected("mock internal error".to_string()))
                }
                ConnectBehavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            self.pings.fetch_add(1, Ordering::SeqCst);
            self.pings_total.fetch_add(1, Ordering::SeqCst);
            if self.spec.ping_fails {
                Err(ClientError::Connection("mock ping failure".to_string()))
            } else {
                Ok(())
            }
        })
    }

    fn is_associated(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let checks = self.association_checks.fetch_add(1, Ordering::SeqCst);
        if self.spec.drop_association_after_pause {
            // first query (right after connect) sees the session up
            checks == 0
        } else {
            true
        }
    }

    fn connection_timings(&self) -> ConnectionTimings {
        ConnectionTimings {
            tcp: Duration::from_micros(200),
            opening_handshake: Duration::from_micros(800),
        }
    }

    fn association_timings(&self) -> AssociationTimings {
        AssociationTimings {
            association: Duration::from_millis(3),
            session: Duration::from_millis(40),
        }
    }

    fn common_name(&self) -> &str {
        &self.name
    }
}

impl Drop for MockClient {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds [`MockClient`]s from a script, one spec per build in order;
/// builds beyond the script get the default (succeeding) spec.
pub struct MockFactory {
    specs: Mutex<std::vec::IntoIter<MockSpec>>,
    /// Total number of mock clients released so far.
    pub released: Arc<AtomicUsize>,
    connect_attempts: Arc<AtomicUsize>,
    pings_total: Arc<AtomicUsize>,
    built: AtomicUsize,
}

impl MockFactory {
    pub fn new(specs: Vec<MockSpec>) -> Self {
        Self {
            specs: Mutex::new(specs.into_iter()),
            released: Arc::new(AtomicUsize::new(0)),
            connect_attempts: Arc::new(AtomicUsize::new(0)),
            pings_total: Arc::new(AtomicUsize::new(0)),
            built: AtomicUsize::new(0),
        }
    }

    pub fn build_named(&self, name: &str) -> ClientHandle {
        self.build(default_client_config(name))
    }

    pub fn built_count(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.pings_total.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MockFactory {
    fn build(&self, config: ClientConfig) -> ClientHandle {
        let spec = self.specs.lock().unwrap().next().unwrap_or_default();
        self.built.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockClient {
            name: config.common_name,
            spec,
            connected: AtomicBool::new(false),
            association_checks: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            pings_total: self.pings_total.clone(),
            released: self.released.clone(),
            connect_attempts: self.connect_attempts.clone(),
        })
    }
}

pub fn default_client_config(name: &str) -> ClientConfig {
    ClientConfig::new(
        name,
        "agent",
        vec!["wss://localhost:8142/server".to_string()],
        PathBuf::from("test-resources/ssl"),
        Duration::from_millis(10),
        Duration::ZERO,
        Duration::from_secs(10),
    )
}
