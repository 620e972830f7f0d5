// Simulated protocol client
//
// Lets the harness run end to end without a broker: connects succeed
// after a fixed latency, optionally failing every n-th client built.
// Carries no broker protocol semantics.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::client::{
    AssociationTimings, BoxFuture, ClientConfig, ClientFactory, ClientHandle, ConnectionTimings,
    ProtocolClient,
};
use crate::config::SimParams;
use crate::error::ClientError;

pub struct SimClient {
    config: ClientConfig,
    params: SimParams,
    /// 1-based position in factory build order, used for scripted failures.
    ordinal: u32,
    associated: AtomicBool,
    connected_at: Mutex<Option<Instant>>,
}

impl ProtocolClient for SimClient {
    fn connect(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            tokio::time::sleep(std::time::Duration::from_millis(
                self.params.connect_latency_ms,
            ))
            .await;
            if let Some(n) = self.params.fail_every {
                if n > 0 && self.ordinal % n == 0 {
                    return Err(ClientError::Connection(format!(
                        "simulated refusal for {}",
                        self.config.common_name
                    )));
                }
            }
            self.associated.store(true, Ordering::SeqCst);
            *self.connected_at.lock().unwrap() = Some(Instant::now());
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            if self.is_associated() {
                Ok(())
            } else {
                Err(ClientError::Connection(format!(
                    "{} is not associated",
                    self.config.common_name
                )))
            }
        })
    }

    fn is_associated(&self) -> bool {
        self.associated.load(Ordering::SeqCst)
    }

    fn connection_timings(&self) -> ConnectionTimings {
        let latency = std::time::Duration::from_millis(self.params.connect_latency_ms);
        ConnectionTimings {
            tcp: latency / 2,
            opening_handshake: latency / 2,
        }
    }

    fn association_timings(&self) -> AssociationTimings {
        let session = self
            .connected_at
            .lock()
            .unwrap()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        AssociationTimings {
            association: std::time::Duration::from_millis(self.params.connect_latency_ms),
            session,
        }
    }

    fn common_name(&self) -> &str {
        &self.config.common_name
    }
}

impl Drop for SimClient {
    fn drop(&mut self) {
        tracing::debug!(
            client = self.config.common_name,
            "closing simulated connection"
        );
    }
}

/// Builds [`SimClient`]s, numbering them in build order.
pub struct SimFactory {
    params: SimParams,
    built: AtomicU32,
}

impl SimFactory {
    pub fn new(params: SimParams) -> Self {
        Self {
            params,
            built: AtomicU32::new(0),
        }
    }
}

impl ClientFactory for SimFactory {
    fn build(&self, config: ClientConfig) -> ClientHandle {
        let ordinal = self.built.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(SimClient {
            config,
            params: self.params.clone(),
            ordinal,
            associated: AtomicBool::new(false),
            connected_at: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config(name: &str) -> ClientConfig {
        ClientConfig::new(
            name,
            "agent",
            vec!["wss://localhost:8142/server".to_string()],
            PathBuf::from("certs"),
            Duration::from_millis(100),
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn connect_associates_and_ping_succeeds() {
        let factory = SimFactory::new(SimParams {
            connect_latency_ms: 1,
            fail_every: None,
        });
        let client = factory.build(config("sim_1"));
        assert!(!client.is_associated());
        client.connect().await.unwrap();
        assert!(client.is_associated());
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn fail_every_rejects_the_scripted_clients() {
        let factory = SimFactory::new(SimParams {
            connect_latency_ms: 0,
            fail_every: Some(2),
        });
        let first = factory.build(config("sim_1"));
        let second = factory.build(config("sim_2"));
        assert!(first.connect().await.is_ok());
        let err = second.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
        assert!(!second.is_associated());
    }

    #[tokio::test]
    async fn ping_before_connect_fails() {
        let factory = SimFactory::new(SimParams::default());
        let client = factory.build(config("sim_1"));
        assert!(client.ping().await.is_err());
    }

    #[tokio::test]
    async fn timings_reflect_configured_latency() {
        let factory = SimFactory::new(SimParams {
            connect_latency_ms: 10,
            fail_every: None,
        });
        let client = factory.build(config("sim_1"));
        client.connect().await.unwrap();
        let conn = client.connection_timings();
        assert_eq!(
            conn.tcp + conn.opening_handshake,
            Duration::from_millis(10)
        );
        assert!(client.association_timings().session > Duration::ZERO);
    }
}
